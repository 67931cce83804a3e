//! Configs, their per-environment variants, and config-level membership.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::jsonc;
use crate::model::identity::normalize_email;
use crate::model::patch::Patch;
use crate::overrides::Override;

/// Maximum length of a config name.
pub const MAX_CONFIG_NAME_LEN: usize = 100;

/// Effective role of a caller on one config.
///
/// Ordered from least to most privileged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigRole {
    /// Read access only.
    Viewer,
    /// May change values and overrides.
    Editor,
    /// May additionally change schemas, membership, and delete.
    Maintainer,
}

impl ConfigRole {
    /// Returns the stored representation of this role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Viewer => "viewer",
            Self::Editor => "editor",
            Self::Maintainer => "maintainer",
        }
    }

    /// Parses a stored role. `owner` is accepted as a maintainer alias.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown roles.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "viewer" => Ok(Self::Viewer),
            "editor" => Ok(Self::Editor),
            "maintainer" | "owner" => Ok(Self::Maintainer),
            other => Err(Error::validation("role", format!("unknown config role '{other}'"))),
        }
    }
}

impl fmt::Display for ConfigRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Config-level role grants beyond project roles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMembers {
    /// Emails granted the editor role.
    #[serde(default)]
    pub editors: Vec<String>,
    /// Emails granted the maintainer role.
    #[serde(default)]
    pub maintainers: Vec<String>,
}

impl ConfigMembers {
    /// Creates a member list from raw emails.
    #[must_use]
    pub fn new(editors: Vec<String>, maintainers: Vec<String>) -> Self {
        Self {
            editors,
            maintainers,
        }
    }

    /// Normalizes, deduplicates and sorts both lists.
    ///
    /// # Errors
    ///
    /// Returns a validation error if an email is invalid or appears in both
    /// lists.
    pub fn normalized(&self) -> Result<Self> {
        let editors = Self::normalize_list(&self.editors)?;
        let maintainers = Self::normalize_list(&self.maintainers)?;

        if let Some(both) = editors.intersection(&maintainers).next() {
            return Err(Error::validation(
                "members",
                format!("{both} cannot be both editor and maintainer"),
            ));
        }

        Ok(Self {
            editors: editors.into_iter().collect(),
            maintainers: maintainers.into_iter().collect(),
        })
    }

    fn normalize_list(emails: &[String]) -> Result<BTreeSet<String>> {
        emails.iter().map(|e| normalize_email(e)).collect()
    }

    /// Returns the config role granted to `email`, if any.
    #[must_use]
    pub fn role_of(&self, email: &str) -> Option<ConfigRole> {
        let email = email.trim().to_lowercase();
        if self.maintainers.iter().any(|m| m.to_lowercase() == email) {
            Some(ConfigRole::Maintainer)
        } else if self.editors.iter().any(|e| e.to_lowercase() == email) {
            Some(ConfigRole::Editor)
        } else {
            None
        }
    }
}

/// A named, versioned configuration inside a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Config id.
    pub id: String,
    /// Owning project.
    pub project_id: String,
    /// Unique (per project) name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Email of the creator.
    pub creator_email: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last config-level change.
    pub updated_at: DateTime<Utc>,
    /// Aggregate version guarding description and membership edits.
    pub version: i64,
    /// Config-level members.
    pub members: ConfigMembers,
    /// Number of proposals still pending on this config.
    pub pending_proposals: i64,
}

/// The per-environment (or default) instance of a config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigVariant {
    /// Variant id.
    pub id: String,
    /// Owning config.
    pub config_id: String,
    /// Environment, or `None` for the default variant.
    pub environment_id: Option<String>,
    /// Current value.
    pub value: Value,
    /// Own JSON schema, if any.
    pub schema: Option<Value>,
    /// Inherit the default variant's schema instead of `schema`.
    pub use_default_schema: bool,
    /// Ordered override rules.
    pub overrides: Vec<Override>,
    /// CAS version, starting at 1.
    pub version: i64,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last change.
    pub updated_at: DateTime<Utc>,
}

impl ConfigVariant {
    /// Returns true for the default/base variant.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.environment_id.is_none()
    }
}

/// A variant value as supplied by a caller: plain JSON, or JSON-with-comments
/// text that is normalized before storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum VariantValue {
    /// A JSON value.
    Json(Value),
    /// JSON text that may contain comments and trailing commas.
    Jsonc(String),
}

impl VariantValue {
    /// Normalizes to a JSON value.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the text is not valid JSON after
    /// comment removal.
    pub fn into_json(self) -> Result<Value> {
        match self {
            Self::Json(value) => Ok(value),
            Self::Jsonc(text) => jsonc::parse(&text),
        }
    }
}

impl From<Value> for VariantValue {
    fn from(value: Value) -> Self {
        Self::Json(value)
    }
}

/// A variant joined with its config and, for inherited schemas, the
/// default variant's schema. This is the shape served to SDKs and held by
/// the replica.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedVariant {
    /// Variant id.
    pub variant_id: String,
    /// Owning config.
    pub config_id: String,
    /// Config name.
    pub config_name: String,
    /// Owning project.
    pub project_id: String,
    /// Environment of the variant.
    pub environment_id: String,
    /// Current value.
    pub value: Value,
    /// Effective schema.
    pub schema: Option<Value>,
    /// Stored overrides, references unrendered.
    pub overrides: Vec<Override>,
    /// Variant version.
    pub version: i64,
}

/// Initial content of one variant when creating a config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantInput {
    /// Initial value.
    pub value: VariantValue,
    /// Own schema.
    #[serde(default)]
    pub schema: Option<Value>,
    /// Inherit the default variant's schema.
    #[serde(default)]
    pub use_default_schema: bool,
    /// Initial overrides.
    #[serde(default)]
    pub overrides: Vec<Override>,
}

impl VariantInput {
    /// Creates an input with a value and nothing else.
    #[must_use]
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: VariantValue::Json(value.into()),
            schema: None,
            use_default_schema: false,
            overrides: Vec::new(),
        }
    }

    /// Creates an input from JSON-with-comments text.
    #[must_use]
    pub fn from_jsonc(text: impl Into<String>) -> Self {
        Self {
            value: VariantValue::Jsonc(text.into()),
            ..Self::new(Value::Null)
        }
    }

    /// Sets the own schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Value) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Sets schema inheritance.
    #[must_use]
    pub fn with_use_default_schema(mut self, inherit: bool) -> Self {
        self.use_default_schema = inherit;
        self
    }

    /// Sets the overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<Override>) -> Self {
        self.overrides = overrides;
        self
    }
}

/// A partial update of a variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariantPatch {
    /// New value.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub value: Patch<Value>,
    /// New schema; `Set(None)` removes it.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub schema: Patch<Option<Value>>,
    /// New schema-inheritance flag.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub use_default_schema: Patch<bool>,
    /// New override list.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub overrides: Patch<Vec<Override>>,
}

impl VariantPatch {
    /// Creates an empty patch.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Patch::Set(value.into());
        self
    }

    /// Sets the value from JSON-with-comments text.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the text is not valid JSON after
    /// comment removal.
    pub fn with_value_jsonc(mut self, text: &str) -> Result<Self> {
        self.value = Patch::Set(jsonc::parse(text)?);
        Ok(self)
    }

    /// Sets or removes the schema.
    #[must_use]
    pub fn with_schema(mut self, schema: Option<Value>) -> Self {
        self.schema = Patch::Set(schema);
        self
    }

    /// Sets the schema-inheritance flag.
    #[must_use]
    pub fn with_use_default_schema(mut self, inherit: bool) -> Self {
        self.use_default_schema = Patch::Set(inherit);
        self
    }

    /// Sets the overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<Override>) -> Self {
        self.overrides = Patch::Set(overrides);
        self
    }

    /// Returns true if no field is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.value.is_unchanged()
            && self.schema.is_unchanged()
            && self.use_default_schema.is_unchanged()
            && self.overrides.is_unchanged()
    }

    /// Returns true if the patch touches the schema or its inheritance.
    #[must_use]
    pub fn touches_schema(&self) -> bool {
        self.schema.is_set() || self.use_default_schema.is_set()
    }

    /// Names of the fields this patch sets.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.value.is_set() {
            fields.push("value");
        }
        if self.schema.is_set() {
            fields.push("schema");
        }
        if self.use_default_schema.is_set() {
            fields.push("useDefaultSchema");
        }
        if self.overrides.is_set() {
            fields.push("overrides");
        }
        fields
    }

    /// Applies the set fields to `variant` in place.
    pub fn apply_to(self, variant: &mut ConfigVariant) {
        self.value.apply_to(&mut variant.value);
        self.schema.apply_to(&mut variant.schema);
        self.use_default_schema
            .apply_to(&mut variant.use_default_schema);
        self.overrides.apply_to(&mut variant.overrides);
    }
}

/// Validates a config name: 1 to 100 characters of `[A-Za-z0-9_-]`.
///
/// # Errors
///
/// Returns a validation error describing the first violated rule.
///
/// # Examples
///
/// ```
/// use flagvault::model::validate_config_name;
///
/// assert!(validate_config_name("feature-flag_2").is_ok());
/// assert!(validate_config_name("").is_err());
/// assert!(validate_config_name("has space").is_err());
/// ```
pub fn validate_config_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::validation("name", "Cannot be empty"));
    }
    if name.chars().count() > MAX_CONFIG_NAME_LEN {
        return Err(Error::validation(
            "name",
            format!("Cannot exceed {MAX_CONFIG_NAME_LEN} characters"),
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(Error::validation(
            "name",
            format!("Invalid character '{bad}': only letters, digits, '_' and '-' are allowed"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_config_name() {
        assert!(validate_config_name("a").is_ok());
        assert!(validate_config_name(&"x".repeat(100)).is_ok());
        assert!(validate_config_name(&"x".repeat(101)).is_err());
        assert!(validate_config_name("dots.not.allowed").is_err());
        assert!(validate_config_name("ünïcode").is_err());
    }

    #[test]
    fn test_members_normalized() {
        let members = ConfigMembers::new(
            vec!["B@x.io".into(), "b@x.io ".into(), "a@x.io".into()],
            vec!["M@x.io".into()],
        );
        let normalized = members.normalized().unwrap();
        assert_eq!(normalized.editors, vec!["a@x.io", "b@x.io"]);
        assert_eq!(normalized.maintainers, vec!["m@x.io"]);
    }

    #[test]
    fn test_members_reject_overlap_and_invalid() {
        let overlap = ConfigMembers::new(vec!["a@x.io".into()], vec!["A@x.io".into()]);
        assert!(overlap.normalized().is_err());
        let invalid = ConfigMembers::new(vec!["nope".into()], vec![]);
        assert!(invalid.normalized().is_err());
    }

    #[test]
    fn test_members_role_of() {
        let members = ConfigMembers::new(vec!["e@x.io".into()], vec!["m@x.io".into()]);
        assert_eq!(members.role_of("E@x.io"), Some(ConfigRole::Editor));
        assert_eq!(members.role_of("m@x.io"), Some(ConfigRole::Maintainer));
        assert_eq!(members.role_of("z@x.io"), None);
    }

    #[test]
    fn test_config_role_parse_owner_alias() {
        assert_eq!(ConfigRole::parse("owner").unwrap(), ConfigRole::Maintainer);
        assert!(ConfigRole::parse("admin").is_err());
    }

    #[test]
    fn test_variant_value_jsonc() {
        let value = VariantValue::Jsonc("{ // on\n \"enabled\": true, }".into());
        assert_eq!(value.into_json().unwrap(), json!({"enabled": true}));
        let plain: VariantValue = json!([1]).into();
        assert_eq!(plain.into_json().unwrap(), json!([1]));
    }

    #[test]
    fn test_variant_patch_fields_and_apply() {
        let now = Utc::now();
        let mut variant = ConfigVariant {
            id: "v".into(),
            config_id: "c".into(),
            environment_id: Some("e".into()),
            value: json!(1),
            schema: Some(json!({"type": "number"})),
            use_default_schema: false,
            overrides: vec![],
            version: 1,
            created_at: now,
            updated_at: now,
        };
        let patch = VariantPatch::new().with_value(json!(2)).with_schema(None);
        assert_eq!(patch.changed_fields(), vec!["value", "schema"]);
        assert!(patch.touches_schema());
        patch.apply_to(&mut variant);
        assert_eq!(variant.value, json!(2));
        assert_eq!(variant.schema, None);
        assert!(VariantPatch::new().is_empty());
    }
}
