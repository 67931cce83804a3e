//! Proposals: reviewable diffs against a config or one of its variants.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::config::{Config, ConfigMembers, ConfigVariant, VariantPatch};
use crate::model::patch::Patch;
use crate::overrides::Override;

/// Lifecycle state of a proposal. Only `Pending` can transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    /// Awaiting review.
    Pending,
    /// Applied. Terminal.
    Approved,
    /// Discarded. Terminal.
    Rejected,
}

impl ProposalStatus {
    /// Returns the stored representation of this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parses a stored status.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown statuses.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(Error::validation(
                "status",
                format!("unknown proposal status '{other}'"),
            )),
        }
    }
}

impl fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a proposal was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// A reviewer rejected it.
    RejectedExplicitly,
    /// A competing proposal on the same target was approved.
    AnotherProposalApproved,
    /// The target was edited directly, making the base stale.
    ConfigEdited,
    /// The config was deleted.
    ConfigDeleted,
}

impl RejectionReason {
    /// Returns the stored representation of this reason.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RejectedExplicitly => "rejected_explicitly",
            Self::AnotherProposalApproved => "another_proposal_approved",
            Self::ConfigEdited => "config_edited",
            Self::ConfigDeleted => "config_deleted",
        }
    }

    /// Parses a stored reason.
    ///
    /// # Errors
    ///
    /// Returns a validation error for unknown reasons.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "rejected_explicitly" => Ok(Self::RejectedExplicitly),
            "another_proposal_approved" => Ok(Self::AnotherProposalApproved),
            "config_edited" => Ok(Self::ConfigEdited),
            "config_deleted" => Ok(Self::ConfigDeleted),
            other => Err(Error::validation(
                "rejection_reason",
                format!("unknown rejection reason '{other}'"),
            )),
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a proposal changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProposalTarget {
    /// Config-level fields: description, membership, deletion.
    Config,
    /// One variant's value, schema or overrides.
    #[serde(rename_all = "camelCase")]
    Variant {
        /// The targeted variant.
        variant_id: String,
    },
}

impl ProposalTarget {
    /// Returns the targeted variant id, if any.
    #[must_use]
    pub fn variant_id(&self) -> Option<&str> {
        match self {
            Self::Config => None,
            Self::Variant { variant_id } => Some(variant_id),
        }
    }
}

/// The proposed changes. Absent fields leave the target untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProposalDiff {
    /// New variant value.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub value: Patch<Value>,
    /// New variant schema; `Set(None)` removes it.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub schema: Patch<Option<Value>>,
    /// New schema-inheritance flag.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub use_default_schema: Patch<bool>,
    /// New override list.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub overrides: Patch<Vec<Override>>,
    /// New config description.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub description: Patch<String>,
    /// New config membership.
    #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
    pub members: Patch<ConfigMembers>,
    /// Delete the config.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub delete: bool,
}

impl ProposalDiff {
    /// Creates an empty diff.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Proposes a new value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Patch::Set(value.into());
        self
    }

    /// Proposes a new schema, or its removal.
    #[must_use]
    pub fn with_schema(mut self, schema: Option<Value>) -> Self {
        self.schema = Patch::Set(schema);
        self
    }

    /// Proposes a new schema-inheritance flag.
    #[must_use]
    pub fn with_use_default_schema(mut self, inherit: bool) -> Self {
        self.use_default_schema = Patch::Set(inherit);
        self
    }

    /// Proposes new overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: Vec<Override>) -> Self {
        self.overrides = Patch::Set(overrides);
        self
    }

    /// Proposes a new description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Patch::Set(description.into());
        self
    }

    /// Proposes new membership.
    #[must_use]
    pub fn with_members(mut self, members: ConfigMembers) -> Self {
        self.members = Patch::Set(members);
        self
    }

    /// Proposes deletion of the config.
    #[must_use]
    pub fn with_delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Returns true if nothing is proposed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.touches_variant() && !self.touches_config()
    }

    /// Returns true if any variant-level field is set.
    #[must_use]
    pub fn touches_variant(&self) -> bool {
        self.value.is_set()
            || self.schema.is_set()
            || self.use_default_schema.is_set()
            || self.overrides.is_set()
    }

    /// Returns true if any config-level field is set.
    #[must_use]
    pub fn touches_config(&self) -> bool {
        self.description.is_set() || self.members.is_set() || self.delete
    }

    /// Names of the proposed fields, in a stable order.
    #[must_use]
    pub fn applied_fields(&self) -> Vec<&'static str> {
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
        if self.description.is_set() {
            fields.push("description");
        }
        if self.members.is_set() {
            fields.push("members");
        }
        if self.delete {
            fields.push("delete");
        }
        fields
    }

    /// Extracts the variant-level part of the diff.
    #[must_use]
    pub fn variant_patch(&self) -> VariantPatch {
        VariantPatch {
            value: self.value.clone(),
            schema: self.schema.clone(),
            use_default_schema: self.use_default_schema.clone(),
            overrides: self.overrides.clone(),
        }
    }

    /// Checks that the diff is non-empty and only sets fields that exist on
    /// `target`.
    ///
    /// # Errors
    ///
    /// Returns a bad-request error otherwise.
    pub fn check_target(&self, target: &ProposalTarget) -> Result<()> {
        if self.is_empty() {
            return Err(Error::bad_request("proposal does not change anything"));
        }
        match target {
            ProposalTarget::Config if self.touches_variant() => Err(Error::bad_request(
                "config proposals cannot change variant value, schema or overrides",
            )),
            ProposalTarget::Variant { .. } if self.touches_config() => Err(Error::bad_request(
                "variant proposals cannot change description, members or deletion",
            )),
            _ => Ok(()),
        }
    }
}

impl From<VariantPatch> for ProposalDiff {
    fn from(patch: VariantPatch) -> Self {
        Self {
            value: patch.value,
            schema: patch.schema,
            use_default_schema: patch.use_default_schema,
            overrides: patch.overrides,
            ..Self::default()
        }
    }
}

/// State of the target when the proposal was created, kept for
/// base-versus-proposed display after the target moves on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ProposalBase {
    /// Snapshot of config-level fields.
    #[serde(rename_all = "camelCase")]
    Config {
        /// Description at creation.
        description: String,
        /// Membership at creation.
        members: ConfigMembers,
    },
    /// Snapshot of one variant.
    #[serde(rename_all = "camelCase")]
    Variant {
        /// Value at creation.
        value: Value,
        /// Schema at creation.
        schema: Option<Value>,
        /// Inheritance flag at creation.
        use_default_schema: bool,
        /// Overrides at creation.
        overrides: Vec<Override>,
    },
}

impl ProposalBase {
    /// Snapshots config-level fields.
    #[must_use]
    pub fn of_config(config: &Config) -> Self {
        Self::Config {
            description: config.description.clone(),
            members: config.members.clone(),
        }
    }

    /// Snapshots a variant.
    #[must_use]
    pub fn of_variant(variant: &ConfigVariant) -> Self {
        Self::Variant {
            value: variant.value.clone(),
            schema: variant.schema.clone(),
            use_default_schema: variant.use_default_schema,
            overrides: variant.overrides.clone(),
        }
    }
}

/// A proposed change and its review outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    /// Proposal id.
    pub id: String,
    /// Owning config.
    pub config_id: String,
    /// Config-level or variant-level.
    pub target: ProposalTarget,
    /// Target version the diff was written against.
    pub base_version: i64,
    /// Target state at creation.
    pub base: ProposalBase,
    /// Proposed changes.
    pub diff: ProposalDiff,
    /// Email of the proposer.
    pub proposer_email: String,
    /// Optional note from the proposer.
    pub message: Option<String>,
    /// Lifecycle state.
    pub status: ProposalStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Approval time.
    pub approved_at: Option<DateTime<Utc>>,
    /// Rejection time.
    pub rejected_at: Option<DateTime<Utc>>,
    /// Email of whoever approved or rejected it.
    pub reviewer_email: Option<String>,
    /// Why it was rejected.
    pub rejection_reason: Option<RejectionReason>,
    /// The approved proposal that superseded this one.
    pub rejected_in_favor_of_proposal_id: Option<String>,
}

impl Proposal {
    /// Returns true while the proposal can still be reviewed.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == ProposalStatus::Pending
    }
}
