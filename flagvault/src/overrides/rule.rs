//! Override rule types.
//!
//! An [`Override`] replaces a variant's base value when every one of its
//! conditions matches the request context. Rules are stored and evaluated in
//! list order.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Comparison applied by a [`Condition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    /// Deep structural equality.
    Equals,
    /// Deep structural inequality of a present property.
    NotEquals,
    /// Property equals one of the listed values.
    In,
    /// Property equals none of the listed values.
    NotIn,
    /// Numeric `>`.
    GreaterThan,
    /// Numeric `>=`.
    GreaterThanOrEqual,
    /// Numeric `<`.
    LessThan,
    /// Numeric `<=`.
    LessThanOrEqual,
    /// Substring for strings, membership for arrays.
    Contains,
    /// String prefix.
    StartsWith,
    /// String suffix.
    EndsWith,
    /// Any operator this version does not know. Never matches.
    #[serde(other)]
    Unknown,
}

/// The right-hand side of a condition.
///
/// Bare JSON values are accepted as literals when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ConditionValue {
    /// A literal JSON value.
    Literal {
        /// The literal.
        value: Value,
    },
    /// The value of another config in the same project and environment,
    /// optionally narrowed by a path of object keys or array indexes.
    Reference {
        /// Name of the referenced config.
        #[serde(rename = "configName")]
        config_name: String,
        /// Path into the referenced value.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        path: Vec<String>,
    },
}

impl ConditionValue {
    /// Creates a literal condition value.
    #[must_use]
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal {
            value: value.into(),
        }
    }

    /// Creates a reference to another config's value.
    #[must_use]
    pub fn reference(config_name: impl Into<String>, path: Vec<String>) -> Self {
        Self::Reference {
            config_name: config_name.into(),
            path,
        }
    }

    /// Returns the literal value, or `None` for an unresolved reference.
    #[must_use]
    pub fn as_literal(&self) -> Option<&Value> {
        match self {
            Self::Literal { value } => Some(value),
            Self::Reference { .. } => None,
        }
    }

    fn from_json(raw: Value) -> Self {
        if let Value::Object(map) = &raw {
            match map.get("type").and_then(Value::as_str) {
                Some("literal") => {
                    if let Some(value) = map.get("value") {
                        return Self::literal(value.clone());
                    }
                }
                Some("reference") => {
                    if let Some(name) = map.get("configName").and_then(Value::as_str) {
                        let path = map
                            .get("path")
                            .and_then(Value::as_array)
                            .map(|segments| {
                                segments
                                    .iter()
                                    .map(|s| match s {
                                        Value::String(s) => s.clone(),
                                        other => other.to_string(),
                                    })
                                    .collect()
                            })
                            .unwrap_or_default();
                        return Self::reference(name, path);
                    }
                }
                _ => {}
            }
        }
        Self::Literal { value: raw }
    }
}

impl<'de> Deserialize<'de> for ConditionValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_json)
    }
}

/// A single `{property, operator, value}` test against the request context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Context property to read.
    pub property: String,
    /// Comparison to apply.
    pub operator: Operator,
    /// Right-hand side.
    pub value: ConditionValue,
}

impl Condition {
    /// Creates a condition with a literal right-hand side.
    #[must_use]
    pub fn new(property: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            property: property.into(),
            operator,
            value: ConditionValue::literal(value),
        }
    }
}

/// An ordered conditional rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Override {
    /// Rule name, reported when the rule wins.
    pub name: String,
    /// Conditions joined with AND. An empty list always matches.
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Value delivered when the rule wins.
    pub value: Value,
}

impl Override {
    /// Creates a rule with no conditions.
    #[must_use]
    pub fn new(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            name: name.into(),
            conditions: Vec::new(),
            value: value.into(),
        }
    }

    /// Appends a condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operator_wire_names() {
        assert_eq!(serde_json::to_value(Operator::NotIn).unwrap(), json!("notIn"));
        assert_eq!(
            serde_json::to_value(Operator::GreaterThanOrEqual).unwrap(),
            json!("greaterThanOrEqual")
        );
        let parsed: Operator = serde_json::from_value(json!("matchesRegex")).unwrap();
        assert_eq!(parsed, Operator::Unknown);
    }

    #[test]
    fn test_condition_value_tagged_forms() {
        let literal: ConditionValue =
            serde_json::from_value(json!({"type": "literal", "value": [1, 2]})).unwrap();
        assert_eq!(literal, ConditionValue::literal(json!([1, 2])));

        let reference: ConditionValue = serde_json::from_value(
            json!({"type": "reference", "configName": "plans", "path": ["pro", 0]}),
        )
        .unwrap();
        assert_eq!(
            reference,
            ConditionValue::reference("plans", vec!["pro".into(), "0".into()])
        );
    }

    #[test]
    fn test_condition_value_bare_json_is_literal() {
        let bare: ConditionValue = serde_json::from_value(json!("gold")).unwrap();
        assert_eq!(bare.as_literal(), Some(&json!("gold")));

        let odd: ConditionValue = serde_json::from_value(json!({"type": "reference"})).unwrap();
        assert_eq!(odd.as_literal(), Some(&json!({"type": "reference"})));
    }

    #[test]
    fn test_override_serialization_preserves_order() {
        let overrides = vec![
            Override::new("first", json!(1))
                .with_condition(Condition::new("country", Operator::Equals, "NL")),
            Override::new("second", json!(2)),
        ];
        let text = serde_json::to_string(&overrides).unwrap();
        let back: Vec<Override> = serde_json::from_str(&text).unwrap();
        assert_eq!(back, overrides);
        assert_eq!(back[0].name, "first");
    }
}
