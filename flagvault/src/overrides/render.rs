//! Substitution of config references inside override conditions.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use super::rule::{ConditionValue, Override};

/// Looks up the current value of a config by name.
pub trait ReferenceResolver {
    /// Returns the value of `config_name`, or `None` if it does not exist.
    fn resolve_reference(&self, config_name: &str) -> Option<Value>;
}

impl<F> ReferenceResolver for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn resolve_reference(&self, config_name: &str) -> Option<Value> {
        self(config_name)
    }
}

impl ReferenceResolver for HashMap<String, Value> {
    fn resolve_reference(&self, config_name: &str) -> Option<Value> {
        self.get(config_name).cloned()
    }
}

impl ReferenceResolver for BTreeMap<String, Value> {
    fn resolve_reference(&self, config_name: &str) -> Option<Value> {
        self.get(config_name).cloned()
    }
}

/// Returns a copy of `overrides` with every resolvable reference replaced by
/// a literal. References that cannot be resolved are kept, and later fail
/// their condition during evaluation.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use flagvault::overrides::{render_overrides, Condition, ConditionValue, Operator, Override};
/// use serde_json::json;
///
/// let mut rule = Override::new("vip", json!(true));
/// rule.conditions.push(Condition {
///     property: "userId".into(),
///     operator: Operator::In,
///     value: ConditionValue::reference("vip-users", vec!["ids".into()]),
/// });
///
/// let mut configs = HashMap::new();
/// configs.insert("vip-users".to_string(), json!({"ids": ["u1", "u2"]}));
///
/// let rendered = render_overrides(&[rule], &configs);
/// assert_eq!(rendered[0].conditions[0].value, ConditionValue::literal(json!(["u1", "u2"])));
/// ```
#[must_use]
pub fn render_overrides(overrides: &[Override], resolver: &dyn ReferenceResolver) -> Vec<Override> {
    overrides
        .iter()
        .map(|rule| {
            let mut rendered = rule.clone();
            for condition in &mut rendered.conditions {
                if let ConditionValue::Reference { config_name, path } = &condition.value {
                    if let Some(value) = resolver
                        .resolve_reference(config_name)
                        .and_then(|root| select_path(&root, path).cloned())
                    {
                        condition.value = ConditionValue::Literal { value };
                    }
                }
            }
            rendered
        })
        .collect()
}

/// Walks `path` through objects (by key) and arrays (by decimal index).
fn select_path<'a>(root: &'a Value, path: &[String]) -> Option<&'a Value> {
    path.iter().try_fold(root, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}
