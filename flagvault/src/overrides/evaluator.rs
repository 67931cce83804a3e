//! Override evaluation.
//!
//! [`evaluate`] is a pure function of its inputs: no I/O, no shared state,
//! and no failure mode. A condition that cannot be evaluated (missing
//! property, wrong value shape, unresolved reference, unknown operator)
//! simply does not match.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::rule::{Condition, Operator, Override};

/// Request context: property name to value.
pub type EvaluationContext = BTreeMap<String, Value>;

/// Outcome of evaluating a variant's overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    /// The effective value.
    pub value: Value,
    /// Name of the winning override, or `None` when the base value applies.
    pub matched_override_name: Option<String>,
}

/// Returns the value of the first override whose conditions all match, or
/// `base` when none does.
///
/// # Examples
///
/// ```
/// use flagvault::overrides::{evaluate, Condition, EvaluationContext, Operator, Override};
/// use serde_json::json;
///
/// let overrides = vec![
///     Override::new("beta-testers", json!({"enabled": true}))
///         .with_condition(Condition::new("plan", Operator::In, json!(["beta", "internal"]))),
/// ];
/// let mut context = EvaluationContext::new();
/// context.insert("plan".into(), json!("beta"));
///
/// let result = evaluate(&context, &overrides, &json!({"enabled": false}));
/// assert_eq!(result.value, json!({"enabled": true}));
/// assert_eq!(result.matched_override_name.as_deref(), Some("beta-testers"));
/// ```
#[must_use]
pub fn evaluate(context: &EvaluationContext, overrides: &[Override], base: &Value) -> Evaluation {
    overrides
        .iter()
        .find(|rule| rule_matches(context, rule))
        .map_or_else(
            || Evaluation {
                value: base.clone(),
                matched_override_name: None,
            },
            |rule| Evaluation {
                value: rule.value.clone(),
                matched_override_name: Some(rule.name.clone()),
            },
        )
}

/// Returns true if every condition of `rule` matches `context`.
#[must_use]
pub fn rule_matches(context: &EvaluationContext, rule: &Override) -> bool {
    rule.conditions
        .iter()
        .all(|condition| condition_matches(context, condition))
}

/// Evaluates a single condition.
#[must_use]
pub fn condition_matches(context: &EvaluationContext, condition: &Condition) -> bool {
    let Some(actual) = context.get(&condition.property) else {
        return false;
    };
    let Some(expected) = condition.value.as_literal() else {
        return false;
    };

    match condition.operator {
        Operator::Equals => json_equal(actual, expected),
        Operator::NotEquals => !json_equal(actual, expected),
        Operator::In => expected
            .as_array()
            .is_some_and(|set| set.iter().any(|item| json_equal(actual, item))),
        Operator::NotIn => expected
            .as_array()
            .is_some_and(|set| !set.iter().any(|item| json_equal(actual, item))),
        Operator::GreaterThan => compare(actual, expected, |a, b| a > b),
        Operator::GreaterThanOrEqual => compare(actual, expected, |a, b| a >= b),
        Operator::LessThan => compare(actual, expected, |a, b| a < b),
        Operator::LessThanOrEqual => compare(actual, expected, |a, b| a <= b),
        Operator::Contains => contains(actual, expected),
        Operator::StartsWith => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.starts_with(e.as_str()),
            _ => false,
        },
        Operator::EndsWith => match (actual, expected) {
            (Value::String(a), Value::String(e)) => a.ends_with(e.as_str()),
            _ => false,
        },
        Operator::Unknown => false,
    }
}

/// Deep structural equality where numbers compare by numeric value, so
/// `1` and `1.0` are equal.
#[must_use]
pub fn json_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(x), Some(y)) => x == y,
            _ => x == y,
        },
        (Value::Array(xs), Value::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| json_equal(x, y))
        }
        (Value::Object(xs), Value::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(key, x)| ys.get(key).is_some_and(|y| json_equal(x, y)))
        }
        _ => a == b,
    }
}

/// Coerces numbers and numeric strings to `f64`.
fn as_number(value: &Value) -> Option<f64> {
    let number = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    number.is_finite().then_some(number)
}

fn compare(actual: &Value, expected: &Value, op: impl Fn(f64, f64) -> bool) -> bool {
    match (as_number(actual), as_number(expected)) {
        (Some(a), Some(e)) => op(a, e),
        _ => false,
    }
}

fn contains(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::String(haystack), Value::String(needle)) => haystack.contains(needle.as_str()),
        (Value::Array(items), needle) => items.iter().any(|item| json_equal(item, needle)),
        _ => false,
    }
}
