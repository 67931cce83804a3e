//! Conditional override rules and their evaluation.
//!
//! - [`Override`], [`Condition`], [`Operator`]: the stored rule model
//! - [`evaluate`]: first-match evaluation against a request context
//! - [`render_overrides`]: substitution of config references before evaluation

mod evaluator;
mod render;
mod rule;

pub use evaluator::{
    condition_matches, evaluate, json_equal, rule_matches, Evaluation, EvaluationContext,
};
pub use render::{render_overrides, ReferenceResolver};
pub use rule::{Condition, ConditionValue, Operator, Override};
