//! JSON Schema checks for variant values.

use jsonschema::JSONSchema;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::ConfigVariant;

/// Checks that `schema` is a usable JSON Schema.
///
/// # Errors
///
/// Returns a validation error on the `schema` field if it does not compile.
pub fn check_schema(schema: &Value) -> Result<()> {
    JSONSchema::compile(schema)
        .map(|_| ())
        .map_err(|e| Error::validation("schema", format!("Invalid JSON Schema: {e}")))
}

/// Validates `value` against `schema`, collecting every violation.
///
/// # Errors
///
/// Returns a validation error on the `value` field listing each violation
/// with its instance path, or a schema error if the schema does not compile.
///
/// # Examples
///
/// ```
/// use flagvault::validation::validate_value;
/// use serde_json::json;
///
/// let schema = json!({"type": "object", "required": ["enabled"]});
/// assert!(validate_value(&schema, &json!({"enabled": true})).is_ok());
/// assert!(validate_value(&schema, &json!({})).is_err());
/// ```
pub fn validate_value(schema: &Value, value: &Value) -> Result<()> {
    let compiled = JSONSchema::compile(schema)
        .map_err(|e| Error::validation("schema", format!("Invalid JSON Schema: {e}")))?;

    let messages: Vec<String> = match compiled.validate(value) {
        Ok(()) => return Ok(()),
        Err(errors) => errors
            .map(|e| {
                let path = e.instance_path.to_string();
                if path.is_empty() {
                    e.to_string()
                } else {
                    format!("{path}: {e}")
                }
            })
            .collect(),
    };

    Err(Error::validation("value", messages.join("; ")))
}

/// Returns the schema that governs `variant`: its own, or the default
/// variant's when it inherits. The default variant always uses its own.
#[must_use]
pub fn effective_schema<'a>(
    variant: &'a ConfigVariant,
    default_variant: Option<&'a ConfigVariant>,
) -> Option<&'a Value> {
    if variant.use_default_schema && !variant.is_default() {
        default_variant.and_then(|d| d.schema.as_ref())
    } else {
        variant.schema.as_ref()
    }
}

/// Validates a variant's value and schema in their final form.
///
/// # Errors
///
/// Returns a validation error if its schema does not compile, the value
/// violates the effective schema, or the default variant is marked as
/// inheriting a schema.
pub fn validate_variant(variant: &ConfigVariant, default_variant: Option<&ConfigVariant>) -> Result<()> {
    if variant.is_default() && variant.use_default_schema {
        return Err(Error::validation(
            "useDefaultSchema",
            "The default variant cannot inherit a schema",
        ));
    }
    if let Some(schema) = &variant.schema {
        check_schema(schema)?;
    }
    match effective_schema(variant, default_variant) {
        Some(schema) => validate_value(schema, &variant.value),
        None => Ok(()),
    }
}
