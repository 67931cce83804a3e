//! Partial-update field wrapper.
//!
//! A [`Patch`] distinguishes "leave this field alone" from "set this field",
//! including setting it to an explicit null. On the wire an untouched field
//! is omitted and a set field is wrapped as `{"newValue": ...}`, so clearing
//! a schema is `{"newValue": null}` while omitting the key keeps it.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A field in a partial update.
///
/// # Examples
///
/// ```
/// use flagvault::Patch;
/// use serde_json::json;
///
/// let keep: Patch<Option<serde_json::Value>> = Patch::Unchanged;
/// let clear: Patch<Option<serde_json::Value>> = Patch::Set(None);
/// let set = Patch::Set(Some(json!({"type": "boolean"})));
///
/// assert!(!keep.is_set());
/// assert!(clear.is_set());
/// assert_eq!(set.as_set(), Some(&Some(json!({"type": "boolean"}))));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Patch<T> {
    /// The field is not part of the update.
    #[default]
    Unchanged,
    /// The field is replaced with the given value.
    Set(T),
}

impl<T> Patch<T> {
    /// Returns true if the field is part of the update.
    #[must_use]
    pub const fn is_set(&self) -> bool {
        matches!(self, Self::Set(_))
    }

    /// Returns true if the field is not part of the update.
    ///
    /// Used as a `skip_serializing_if` predicate.
    #[must_use]
    pub const fn is_unchanged(&self) -> bool {
        matches!(self, Self::Unchanged)
    }

    /// Returns the new value, if any.
    #[must_use]
    pub const fn as_set(&self) -> Option<&T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unchanged => None,
        }
    }

    /// Consumes the patch, returning the new value, if any.
    #[must_use]
    pub fn into_set(self) -> Option<T> {
        match self {
            Self::Set(value) => Some(value),
            Self::Unchanged => None,
        }
    }

    /// Maps the new value, keeping `Unchanged` as is.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Patch<U> {
        match self {
            Self::Set(value) => Patch::Set(f(value)),
            Self::Unchanged => Patch::Unchanged,
        }
    }

    /// Writes the new value into `target` if the field is set.
    pub fn apply_to(self, target: &mut T) {
        if let Self::Set(value) = self {
            *target = value;
        }
    }
}

impl<T> From<Option<T>> for Patch<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Unchanged, Self::Set)
    }
}

#[derive(Serialize)]
struct WrappedRef<'a, T> {
    #[serde(rename = "newValue")]
    new_value: &'a T,
}

#[derive(Deserialize)]
struct Wrapped<T> {
    #[serde(rename = "newValue")]
    new_value: T,
}

impl<T: Serialize> Serialize for Patch<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unchanged => serializer.serialize_none(),
            Self::Set(value) => WrappedRef { new_value: value }.serialize(serializer),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Patch<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<Wrapped<T>>::deserialize(deserializer)?
            .map_or(Self::Unchanged, |wrapped| Self::Set(wrapped.new_value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    #[derive(Debug, Default, Serialize, Deserialize, PartialEq)]
    struct Holder {
        #[serde(default, skip_serializing_if = "Patch::is_unchanged")]
        schema: Patch<Option<Value>>,
    }

    #[test]
    fn test_absent_field_is_unchanged() {
        let holder: Holder = serde_json::from_value(json!({})).unwrap();
        assert_eq!(holder.schema, Patch::Unchanged);
        assert_eq!(serde_json::to_value(&holder).unwrap(), json!({}));
    }

    #[test]
    fn test_explicit_null_is_set_none() {
        let holder: Holder = serde_json::from_value(json!({"schema": {"newValue": null}})).unwrap();
        assert_eq!(holder.schema, Patch::Set(None));
        assert_eq!(
            serde_json::to_value(&holder).unwrap(),
            json!({"schema": {"newValue": null}})
        );
    }

    #[test]
    fn test_set_value() {
        let holder: Holder =
            serde_json::from_value(json!({"schema": {"newValue": {"type": "string"}}})).unwrap();
        assert_eq!(holder.schema, Patch::Set(Some(json!({"type": "string"}))));
    }

    #[test]
    fn test_apply_to_and_map() {
        let mut target = 1;
        Patch::Unchanged.apply_to(&mut target);
        assert_eq!(target, 1);
        Patch::Set(5).map(|v| v * 2).apply_to(&mut target);
        assert_eq!(target, 10);
        assert_eq!(Patch::from(Some(3)).into_set(), Some(3));
        assert_eq!(Patch::<i32>::from(None), Patch::Unchanged);
    }
}
