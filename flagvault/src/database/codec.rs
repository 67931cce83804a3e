//! Column encodings shared by the per-entity SQL files.
//!
//! Timestamps are Unix milliseconds, JSON documents are text, booleans are
//! 0/1 integers and ids are UUID v4 strings.

use chrono::{DateTime, TimeZone, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// Generates a fresh row id.
pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Current time truncated to millisecond precision, so that values read
/// back from the database compare equal to the ones written.
pub(crate) fn now() -> DateTime<Utc> {
    from_millis(Utc::now().timestamp_millis())
}

pub(crate) fn to_millis(time: DateTime<Utc>) -> i64 {
    time.timestamp_millis()
}

pub(crate) fn from_millis(millis: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

pub(crate) fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Decodes a JSON column inside a row mapper.
pub(crate) fn column_json<T: DeserializeOwned>(text: &str) -> rusqlite::Result<T> {
    serde_json::from_str(text).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

/// Decodes a value with a fallible parser inside a row mapper.
pub(crate) fn column_parse<T>(
    text: &str,
    parse: impl FnOnce(&str) -> Result<T>,
) -> rusqlite::Result<T> {
    parse(text).map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_millis_round_trip_is_exact() {
        let t = now();
        assert_eq!(from_millis(to_millis(t)), t);
    }

    #[test]
    fn test_new_id_is_unique() {
        assert_ne!(new_id(), new_id());
        assert_eq!(new_id().len(), 36);
    }
}
