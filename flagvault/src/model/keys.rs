//! Bearer credentials: account-level API keys and environment-scoped SDK keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Account-level key used by automation to act as its creator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    /// Key id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Owner; the only identity allowed to delete the key.
    pub creator_email: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Read-only key an SDK uses to fetch configs for one environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkKey {
    /// Key id.
    pub id: String,
    /// Project the key reads from.
    pub project_id: String,
    /// Environment the key reads from.
    pub environment_id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
    /// Owner; the only identity allowed to delete the key.
    pub creator_email: String,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// A freshly created key together with its plaintext token.
///
/// The token is only available here; storage keeps a salted hash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedKey<K> {
    /// Stored key metadata.
    pub key: K,
    /// Plaintext bearer token.
    pub token: String,
}
