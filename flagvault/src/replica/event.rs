//! Change events published by the replica.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::ResolvedVariant;
use crate::overrides::Override;

/// What happened to a variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaEventKind {
    /// The variant appeared (or is part of a subscriber's initial replay).
    Created,
    /// The variant's content or version changed, or a config its overrides
    /// reference did.
    Updated,
    /// The variant no longer exists; the event carries its last snapshot.
    Deleted,
}

impl ReplicaEventKind {
    /// Returns the wire name of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ReplicaEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One change to an environment variant, as seen by a project subscriber.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplicaEvent {
    /// Created, updated or deleted.
    #[serde(rename = "type")]
    pub kind: ReplicaEventKind,
    /// Variant the event is about.
    pub variant_id: String,
    /// Owning config.
    pub config_id: String,
    /// Config name.
    pub config_name: String,
    /// Owning project.
    pub project_id: String,
    /// Environment of the variant.
    pub environment_id: String,
    /// Variant version.
    pub version: i64,
    /// Variant value.
    pub value: Value,
    /// Effective schema.
    pub schema: Option<Value>,
    /// Overrides with config references substituted.
    pub rendered_overrides: Vec<Override>,
}

impl ReplicaEvent {
    pub(crate) fn new(
        kind: ReplicaEventKind,
        variant: &ResolvedVariant,
        rendered_overrides: Vec<Override>,
    ) -> Self {
        Self {
            kind,
            variant_id: variant.variant_id.clone(),
            config_id: variant.config_id.clone(),
            config_name: variant.config_name.clone(),
            project_id: variant.project_id.clone(),
            environment_id: variant.environment_id.clone(),
            version: variant.version,
            value: variant.value.clone(),
            schema: variant.schema.clone(),
            rendered_overrides,
        }
    }
}
