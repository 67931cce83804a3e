//! Audit trail records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::config::ConfigMembers;
use crate::model::project::ProjectRole;
use crate::model::proposal::RejectionReason;

/// What happened, with just enough detail to render a history line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditMessage {
    /// A project was created.
    ProjectCreated {
        /// Affected project.
        project_id: String,
        /// Name at the time of the event.
        name: String,
    },
    /// Project-wide proposal settings changed.
    ProjectSettingsUpdated {
        /// Affected project.
        project_id: String,
        /// New proposal requirement.
        require_proposals: bool,
        /// New self-approval setting.
        allow_self_approvals: bool,
    },
    /// A project role was granted, changed or revoked (`role: None`).
    ProjectMemberChanged {
        /// Affected project.
        project_id: String,
        /// Affected member.
        email: String,
        /// New role.
        role: Option<ProjectRole>,
    },
    /// An environment was added.
    EnvironmentCreated {
        /// Affected environment.
        environment_id: String,
        /// Name at the time of the event.
        name: String,
    },
    /// An environment's proposal requirement changed.
    EnvironmentUpdated {
        /// Affected environment.
        environment_id: String,
        /// New proposal requirement.
        require_proposals: bool,
    },
    /// An environment and its variants were removed.
    EnvironmentDeleted {
        /// Affected environment.
        environment_id: String,
        /// Name at the time of the event.
        name: String,
    },
    /// A config and its variants were created.
    ConfigCreated {
        /// Affected config.
        config_id: String,
        /// Name at the time of the event.
        name: String,
    },
    /// Config-level fields other than membership changed.
    ConfigUpdated {
        /// Affected config.
        config_id: String,
        /// Names of the changed fields.
        fields: Vec<String>,
    },
    /// Config-level membership changed.
    ConfigMembersChanged {
        /// Affected config.
        config_id: String,
        /// Membership before the change.
        before: ConfigMembers,
        /// Membership after the change.
        after: ConfigMembers,
    },
    /// A variant was patched.
    ConfigVariantUpdated {
        /// Affected config.
        config_id: String,
        /// Affected variant.
        variant_id: String,
        /// Variant version after the change.
        version: i64,
        /// Names of the changed fields.
        fields: Vec<String>,
    },
    /// A config was deleted.
    ConfigDeleted {
        /// Affected config.
        config_id: String,
        /// Name at the time of the event.
        name: String,
    },
    /// A proposal was created.
    ProposalCreated {
        /// Affected proposal.
        proposal_id: String,
        /// Affected config.
        config_id: String,
    },
    /// A proposal was approved and applied.
    ProposalApproved {
        /// Affected proposal.
        proposal_id: String,
        /// Affected config.
        config_id: String,
        /// Names of the fields the approval applied.
        applied_fields: Vec<String>,
    },
    /// A proposal was rejected.
    ProposalRejected {
        /// Affected proposal.
        proposal_id: String,
        /// Affected config.
        config_id: String,
        /// Why it was rejected.
        reason: RejectionReason,
        /// The approved rival, for supersede rejections.
        rejected_in_favor_of_proposal_id: Option<String>,
    },
    /// An API key was issued.
    ApiKeyCreated {
        /// Affected key.
        key_id: String,
        /// Name at the time of the event.
        name: String,
    },
    /// An API key was revoked.
    ApiKeyDeleted {
        /// Affected key.
        key_id: String,
        /// Name at the time of the event.
        name: String,
    },
    /// An SDK key was issued.
    SdkKeyCreated {
        /// Affected key.
        key_id: String,
        /// Affected environment.
        environment_id: String,
        /// Name at the time of the event.
        name: String,
    },
    /// An SDK key was revoked.
    SdkKeyDeleted {
        /// Affected key.
        key_id: String,
        /// Name at the time of the event.
        name: String,
    },
}

impl AuditMessage {
    /// Short machine name of the event, as stored in the `kind` column.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::ProjectCreated { .. } => "project_created",
            Self::ProjectSettingsUpdated { .. } => "project_settings_updated",
            Self::ProjectMemberChanged { .. } => "project_member_changed",
            Self::EnvironmentCreated { .. } => "environment_created",
            Self::EnvironmentUpdated { .. } => "environment_updated",
            Self::EnvironmentDeleted { .. } => "environment_deleted",
            Self::ConfigCreated { .. } => "config_created",
            Self::ConfigUpdated { .. } => "config_updated",
            Self::ConfigMembersChanged { .. } => "config_members_changed",
            Self::ConfigVariantUpdated { .. } => "config_variant_updated",
            Self::ConfigDeleted { .. } => "config_deleted",
            Self::ProposalCreated { .. } => "proposal_created",
            Self::ProposalApproved { .. } => "proposal_approved",
            Self::ProposalRejected { .. } => "proposal_rejected",
            Self::ApiKeyCreated { .. } => "api_key_created",
            Self::ApiKeyDeleted { .. } => "api_key_deleted",
            Self::SdkKeyCreated { .. } => "sdk_key_created",
            Self::SdkKeyDeleted { .. } => "sdk_key_deleted",
        }
    }
}

/// One stored audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    /// Record id.
    pub id: String,
    /// Project the event belongs to; `None` for account-level events.
    pub project_id: Option<String>,
    /// Config the event belongs to, if any.
    pub config_id: Option<String>,
    /// Acting user.
    pub user_email: String,
    /// Event payload.
    pub message: AuditMessage,
    /// When it happened.
    pub created_at: DateTime<Utc>,
}
