//! Domain types shared by the store, the use cases and the replica.

pub mod audit;
pub mod config;
pub mod identity;
pub mod keys;
pub mod patch;
pub mod project;
pub mod proposal;

pub use audit::{AuditLogEntry, AuditMessage};
pub use config::{
    validate_config_name, Config, ConfigMembers, ConfigRole, ConfigVariant, ResolvedVariant,
    VariantInput, VariantPatch, VariantValue, MAX_CONFIG_NAME_LEN,
};
pub use identity::{normalize_email, Identity};
pub use keys::{ApiKey, IssuedKey, SdkKey};
pub use patch::Patch;
pub use project::{Environment, Project, ProjectMember, ProjectRole};
pub use proposal::{
    Proposal, ProposalBase, ProposalDiff, ProposalStatus, ProposalTarget, RejectionReason,
};
