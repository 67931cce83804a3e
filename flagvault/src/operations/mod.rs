//! Use cases over the version store.
//!
//! Every operation is a method on [`ConfigManager`] taking the caller's
//! [`Identity`](crate::model::Identity) plus a parameter value, and runs as
//! a single immediate transaction: permission checks, compare-and-swap
//! writes, proposal bookkeeping and the audit record all commit together or
//! not at all. Committed variant changes are then pushed to the attached
//! [`ConfigReplica`](crate::replica::ConfigReplica), if any.
//!
//! # Examples
//!
//! ```no_run
//! use flagvault::database::{Database, DatabaseConfig};
//! use flagvault::model::{Identity, VariantInput};
//! use flagvault::operations::{ConfigManager, CreateConfigOptions, CreateProjectOptions};
//! use serde_json::json;
//!
//! let db = Database::open(DatabaseConfig::new("/tmp/flagvault.db")).unwrap();
//! let mut manager = ConfigManager::new(db);
//! let admin = Identity::new("admin@example.com").unwrap();
//!
//! let project = manager.create_project(&admin, CreateProjectOptions::new("shop")).unwrap();
//! let created = manager
//!     .create_config(
//!         &admin,
//!         CreateConfigOptions::new(&project.id, "feature-flag", VariantInput::new(json!(true))),
//!     )
//!     .unwrap();
//! assert_eq!(created.config_variant_ids.len(), 3);
//! ```

mod audit;
mod configs;
mod keys;
mod manager;
mod projects;
mod proposals;

pub use audit::DEFAULT_AUDIT_PAGE;
pub use configs::{
    ConfigDetails, ConfigSummary, CreateConfigOptions, CreateConfigResult, PatchConfigOptions,
};
pub use keys::CreateSdkKeyOptions;
pub use manager::ConfigManager;
pub use projects::{
    CreateEnvironmentOptions, CreateProjectOptions, ProjectSettingsUpdate, DEFAULT_ENVIRONMENTS,
};
pub use proposals::CreateProposalOptions;

#[cfg(test)]
pub(crate) mod test_support {
    use serde_json::Value;

    use super::{ConfigManager, CreateConfigOptions, CreateConfigResult, CreateProjectOptions};
    use crate::database::test_util::create_test_database;
    use crate::model::{Identity, Project, VariantInput};

    pub fn manager() -> ConfigManager {
        ConfigManager::new(create_test_database())
    }

    pub fn identity(email: &str) -> Identity {
        Identity::new(email).unwrap()
    }

    /// Project `shop` administered by `admin@example.com`, holding the
    /// config `feature-flag` with `value` as its default.
    pub fn project_with_config(value: Value) -> (ConfigManager, Identity, Project, CreateConfigResult) {
        let mut manager = manager();
        let admin = identity("admin@example.com");
        let project = manager
            .create_project(&admin, CreateProjectOptions::new("shop"))
            .unwrap();
        let created = manager
            .create_config(
                &admin,
                CreateConfigOptions::new(&project.id, "feature-flag", VariantInput::new(value)),
            )
            .unwrap();
        (manager, admin, project, created)
    }
}
