//! Layered settings for flagvault.
//!
//! Settings are merged from several sources. Highest precedence first:
//!
//! 1. Programmatic overrides (`SettingsBuilder::with_settings`)
//! 2. Environment variables (`FLAGVAULT_*`)
//! 3. Private project file (`flagvault.local.yaml`)
//! 4. Project file (`flagvault.yaml`, found by walking up)
//! 5. User file (`~/.flagvault/config.yaml`)
//! 6. Built-in defaults
//!
//! # Examples
//!
//! ```no_run
//! use flagvault::settings::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new().build().unwrap();
//! println!("database at {}", settings.database_config().unwrap().path.display());
//! ```

pub mod builder;
pub mod environment;
pub mod loader;
pub mod merger;
pub mod schema;
pub mod validator;

pub use builder::SettingsBuilder;
pub use environment::EnvironmentSettings;
pub use loader::{SettingsLoader, SettingsSource};
pub use merger::SettingsMerger;
pub use schema::{ProjectDefaults, ReplicaSettings, Settings};
pub use validator::SettingsValidator;
