//! Settings schema definitions.
//!
//! Every field is optional so that partial files can be layered; the
//! accessor methods apply built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::database::{default_data_dir, DatabaseConfig, DATABASE_FILE_NAME};
use crate::error::Result;
use crate::logging::LogLevel;

/// Default SQLite busy timeout.
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;

/// Complete settings structure.
///
/// # Examples
///
/// ```
/// use flagvault::settings::{ProjectDefaults, Settings};
///
/// let settings = Settings {
///     busy_timeout_ms: Some(250),
///     projects: Some(ProjectDefaults {
///         require_proposals: Some(true),
///         allow_self_approvals: None,
///     }),
///     ..Default::default()
/// };
/// assert!(settings.require_proposals());
/// assert!(!settings.allow_self_approvals());
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Directory holding the database and the user settings file.
    pub data_dir: Option<PathBuf>,

    /// How long a connection waits on a locked database (milliseconds).
    pub busy_timeout_ms: Option<u64>,

    /// Log verbosity: `quiet`, `normal` or `verbose`.
    pub log_mode: Option<String>,

    /// Defaults for newly created projects.
    pub projects: Option<ProjectDefaults>,

    /// Replica behavior.
    pub replica: Option<ReplicaSettings>,
}

/// Settings applied to projects at creation time.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ProjectDefaults {
    /// Whether new projects require proposals for every change.
    pub require_proposals: Option<bool>,

    /// Whether proposers may approve their own proposals.
    pub allow_self_approvals: Option<bool>,
}

/// Replica behavior.
#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ReplicaSettings {
    /// Load every variant when the replica is opened.
    pub resync_on_open: Option<bool>,
}

impl Settings {
    /// Resolves the data directory, defaulting to `~/.flagvault`.
    ///
    /// # Errors
    ///
    /// Returns an error if no data directory is set and the home directory
    /// cannot be determined.
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }

    /// Busy timeout with the default applied.
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms.unwrap_or(DEFAULT_BUSY_TIMEOUT_MS))
    }

    /// Log level with the default applied. Unparseable modes fall back to
    /// normal; the validator rejects them earlier.
    #[must_use]
    pub fn log_level(&self) -> LogLevel {
        self.log_mode
            .as_deref()
            .and_then(|mode| LogLevel::parse(mode).ok())
            .unwrap_or(LogLevel::Normal)
    }

    /// Default `require_proposals` for new projects.
    #[must_use]
    pub fn require_proposals(&self) -> bool {
        self.projects
            .as_ref()
            .and_then(|p| p.require_proposals)
            .unwrap_or(false)
    }

    /// Default `allow_self_approvals` for new projects.
    #[must_use]
    pub fn allow_self_approvals(&self) -> bool {
        self.projects
            .as_ref()
            .and_then(|p| p.allow_self_approvals)
            .unwrap_or(false)
    }

    /// Whether the replica loads all variants on open.
    #[must_use]
    pub fn resync_on_open(&self) -> bool {
        self.replica
            .as_ref()
            .and_then(|r| r.resync_on_open)
            .unwrap_or(true)
    }

    /// Derives the database configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the data directory cannot be resolved.
    pub fn database_config(&self) -> Result<DatabaseConfig> {
        Ok(DatabaseConfig::new(self.data_dir()?.join(DATABASE_FILE_NAME))
            .with_busy_timeout(self.busy_timeout()))
    }
}
