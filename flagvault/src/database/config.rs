//! Database configuration and path resolution.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::settings::environment::DATA_DIR_ENV;

/// File name of the database inside the data directory.
pub const DATABASE_FILE_NAME: &str = "flagvault.db";

/// Name of the default data directory under the home directory.
const DATA_DIR_NAME: &str = ".flagvault";

/// Configuration for database connections.
///
/// # Examples
///
/// ```
/// use flagvault::database::DatabaseConfig;
/// use std::time::Duration;
///
/// let config = DatabaseConfig::new("/tmp/flagvault.db")
///     .with_busy_timeout(Duration::from_millis(10000));
/// assert!(config.auto_create);
/// ```
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Path to the database file.
    pub path: PathBuf,
    /// Busy timeout for database lock contention.
    pub busy_timeout: Duration,
    /// Whether to create the database and its directory if missing.
    pub auto_create: bool,
    /// Whether to open the database in read-only mode.
    pub read_only: bool,
}

impl DatabaseConfig {
    /// Creates a configuration with a 5 s busy timeout, auto-create on and
    /// read-write access.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: Duration::from_millis(5000),
            auto_create: true,
            read_only: false,
        }
    }

    /// Sets the busy timeout duration.
    #[must_use]
    pub fn with_busy_timeout(mut self, timeout: Duration) -> Self {
        self.busy_timeout = timeout;
        self
    }

    /// Opens the database read-only. Disables `auto_create`.
    ///
    /// # Examples
    ///
    /// ```
    /// use flagvault::database::DatabaseConfig;
    ///
    /// let config = DatabaseConfig::new("/tmp/flagvault.db").read_only();
    /// assert!(config.read_only);
    /// assert!(!config.auto_create);
    /// ```
    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self.auto_create = false;
        self
    }
}

/// Returns the default data directory, `~/.flagvault`.
///
/// # Errors
///
/// Returns an error if the home directory cannot be determined.
pub fn default_data_dir() -> Result<PathBuf> {
    home::home_dir()
        .map(|home| home.join(DATA_DIR_NAME))
        .ok_or_else(|| Error::validation("home_directory", "Cannot determine home directory"))
}

/// Resolves the database path from `FLAGVAULT_DATA_DIR` or the default data
/// directory.
///
/// # Errors
///
/// Returns an error if the variable is unset and the home directory cannot
/// be determined.
pub fn resolve_database_path() -> Result<PathBuf> {
    match std::env::var(DATA_DIR_ENV) {
        Ok(dir) => Ok(PathBuf::from(dir).join(DATABASE_FILE_NAME)),
        Err(_) => Ok(default_data_dir()?.join(DATABASE_FILE_NAME)),
    }
}
