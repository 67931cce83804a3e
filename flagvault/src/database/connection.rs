//! Database connection management.

use rusqlite::{Connection, OpenFlags, Transaction, TransactionBehavior};

use crate::error::Result;

use super::config::DatabaseConfig;

/// A SQLite connection opened with the store's PRAGMA settings.
///
/// Independent `Database` values may be opened on the same file from
/// different threads; writers serialize on SQLite's lock.
///
/// # Examples
///
/// ```no_run
/// use flagvault::database::{Database, DatabaseConfig};
///
/// let db = Database::open(DatabaseConfig::new("/tmp/flagvault.db")).unwrap();
/// ```
#[derive(Debug)]
pub struct Database {
    pub(super) conn: Connection,
    config: DatabaseConfig,
}

impl Database {
    /// Opens a database connection with the given configuration.
    ///
    /// Creates the parent directory when `auto_create` is set, enables WAL
    /// and foreign keys, applies the busy timeout, and initializes or
    /// verifies the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, a PRAGMA fails, or the
    /// schema version is unsupported.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        if config.auto_create && !config.path.exists() {
            if let Some(parent) = config.path.parent() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let flags = if config.read_only {
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else if config.auto_create {
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX
        } else {
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX
        };

        let conn = Connection::open_with_flags(&config.path, flags)?;

        // journal_mode returns a row, so it cannot go through execute_batch.
        let _: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA synchronous = NORMAL")?;
        conn.execute_batch("PRAGMA foreign_keys = ON")?;
        conn.busy_timeout(config.busy_timeout)?;

        super::migrations::check_schema_compatibility(&conn)?;

        log::debug!("opened database at {}", config.path.display());
        Ok(Self { conn, config })
    }

    /// Returns the configuration this database was opened with.
    #[must_use]
    pub const fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// Opens a second, independent connection to the same file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened.
    pub fn reopen(&self) -> Result<Self> {
        Self::open(self.config.clone())
    }

    /// Returns a reference to the underlying SQLite connection.
    #[must_use]
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Starts an `IMMEDIATE` transaction, taking the write lock up front so
    /// that read-check-write sequences inside it cannot interleave with
    /// another writer.
    ///
    /// # Errors
    ///
    /// Returns an error if the lock cannot be taken within the busy timeout.
    pub fn begin_immediate(&mut self) -> Result<Transaction<'_>> {
        Ok(self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?)
    }

    /// Runs SQLite's integrity check.
    ///
    /// # Errors
    ///
    /// Returns a validation error describing the first problem found.
    pub fn verify_integrity(&self) -> Result<()> {
        let result: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        if result == "ok" {
            Ok(())
        } else {
            Err(crate::error::Error::validation("database", result))
        }
    }
}
