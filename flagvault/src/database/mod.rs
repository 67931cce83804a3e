//! SQLite persistence for projects, configs, proposals, keys and the audit
//! log.
//!
//! Per-entity SQL lives in associated functions on [`Database`] that take a
//! `&Connection`, so the operations layer can compose several of them inside
//! one `IMMEDIATE` transaction.
//!
//! # Examples
//!
//! ```no_run
//! use flagvault::database::{Database, DatabaseConfig};
//!
//! let mut db = Database::open(DatabaseConfig::new("/tmp/flagvault.db")).unwrap();
//! let tx = db.begin_immediate().unwrap();
//! let project = Database::get_project(&tx, "some-project-id").unwrap();
//! tx.commit().unwrap();
//! assert!(project.is_none());
//! ```

mod audit;
pub(crate) mod codec;
mod config;
mod configs;
mod connection;
mod keys;
pub mod migrations;
mod projects;
mod proposals;
mod schema;

#[cfg(test)]
pub mod test_util;

// Re-export public API
pub use config::{default_data_dir, resolve_database_path, DatabaseConfig, DATABASE_FILE_NAME};
pub use connection::Database;
pub use keys::StoredSecret;
pub use proposals::PendingScope;

// Re-export migration functions for advanced use cases
pub use migrations::{check_schema_compatibility, get_schema_version, initialize_schema};
