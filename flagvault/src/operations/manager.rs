//! The use-case entry point and helpers shared by every operation file.

use rusqlite::Connection;

use crate::database::codec::{new_id, now};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::model::{AuditLogEntry, AuditMessage, Config, ConfigRole, Identity, Project, ProjectRole};
use crate::permissions::role_for;
use crate::replica::ConfigReplica;
use crate::settings::Settings;

/// Runs the mutating use cases against one database connection.
///
/// Every mutation runs inside a single `IMMEDIATE` transaction: permission
/// checks, compare-and-swap writes, proposal invalidation and the audit
/// record commit together or not at all. After a commit the attached
/// replica, if any, is told which variants changed.
///
/// # Examples
///
/// ```no_run
/// use flagvault::database::{Database, DatabaseConfig};
/// use flagvault::model::Identity;
/// use flagvault::operations::{ConfigManager, CreateProjectOptions};
///
/// let db = Database::open(DatabaseConfig::new("/tmp/flagvault.db")).unwrap();
/// let mut manager = ConfigManager::new(db);
/// let admin = Identity::new("admin@example.com").unwrap();
/// let project = manager
///     .create_project(&admin, CreateProjectOptions::new("checkout"))
///     .unwrap();
/// assert_eq!(manager.list_environments(&admin, &project.id).unwrap().len(), 2);
/// ```
#[derive(Debug)]
pub struct ConfigManager {
    pub(super) db: Database,
    replica: Option<ConfigReplica>,
    pub(super) default_require_proposals: bool,
    pub(super) default_allow_self_approvals: bool,
}

impl ConfigManager {
    /// Creates a manager with no replica attached.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self {
            db,
            replica: None,
            default_require_proposals: false,
            default_allow_self_approvals: false,
        }
    }

    /// Opens the database described by `settings`, attaches a replica on a
    /// second connection and applies the project defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the replica's
    /// initial load fails.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let db = Database::open(settings.database_config()?)?;
        let replica_db = db.reopen()?;
        let replica = if settings.resync_on_open() {
            ConfigReplica::open(replica_db)?
        } else {
            ConfigReplica::empty(replica_db)
        };
        Ok(Self::new(db)
            .with_replica(replica)
            .with_project_defaults(settings.require_proposals(), settings.allow_self_approvals()))
    }

    /// Attaches a replica to notify after each commit.
    #[must_use]
    pub fn with_replica(mut self, replica: ConfigReplica) -> Self {
        self.replica = Some(replica);
        self
    }

    /// Sets the proposal settings new projects start with.
    #[must_use]
    pub const fn with_project_defaults(
        mut self,
        require_proposals: bool,
        allow_self_approvals: bool,
    ) -> Self {
        self.default_require_proposals = require_proposals;
        self.default_allow_self_approvals = allow_self_approvals;
        self
    }

    /// Returns the underlying database.
    #[must_use]
    pub const fn database(&self) -> &Database {
        &self.db
    }

    /// Returns the attached replica.
    #[must_use]
    pub const fn replica(&self) -> Option<&ConfigReplica> {
        self.replica.as_ref()
    }

    /// Tells the replica about committed variant changes. The commit has
    /// already happened, so failures are logged rather than returned.
    pub(super) fn notify_replica(&self, variant_ids: &[String]) {
        let Some(replica) = &self.replica else {
            return;
        };
        if variant_ids.is_empty() {
            return;
        }
        if let Err(e) = replica.notify(variant_ids) {
            log::warn!("replica notification failed: {e}");
        }
    }
}

pub(super) fn load_project(conn: &Connection, project_id: &str) -> Result<Project> {
    Database::get_project(conn, project_id)?
        .ok_or_else(|| Error::not_found(format!("project {project_id}")))
}

/// Resolves the caller's effective role on a config.
pub(super) fn config_role(
    conn: &Connection,
    identity: &Identity,
    config: &Config,
) -> Result<Option<ConfigRole>> {
    let project_role = Database::get_project_role(conn, &config.project_id, identity.email())?;
    Ok(role_for(identity, project_role, &config.members))
}

pub(super) fn project_role(
    conn: &Connection,
    identity: &Identity,
    project_id: &str,
) -> Result<Option<ProjectRole>> {
    Database::get_project_role(conn, project_id, identity.email())
}

/// Appends an audit record inside the caller's transaction.
pub(super) fn record_audit(
    conn: &Connection,
    identity: &Identity,
    project_id: Option<&str>,
    config_id: Option<&str>,
    message: AuditMessage,
) -> Result<()> {
    let entry = AuditLogEntry {
        id: new_id(),
        project_id: project_id.map(String::from),
        config_id: config_id.map(String::from),
        user_email: identity.email().to_string(),
        message,
        created_at: now(),
    };
    Database::insert_audit_entry(conn, &entry)
}

pub(super) fn field_names(fields: &[&str]) -> Vec<String> {
    fields.iter().map(|f| (*f).to_string()).collect()
}

pub(super) fn require_non_empty(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(field, "Cannot be empty"));
    }
    Ok(trimmed.to_string())
}
