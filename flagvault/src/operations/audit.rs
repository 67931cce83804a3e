//! Reading the audit log.

use crate::database::Database;
use crate::error::{Error, Result};
use crate::model::{AuditLogEntry, Identity, ProjectRole};
use crate::permissions::ensure_project_role;

use super::manager::{project_role, ConfigManager};

/// Default number of records returned by [`ConfigManager::list_audit_log`].
pub const DEFAULT_AUDIT_PAGE: usize = 100;

impl ConfigManager {
    /// Returns one audit record. Project members can read every record of
    /// their project; records without a project are visible to their author.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown id and `Forbidden` when the record
    /// is not visible to the caller.
    pub fn get_audit_log_message(&self, identity: &Identity, id: &str) -> Result<AuditLogEntry> {
        let conn = self.db.connection();
        let entry = Database::get_audit_entry(conn, id)?
            .ok_or_else(|| Error::not_found(format!("audit log message {id}")))?;
        if identity.is(&entry.user_email) {
            return Ok(entry);
        }
        match &entry.project_id {
            Some(project_id) if project_role(conn, identity, project_id)?.is_some() => Ok(entry),
            _ => Err(Error::forbidden("audit log message is not visible to the caller")),
        }
    }

    /// Lists a project's most recent audit records, newest first.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is a project member.
    pub fn list_audit_log(
        &self,
        identity: &Identity,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>> {
        let conn = self.db.connection();
        ensure_project_role(project_role(conn, identity, project_id)?, ProjectRole::Viewer)?;
        Database::list_audit_entries(conn, project_id, limit)
    }
}
