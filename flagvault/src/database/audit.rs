//! SQL operations for the audit log.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::AuditLogEntry;

use super::codec::{column_json, from_millis, to_json, to_millis};
use super::connection::Database;

const SELECT_AUDIT_COLUMNS: &str =
    "SELECT id, project_id, config_id, user_email, payload, created_at FROM audit_log";

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    let payload: String = row.get(4)?;
    Ok(AuditLogEntry {
        id: row.get(0)?,
        project_id: row.get(1)?,
        config_id: row.get(2)?,
        user_email: row.get(3)?,
        message: column_json(&payload)?,
        created_at: from_millis(row.get(5)?),
    })
}

impl Database {
    /// Appends an audit record.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the insert fails.
    pub fn insert_audit_entry(conn: &Connection, entry: &AuditLogEntry) -> Result<()> {
        conn.execute(
            r"INSERT INTO audit_log
              (id, seq, project_id, config_id, user_email, kind, payload, created_at)
              VALUES (?, (SELECT COALESCE(MAX(seq), 0) + 1 FROM audit_log), ?, ?, ?, ?, ?, ?)",
            params![
                entry.id,
                entry.project_id,
                entry.config_id,
                entry.user_email,
                entry.message.kind(),
                to_json(&entry.message)?,
                to_millis(entry.created_at),
            ],
        )?;
        Ok(())
    }

    /// Retrieves one audit record.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_audit_entry(conn: &Connection, id: &str) -> Result<Option<AuditLogEntry>> {
        Ok(conn
            .query_row(
                &format!("{SELECT_AUDIT_COLUMNS} WHERE id = ?"),
                [id],
                row_to_entry,
            )
            .optional()?)
    }

    /// Lists a project's most recent audit records, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_audit_entries(
        conn: &Connection,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<AuditLogEntry>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_AUDIT_COLUMNS} WHERE project_id = ? ORDER BY seq DESC LIMIT ?"
        ))?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let entries = stmt
            .query_map(params![project_id, limit], row_to_entry)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::codec::{new_id, now};
    use crate::database::test_util::create_test_database;
    use crate::model::AuditMessage;

    fn entry(project_id: &str, name: &str) -> AuditLogEntry {
        AuditLogEntry {
            id: new_id(),
            project_id: Some(project_id.to_string()),
            config_id: None,
            user_email: "a@example.com".into(),
            message: AuditMessage::ConfigCreated {
                config_id: "c".into(),
                name: name.to_string(),
            },
            created_at: now(),
        }
    }

    #[test]
    fn test_audit_entries_newest_first() {
        let db = create_test_database();
        let conn = db.connection();
        let first = entry("p", "one");
        let second = entry("p", "two");
        Database::insert_audit_entry(conn, &first).unwrap();
        Database::insert_audit_entry(conn, &second).unwrap();
        Database::insert_audit_entry(conn, &entry("other", "three")).unwrap();

        let listed = Database::list_audit_entries(conn, "p", 10).unwrap();
        assert_eq!(listed, vec![second.clone(), first.clone()]);
        assert_eq!(Database::list_audit_entries(conn, "p", 1).unwrap(), vec![second]);
        assert_eq!(Database::get_audit_entry(conn, &first.id).unwrap(), Some(first));
        assert!(Database::get_audit_entry(conn, "missing").unwrap().is_none());
    }
}
