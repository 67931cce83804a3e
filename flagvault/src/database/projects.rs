//! SQL operations for projects, their members and environments.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{Environment, Project, ProjectMember, ProjectRole};

use super::codec::{column_parse, from_millis, to_millis};
use super::connection::Database;

const SELECT_PROJECT: &str = r"
    SELECT id, name, description, require_proposals, allow_self_approvals, created_at, updated_at
    FROM projects
    WHERE id = ?
";

const SELECT_ENVIRONMENT_COLUMNS: &str =
    "SELECT id, project_id, name, position, require_proposals, created_at FROM environments";

fn row_to_project(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        require_proposals: row.get(3)?,
        allow_self_approvals: row.get(4)?,
        created_at: from_millis(row.get(5)?),
        updated_at: from_millis(row.get(6)?),
    })
}

fn row_to_environment(row: &Row<'_>) -> rusqlite::Result<Environment> {
    Ok(Environment {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        position: row.get(3)?,
        require_proposals: row.get(4)?,
        created_at: from_millis(row.get(5)?),
    })
}

impl Database {
    /// Inserts a project row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_project(conn: &Connection, project: &Project) -> Result<()> {
        conn.execute(
            r"INSERT INTO projects
              (id, name, description, require_proposals, allow_self_approvals, created_at, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                project.id,
                project.name,
                project.description,
                project.require_proposals,
                project.allow_self_approvals,
                to_millis(project.created_at),
                to_millis(project.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Retrieves a project by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
        Ok(conn
            .query_row(SELECT_PROJECT, [id], row_to_project)
            .optional()?)
    }

    /// Writes a project's proposal settings. Returns false if the project
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_project_settings(
        conn: &Connection,
        id: &str,
        require_proposals: bool,
        allow_self_approvals: bool,
        updated_at: i64,
    ) -> Result<bool> {
        let rows = conn.execute(
            r"UPDATE projects
              SET require_proposals = ?, allow_self_approvals = ?, updated_at = ?
              WHERE id = ?",
            params![require_proposals, allow_self_approvals, updated_at, id],
        )?;
        Ok(rows > 0)
    }

    /// Grants or changes a project role.
    ///
    /// # Errors
    ///
    /// Returns an error if the upsert fails.
    pub fn upsert_project_member(
        conn: &Connection,
        project_id: &str,
        email: &str,
        role: ProjectRole,
    ) -> Result<()> {
        conn.execute(
            r"INSERT INTO project_members (project_id, email, role) VALUES (?, ?, ?)
              ON CONFLICT (project_id, email) DO UPDATE SET role = excluded.role",
            params![project_id, email, role.as_str()],
        )?;
        Ok(())
    }

    /// Revokes a project role. Returns false if the email had none.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_project_member(conn: &Connection, project_id: &str, email: &str) -> Result<bool> {
        let rows = conn.execute(
            "DELETE FROM project_members WHERE project_id = ? AND email = ?",
            params![project_id, email],
        )?;
        Ok(rows > 0)
    }

    /// Returns the project role of `email`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or the stored role is unknown.
    pub fn get_project_role(
        conn: &Connection,
        project_id: &str,
        email: &str,
    ) -> Result<Option<ProjectRole>> {
        let role: Option<String> = conn
            .query_row(
                "SELECT role FROM project_members WHERE project_id = ? AND email = ?",
                params![project_id, email],
                |row| row.get(0),
            )
            .optional()?;
        role.map(|r| ProjectRole::parse(&r)).transpose()
    }

    /// Lists project members ordered by email.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_project_members(conn: &Connection, project_id: &str) -> Result<Vec<ProjectMember>> {
        let mut stmt = conn.prepare(
            "SELECT email, role FROM project_members WHERE project_id = ? ORDER BY email",
        )?;
        let members = stmt
            .query_map([project_id], |row| {
                let role: String = row.get(1)?;
                Ok(ProjectMember {
                    email: row.get(0)?,
                    role: column_parse(&role, ProjectRole::parse)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(members)
    }

    /// Inserts an environment row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails, including on a duplicate name.
    pub fn insert_environment(conn: &Connection, environment: &Environment) -> Result<()> {
        conn.execute(
            r"INSERT INTO environments
              (id, project_id, name, position, require_proposals, created_at)
              VALUES (?, ?, ?, ?, ?, ?)",
            params![
                environment.id,
                environment.project_id,
                environment.name,
                environment.position,
                environment.require_proposals,
                to_millis(environment.created_at),
            ],
        )?;
        Ok(())
    }

    /// Retrieves an environment by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_environment(conn: &Connection, id: &str) -> Result<Option<Environment>> {
        Ok(conn
            .query_row(
                &format!("{SELECT_ENVIRONMENT_COLUMNS} WHERE id = ?"),
                [id],
                row_to_environment,
            )
            .optional()?)
    }

    /// Lists a project's environments in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_environments(conn: &Connection, project_id: &str) -> Result<Vec<Environment>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_ENVIRONMENT_COLUMNS} WHERE project_id = ? ORDER BY position, name"
        ))?;
        let environments = stmt
            .query_map([project_id], row_to_environment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(environments)
    }

    /// Returns the position after the last environment of a project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn next_environment_position(conn: &Connection, project_id: &str) -> Result<i64> {
        Ok(conn.query_row(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM environments WHERE project_id = ?",
            [project_id],
            |row| row.get(0),
        )?)
    }

    /// Sets an environment's own proposal requirement.
    ///
    /// # Errors
    ///
    /// Returns an error if the update fails.
    pub fn update_environment_require_proposals(
        conn: &Connection,
        id: &str,
        require_proposals: bool,
    ) -> Result<bool> {
        let rows = conn.execute(
            "UPDATE environments SET require_proposals = ? WHERE id = ?",
            params![require_proposals, id],
        )?;
        Ok(rows > 0)
    }

    /// Deletes an environment. Its variants and SDK keys cascade.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_environment(conn: &Connection, id: &str) -> Result<bool> {
        let rows = conn.execute("DELETE FROM environments WHERE id = ?", [id])?;
        Ok(rows > 0)
    }
}
