//! SQL operations for configs and their variants.
//!
//! Every versioned write is a compare-and-swap:
//! `UPDATE ... SET version = version + 1 WHERE id = ? AND version = ?`.
//! Zero affected rows means the caller's version is stale (or the row is
//! gone), and the surrounding transaction must be rolled back.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result};
use crate::model::{Config, ConfigMembers, ConfigRole, ConfigVariant, ResolvedVariant};

use super::codec::{column_json, from_millis, to_json, to_millis};
use super::connection::Database;

const SELECT_CONFIG_COLUMNS: &str = r"
    SELECT c.id, c.project_id, c.name, c.description, c.creator_email, c.version,
           c.created_at, c.updated_at,
           (SELECT COUNT(*) FROM proposals p WHERE p.config_id = c.id AND p.status = 'pending')
    FROM configs c
";

const SELECT_VARIANT_COLUMNS: &str = r"
    SELECT id, config_id, environment_id, value, schema, use_default_schema, overrides,
           version, created_at, updated_at
    FROM config_variants
";

// Environment variants joined with their config and the default variant's
// schema, for the replica.
const SELECT_RESOLVED_VARIANTS: &str = r"
    SELECT v.id, c.id, c.name, c.project_id, v.environment_id, v.value,
           CASE WHEN v.use_default_schema THEN d.schema ELSE v.schema END,
           v.overrides, v.version
    FROM config_variants v
    JOIN configs c ON c.id = v.config_id
    LEFT JOIN config_variants d ON d.config_id = v.config_id AND d.environment_id IS NULL
    WHERE v.environment_id IS NOT NULL
";

fn row_to_config(row: &Row<'_>) -> rusqlite::Result<Config> {
    Ok(Config {
        id: row.get(0)?,
        project_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        creator_email: row.get(4)?,
        version: row.get(5)?,
        created_at: from_millis(row.get(6)?),
        updated_at: from_millis(row.get(7)?),
        members: ConfigMembers::default(),
        pending_proposals: row.get(8)?,
    })
}

fn row_to_variant(row: &Row<'_>) -> rusqlite::Result<ConfigVariant> {
    let value: String = row.get(3)?;
    let schema: Option<String> = row.get(4)?;
    let overrides: String = row.get(6)?;
    Ok(ConfigVariant {
        id: row.get(0)?,
        config_id: row.get(1)?,
        environment_id: row.get(2)?,
        value: column_json(&value)?,
        schema: schema.as_deref().map(column_json).transpose()?,
        use_default_schema: row.get(5)?,
        overrides: column_json(&overrides)?,
        version: row.get(7)?,
        created_at: from_millis(row.get(8)?),
        updated_at: from_millis(row.get(9)?),
    })
}

fn row_to_resolved(row: &Row<'_>) -> rusqlite::Result<ResolvedVariant> {
    let value: String = row.get(5)?;
    let schema: Option<String> = row.get(6)?;
    let overrides: String = row.get(7)?;
    Ok(ResolvedVariant {
        variant_id: row.get(0)?,
        config_id: row.get(1)?,
        config_name: row.get(2)?,
        project_id: row.get(3)?,
        environment_id: row.get(4)?,
        value: column_json(&value)?,
        schema: schema.as_deref().map(column_json).transpose()?,
        overrides: column_json(&overrides)?,
        version: row.get(8)?,
    })
}

impl Database {
    /// Inserts a config row and its member grants.
    ///
    /// # Errors
    ///
    /// Returns an error if an insert fails, including on a duplicate name
    /// within the project.
    pub fn insert_config(conn: &Connection, config: &Config) -> Result<()> {
        conn.execute(
            r"INSERT INTO configs
              (id, project_id, name, description, creator_email, version, created_at, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                config.id,
                config.project_id,
                config.name,
                config.description,
                config.creator_email,
                config.version,
                to_millis(config.created_at),
                to_millis(config.updated_at),
            ],
        )?;
        Self::replace_config_members(conn, &config.id, &config.members)
    }

    /// Replaces every member grant of a config.
    ///
    /// # Errors
    ///
    /// Returns an error if a statement fails.
    pub fn replace_config_members(
        conn: &Connection,
        config_id: &str,
        members: &ConfigMembers,
    ) -> Result<()> {
        conn.execute("DELETE FROM config_members WHERE config_id = ?", [config_id])?;
        let mut stmt =
            conn.prepare("INSERT INTO config_members (config_id, email, role) VALUES (?, ?, ?)")?;
        for email in &members.editors {
            stmt.execute(params![config_id, email, ConfigRole::Editor.as_str()])?;
        }
        for email in &members.maintainers {
            stmt.execute(params![config_id, email, ConfigRole::Maintainer.as_str()])?;
        }
        Ok(())
    }

    fn load_config_members(conn: &Connection, config_id: &str) -> Result<ConfigMembers> {
        let mut stmt = conn
            .prepare("SELECT email, role FROM config_members WHERE config_id = ? ORDER BY email")?;
        let mut members = ConfigMembers::default();
        let rows = stmt.query_map([config_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (email, role) = row?;
            match ConfigRole::parse(&role)? {
                ConfigRole::Maintainer => members.maintainers.push(email),
                ConfigRole::Editor => members.editors.push(email),
                ConfigRole::Viewer => {}
            }
        }
        Ok(members)
    }

    fn with_members(conn: &Connection, config: Option<Config>) -> Result<Option<Config>> {
        match config {
            Some(mut config) => {
                config.members = Self::load_config_members(conn, &config.id)?;
                Ok(Some(config))
            }
            None => Ok(None),
        }
    }

    /// Retrieves a config with its members and pending-proposal count.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn get_config(conn: &Connection, id: &str) -> Result<Option<Config>> {
        let config = conn
            .query_row(
                &format!("{SELECT_CONFIG_COLUMNS} WHERE c.id = ?"),
                [id],
                row_to_config,
            )
            .optional()?;
        Self::with_members(conn, config)
    }

    /// Retrieves a config by project and name.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn get_config_by_name(
        conn: &Connection,
        project_id: &str,
        name: &str,
    ) -> Result<Option<Config>> {
        let config = conn
            .query_row(
                &format!("{SELECT_CONFIG_COLUMNS} WHERE c.project_id = ? AND c.name = ?"),
                params![project_id, name],
                row_to_config,
            )
            .optional()?;
        Self::with_members(conn, config)
    }

    /// Lists a project's configs ordered by name.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn list_configs(conn: &Connection, project_id: &str) -> Result<Vec<Config>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_CONFIG_COLUMNS} WHERE c.project_id = ? ORDER BY c.name"
        ))?;
        let configs = stmt
            .query_map([project_id], row_to_config)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        configs
            .into_iter()
            .map(|mut config| {
                config.members = Self::load_config_members(conn, &config.id)?;
                Ok(config)
            })
            .collect()
    }

    fn stale_version(
        conn: &Connection,
        table: &str,
        entity: &str,
        id: &str,
        expected: i64,
    ) -> Error {
        let found: rusqlite::Result<Option<i64>> = conn
            .query_row(&format!("SELECT version FROM {table} WHERE id = ?"), [id], |row| {
                row.get(0)
            })
            .optional();
        match found {
            Ok(Some(found)) => {
                log::debug!("version conflict on {entity} {id}: expected {expected}, found {found}");
                Error::VersionConflict {
                    entity: format!("{entity} {id}"),
                    expected,
                    found,
                }
            }
            Ok(None) => Error::not_found(format!("{entity} {id}")),
            Err(e) => e.into(),
        }
    }

    /// Bumps a config's aggregate version if it still equals `prev_version`,
    /// optionally writing a new description. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionConflict`] on a stale version and
    /// [`Error::NotFound`] if the config does not exist.
    pub fn bump_config_version(
        conn: &Connection,
        id: &str,
        prev_version: i64,
        description: Option<&str>,
        updated_at: i64,
    ) -> Result<i64> {
        let rows = conn.execute(
            r"UPDATE configs
              SET version = version + 1,
                  description = COALESCE(?, description),
                  updated_at = ?
              WHERE id = ? AND version = ?",
            params![description, updated_at, id, prev_version],
        )?;
        if rows == 0 {
            return Err(Self::stale_version(conn, "configs", "config", id, prev_version));
        }
        Ok(prev_version + 1)
    }

    /// Deletes a config if its version still equals `prev_version`. Variants
    /// and member grants cascade; proposals are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionConflict`] on a stale version and
    /// [`Error::NotFound`] if the config does not exist.
    pub fn delete_config_versioned(conn: &Connection, id: &str, prev_version: i64) -> Result<()> {
        let rows = conn.execute(
            "DELETE FROM configs WHERE id = ? AND version = ?",
            params![id, prev_version],
        )?;
        if rows == 0 {
            return Err(Self::stale_version(conn, "configs", "config", id, prev_version));
        }
        Ok(())
    }

    /// Inserts a variant row.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_variant(conn: &Connection, variant: &ConfigVariant) -> Result<()> {
        conn.execute(
            r"INSERT INTO config_variants
              (id, config_id, environment_id, value, schema, use_default_schema, overrides,
               version, created_at, updated_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                variant.id,
                variant.config_id,
                variant.environment_id,
                to_json(&variant.value)?,
                variant.schema.as_ref().map(to_json).transpose()?,
                variant.use_default_schema,
                to_json(&variant.overrides)?,
                variant.version,
                to_millis(variant.created_at),
                to_millis(variant.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Retrieves a variant by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a stored document is corrupt.
    pub fn get_variant(conn: &Connection, id: &str) -> Result<Option<ConfigVariant>> {
        Ok(conn
            .query_row(
                &format!("{SELECT_VARIANT_COLUMNS} WHERE id = ?"),
                [id],
                row_to_variant,
            )
            .optional()?)
    }

    /// Lists a config's variants: the default variant first, then one per
    /// environment in environment order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_variants(conn: &Connection, config_id: &str) -> Result<Vec<ConfigVariant>> {
        let mut stmt = conn.prepare(
            r"SELECT v.id, v.config_id, v.environment_id, v.value, v.schema,
                     v.use_default_schema, v.overrides, v.version, v.created_at, v.updated_at
              FROM config_variants v
              LEFT JOIN environments e ON e.id = v.environment_id
              WHERE v.config_id = ?
              ORDER BY v.environment_id IS NOT NULL, e.position, e.name",
        )?;
        let variants = stmt
            .query_map([config_id], row_to_variant)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(variants)
    }

    /// Retrieves a config's default variant.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_default_variant(conn: &Connection, config_id: &str) -> Result<Option<ConfigVariant>> {
        Ok(conn
            .query_row(
                &format!("{SELECT_VARIANT_COLUMNS} WHERE config_id = ? AND environment_id IS NULL"),
                [config_id],
                row_to_variant,
            )
            .optional()?)
    }

    /// Writes `variant`'s content if the stored version still equals
    /// `prev_version`. Returns the new version.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VersionConflict`] on a stale version and
    /// [`Error::NotFound`] if the variant does not exist.
    pub fn update_variant_versioned(
        conn: &Connection,
        variant: &ConfigVariant,
        prev_version: i64,
    ) -> Result<i64> {
        let rows = conn.execute(
            r"UPDATE config_variants
              SET value = ?, schema = ?, use_default_schema = ?, overrides = ?,
                  version = version + 1, updated_at = ?
              WHERE id = ? AND version = ?",
            params![
                to_json(&variant.value)?,
                variant.schema.as_ref().map(to_json).transpose()?,
                variant.use_default_schema,
                to_json(&variant.overrides)?,
                to_millis(variant.updated_at),
                variant.id,
                prev_version,
            ],
        )?;
        if rows == 0 {
            return Err(Self::stale_version(
                conn,
                "config_variants",
                "config variant",
                &variant.id,
                prev_version,
            ));
        }
        Ok(prev_version + 1)
    }

    /// Lists environment variant ids of a config.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_environment_variant_ids(conn: &Connection, config_id: &str) -> Result<Vec<String>> {
        let mut stmt = conn.prepare(
            "SELECT id FROM config_variants WHERE config_id = ? AND environment_id IS NOT NULL",
        )?;
        let ids = stmt
            .query_map([config_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Lists environment variant ids of every config in an environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_variant_ids_in_environment(
        conn: &Connection,
        environment_id: &str,
    ) -> Result<Vec<String>> {
        let mut stmt = conn.prepare("SELECT id FROM config_variants WHERE environment_id = ?")?;
        let ids = stmt
            .query_map([environment_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(ids)
    }

    /// Loads one environment variant in resolved form.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_resolved_variant(conn: &Connection, variant_id: &str) -> Result<Option<ResolvedVariant>> {
        Ok(conn
            .query_row(
                &format!("{SELECT_RESOLVED_VARIANTS} AND v.id = ?"),
                [variant_id],
                row_to_resolved,
            )
            .optional()?)
    }

    /// Loads every environment variant in resolved form, ordered by creation.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_resolved_variants(conn: &Connection) -> Result<Vec<ResolvedVariant>> {
        let mut stmt = conn.prepare(&format!(
            "{SELECT_RESOLVED_VARIANTS} ORDER BY v.created_at, v.rowid"
        ))?;
        let variants = stmt
            .query_map([], row_to_resolved)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(variants)
    }
}
