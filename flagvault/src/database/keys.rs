//! SQL operations for API and SDK keys.
//!
//! Only the lookup prefix and the salted hash of a token are stored.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::model::{ApiKey, SdkKey};

use super::codec::{from_millis, to_millis};
use super::connection::Database;

/// Stored credential material of a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredSecret {
    /// Leading characters of the token, used to find candidates.
    pub prefix: String,
    /// `salt$sha256hex` of the full token.
    pub hash: String,
}

fn row_to_api_key(row: &Row<'_>) -> rusqlite::Result<ApiKey> {
    Ok(ApiKey {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        creator_email: row.get(3)?,
        created_at: from_millis(row.get(4)?),
    })
}

fn row_to_sdk_key(row: &Row<'_>) -> rusqlite::Result<SdkKey> {
    Ok(SdkKey {
        id: row.get(0)?,
        project_id: row.get(1)?,
        environment_id: row.get(2)?,
        name: row.get(3)?,
        description: row.get(4)?,
        creator_email: row.get(5)?,
        created_at: from_millis(row.get(6)?),
    })
}

const API_KEY_COLUMNS: &str = "id, name, description, creator_email, created_at";
const SDK_KEY_COLUMNS: &str =
    "id, project_id, environment_id, name, description, creator_email, created_at";

impl Database {
    /// Inserts an API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_api_key(conn: &Connection, key: &ApiKey, secret: &StoredSecret) -> Result<()> {
        conn.execute(
            r"INSERT INTO api_keys
              (id, name, description, creator_email, token_prefix, token_hash, created_at)
              VALUES (?, ?, ?, ?, ?, ?, ?)",
            params![
                key.id,
                key.name,
                key.description,
                key.creator_email,
                secret.prefix,
                secret.hash,
                to_millis(key.created_at),
            ],
        )?;
        Ok(())
    }

    /// Retrieves an API key by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_api_key(conn: &Connection, id: &str) -> Result<Option<ApiKey>> {
        Ok(conn
            .query_row(
                &format!("SELECT {API_KEY_COLUMNS} FROM api_keys WHERE id = ?"),
                [id],
                row_to_api_key,
            )
            .optional()?)
    }

    /// Lists API keys created by `email`, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_api_keys(conn: &Connection, email: &str) -> Result<Vec<ApiKey>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {API_KEY_COLUMNS} FROM api_keys WHERE creator_email = ? ORDER BY created_at DESC, rowid DESC"
        ))?;
        let keys = stmt
            .query_map([email], row_to_api_key)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Returns API keys whose token starts with `prefix`, with their hashes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_api_keys_by_prefix(conn: &Connection, prefix: &str) -> Result<Vec<(ApiKey, String)>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {API_KEY_COLUMNS}, token_hash FROM api_keys WHERE token_prefix = ?"
        ))?;
        let keys = stmt
            .query_map([prefix], |row| Ok((row_to_api_key(row)?, row.get(5)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Deletes an API key.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_api_key(conn: &Connection, id: &str) -> Result<bool> {
        Ok(conn.execute("DELETE FROM api_keys WHERE id = ?", [id])? > 0)
    }

    /// Inserts an SDK key.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn insert_sdk_key(conn: &Connection, key: &SdkKey, secret: &StoredSecret) -> Result<()> {
        conn.execute(
            r"INSERT INTO sdk_keys
              (id, project_id, environment_id, name, description, creator_email,
               token_prefix, token_hash, created_at)
              VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                key.id,
                key.project_id,
                key.environment_id,
                key.name,
                key.description,
                key.creator_email,
                secret.prefix,
                secret.hash,
                to_millis(key.created_at),
            ],
        )?;
        Ok(())
    }

    /// Retrieves an SDK key by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_sdk_key(conn: &Connection, id: &str) -> Result<Option<SdkKey>> {
        Ok(conn
            .query_row(
                &format!("SELECT {SDK_KEY_COLUMNS} FROM sdk_keys WHERE id = ?"),
                [id],
                row_to_sdk_key,
            )
            .optional()?)
    }

    /// Lists a project's SDK keys, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_sdk_keys(conn: &Connection, project_id: &str) -> Result<Vec<SdkKey>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SDK_KEY_COLUMNS} FROM sdk_keys WHERE project_id = ? ORDER BY created_at DESC, rowid DESC"
        ))?;
        let keys = stmt
            .query_map([project_id], row_to_sdk_key)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Returns SDK keys whose token starts with `prefix`, with their hashes.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn find_sdk_keys_by_prefix(conn: &Connection, prefix: &str) -> Result<Vec<(SdkKey, String)>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {SDK_KEY_COLUMNS}, token_hash FROM sdk_keys WHERE token_prefix = ?"
        ))?;
        let keys = stmt
            .query_map([prefix], |row| Ok((row_to_sdk_key(row)?, row.get(7)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keys)
    }

    /// Deletes an SDK key.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_sdk_key(conn: &Connection, id: &str) -> Result<bool> {
        Ok(conn.execute("DELETE FROM sdk_keys WHERE id = ?", [id])? > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::codec::now;
    use crate::database::test_util::create_test_database;

    #[test]
    fn test_api_key_storage() {
        let db = create_test_database();
        let conn = db.connection();
        let key = ApiKey {
            id: "k1".into(),
            name: "ci".into(),
            description: String::new(),
            creator_email: "a@example.com".into(),
            created_at: now(),
        };
        let secret = StoredSecret {
            prefix: "cm_0123".into(),
            hash: "salt$hash".into(),
        };
        Database::insert_api_key(conn, &key, &secret).unwrap();

        assert_eq!(Database::get_api_key(conn, "k1").unwrap(), Some(key.clone()));
        assert_eq!(Database::list_api_keys(conn, "a@example.com").unwrap().len(), 1);
        assert!(Database::list_api_keys(conn, "b@example.com").unwrap().is_empty());

        let found = Database::find_api_keys_by_prefix(conn, "cm_0123").unwrap();
        assert_eq!(found, vec![(key, "salt$hash".to_string())]);

        assert!(Database::delete_api_key(conn, "k1").unwrap());
        assert!(!Database::delete_api_key(conn, "k1").unwrap());
    }
}
