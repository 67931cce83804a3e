//! Shared test utilities for database unit tests.
//!
//! This module provides helper functions used across multiple database test modules.

use rusqlite::Connection;
use serde_json::Value;
use tempfile::tempdir;

use crate::database::codec::{new_id, now};
use crate::database::{Database, DatabaseConfig};
use crate::model::{Config, ConfigMembers, ConfigVariant, Environment, Project, ProjectRole};

/// Creates a temporary test database that will be cleaned up automatically.
///
/// # Panics
///
/// Panics if the temporary directory or database cannot be created.
/// This is acceptable in test code where we want to fail fast.
#[must_use]
pub fn create_test_database() -> Database {
    let dir = tempdir().unwrap();
    let path = dir.path().join("test.db");
    let config = DatabaseConfig::new(path);
    let db = Database::open(config).unwrap();

    // Prevent the TempDir from being dropped immediately
    std::mem::forget(dir);

    db
}

/// Inserts a project with `Production` and `Development` environments and
/// `admin_email` as its admin.
///
/// # Panics
///
/// Panics if an insert fails.
pub fn insert_test_project(conn: &Connection, admin_email: &str) -> Project {
    let at = now();
    let project = Project {
        id: new_id(),
        name: "test project".into(),
        description: String::new(),
        require_proposals: false,
        allow_self_approvals: false,
        created_at: at,
        updated_at: at,
    };
    Database::insert_project(conn, &project).unwrap();
    for (position, name) in ["Production", "Development"].into_iter().enumerate() {
        let environment = Environment {
            id: new_id(),
            project_id: project.id.clone(),
            name: name.into(),
            position: i64::try_from(position).unwrap(),
            require_proposals: false,
            created_at: at,
        };
        Database::insert_environment(conn, &environment).unwrap();
    }
    Database::upsert_project_member(conn, &project.id, admin_email, ProjectRole::Admin).unwrap();
    project
}

/// Inserts a config whose default and environment variants all hold `value`.
///
/// # Panics
///
/// Panics if an insert fails.
pub fn insert_test_config(conn: &Connection, project_id: &str, name: &str, value: Value) -> Config {
    let at = now();
    let config = Config {
        id: new_id(),
        project_id: project_id.to_string(),
        name: name.to_string(),
        description: String::new(),
        creator_email: "admin@example.com".into(),
        created_at: at,
        updated_at: at,
        version: 1,
        members: ConfigMembers::default(),
        pending_proposals: 0,
    };
    Database::insert_config(conn, &config).unwrap();

    let environments = Database::list_environments(conn, project_id).unwrap();
    let targets = std::iter::once(None).chain(environments.into_iter().map(|e| Some(e.id)));
    for environment_id in targets {
        let variant = ConfigVariant {
            id: new_id(),
            config_id: config.id.clone(),
            environment_id,
            value: value.clone(),
            schema: None,
            use_default_schema: false,
            overrides: Vec::new(),
            version: 1,
            created_at: at,
            updated_at: at,
        };
        Database::insert_variant(conn, &variant).unwrap();
    }
    config
}
