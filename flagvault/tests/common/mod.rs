//! Common test utilities for integration tests.
//!
//! This module provides fixtures for driving the flagvault use cases
//! against a throwaway SQLite file.

use std::path::PathBuf;

use flagvault::database::{Database, DatabaseConfig};
use flagvault::model::{Environment, Identity, Project, VariantInput};
use flagvault::operations::{
    ConfigManager, CreateConfigOptions, CreateConfigResult, CreateProjectOptions,
};
use flagvault::ConfigReplica;
use serde_json::Value;

/// Creates a database file in a temporary directory that outlives the test.
#[allow(dead_code)]
pub fn create_test_database() -> Database {
    Database::open(DatabaseConfig::new(create_test_database_path())).unwrap()
}

/// Returns a fresh database path whose directory is kept alive.
#[allow(dead_code)]
pub fn create_test_database_path() -> PathBuf {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.db");
    // Keep the directory around for the rest of the test process
    std::mem::forget(dir);
    path
}

/// Parses an email into an identity.
#[allow(dead_code)]
pub fn identity(email: &str) -> Identity {
    Identity::new(email).unwrap()
}

/// A manager wired to a replica, plus one project administered by
/// `admin@example.com`.
#[allow(dead_code)]
pub struct Fixture {
    pub manager: ConfigManager,
    pub replica: ConfigReplica,
    pub admin: Identity,
    pub project: Project,
    pub environments: Vec<Environment>,
}

impl Fixture {
    /// Builds the fixture with project `shop`.
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self::with_project(CreateProjectOptions::new("shop"))
    }

    /// Builds the fixture with a customized project.
    #[allow(dead_code)]
    pub fn with_project(options: CreateProjectOptions) -> Self {
        let db = create_test_database();
        let replica = ConfigReplica::open(db.reopen().unwrap()).unwrap();
        let mut manager = ConfigManager::new(db).with_replica(replica.clone());
        let admin = identity("admin@example.com");
        let project = manager.create_project(&admin, options).unwrap();
        let environments = manager.list_environments(&admin, &project.id).unwrap();
        Self {
            manager,
            replica,
            admin,
            project,
            environments,
        }
    }

    /// Creates config `name` with `value` in every environment.
    #[allow(dead_code)]
    pub fn create_config(&mut self, name: &str, value: Value) -> CreateConfigResult {
        self.manager
            .create_config(
                &self.admin,
                CreateConfigOptions::new(&self.project.id, name, VariantInput::new(value)),
            )
            .unwrap()
    }

    /// Id of the `Production` environment.
    #[allow(dead_code)]
    pub fn production(&self) -> &str {
        &self.environments[0].id
    }
}
