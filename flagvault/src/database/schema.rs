//! Database schema definitions and SQL constants.

/// Current schema version for the database.
///
/// Stored in the metadata table and checked on every open.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// SQL statement to create the metadata table.
pub const CREATE_METADATA_TABLE: &str = r"
    CREATE TABLE IF NOT EXISTS metadata (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
    )";

/// Every table of the current schema, in dependency order.
pub const CREATE_TABLES: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS projects (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        require_proposals INTEGER NOT NULL,
        allow_self_approvals INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS project_members (
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        email TEXT NOT NULL,
        role TEXT NOT NULL,
        PRIMARY KEY (project_id, email)
    )",
    r"
    CREATE TABLE IF NOT EXISTS environments (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        position INTEGER NOT NULL,
        require_proposals INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        UNIQUE (project_id, name)
    )",
    r"
    CREATE TABLE IF NOT EXISTS configs (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        creator_email TEXT NOT NULL,
        version INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE (project_id, name)
    )",
    r"
    CREATE TABLE IF NOT EXISTS config_members (
        config_id TEXT NOT NULL REFERENCES configs(id) ON DELETE CASCADE,
        email TEXT NOT NULL,
        role TEXT NOT NULL,
        PRIMARY KEY (config_id, email)
    )",
    r"
    CREATE TABLE IF NOT EXISTS config_variants (
        id TEXT PRIMARY KEY NOT NULL,
        config_id TEXT NOT NULL REFERENCES configs(id) ON DELETE CASCADE,
        environment_id TEXT REFERENCES environments(id) ON DELETE CASCADE,
        value TEXT NOT NULL,
        schema TEXT,
        use_default_schema INTEGER NOT NULL,
        overrides TEXT NOT NULL,
        version INTEGER NOT NULL,
        created_at INTEGER NOT NULL,
        updated_at INTEGER NOT NULL,
        UNIQUE (config_id, environment_id)
    )",
    // Proposals outlive their config, so config_id carries no foreign key.
    r"
    CREATE TABLE IF NOT EXISTS proposals (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL,
        config_id TEXT NOT NULL,
        variant_id TEXT,
        base_version INTEGER NOT NULL,
        base TEXT NOT NULL,
        diff TEXT NOT NULL,
        proposer_email TEXT NOT NULL,
        message TEXT,
        status TEXT NOT NULL,
        created_at INTEGER NOT NULL,
        approved_at INTEGER,
        rejected_at INTEGER,
        reviewer_email TEXT,
        rejection_reason TEXT,
        rejected_in_favor_of TEXT
    )",
    r"
    CREATE TABLE IF NOT EXISTS api_keys (
        id TEXT PRIMARY KEY NOT NULL,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        creator_email TEXT NOT NULL,
        token_prefix TEXT NOT NULL,
        token_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS sdk_keys (
        id TEXT PRIMARY KEY NOT NULL,
        project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
        environment_id TEXT NOT NULL REFERENCES environments(id) ON DELETE CASCADE,
        name TEXT NOT NULL,
        description TEXT NOT NULL,
        creator_email TEXT NOT NULL,
        token_prefix TEXT NOT NULL,
        token_hash TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
    r"
    CREATE TABLE IF NOT EXISTS audit_log (
        id TEXT PRIMARY KEY NOT NULL,
        seq INTEGER NOT NULL,
        project_id TEXT,
        config_id TEXT,
        user_email TEXT NOT NULL,
        kind TEXT NOT NULL,
        payload TEXT NOT NULL,
        created_at INTEGER NOT NULL
    )",
];

/// Indices over the columns the use cases filter on.
pub const CREATE_INDICES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_environments_project ON environments(project_id, position)",
    "CREATE INDEX IF NOT EXISTS idx_configs_project ON configs(project_id, name)",
    "CREATE INDEX IF NOT EXISTS idx_variants_config ON config_variants(config_id)",
    "CREATE INDEX IF NOT EXISTS idx_variants_environment ON config_variants(environment_id)",
    "CREATE INDEX IF NOT EXISTS idx_proposals_config ON proposals(config_id, status)",
    "CREATE INDEX IF NOT EXISTS idx_api_keys_prefix ON api_keys(token_prefix)",
    "CREATE INDEX IF NOT EXISTS idx_sdk_keys_prefix ON sdk_keys(token_prefix)",
    "CREATE INDEX IF NOT EXISTS idx_audit_project ON audit_log(project_id, seq)",
];

/// SQL statement to select the schema version from the metadata table.
pub const SELECT_SCHEMA_VERSION: &str = "SELECT value FROM metadata WHERE key = 'schema_version'";

/// SQL statement to insert or update the schema version in the metadata table.
pub const INSERT_SCHEMA_VERSION: &str =
    "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?)";
