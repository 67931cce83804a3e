//! Config and variant use cases: creation, direct edits, deletion and
//! queries.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::database::codec::{new_id, now, to_millis};
use crate::database::{Database, PendingScope};
use crate::error::{Error, Result};
use crate::model::{
    validate_config_name, AuditMessage, Config, ConfigMembers, ConfigRole, ConfigVariant,
    Environment, Identity, Project, ProjectRole, ProposalDiff, RejectionReason, VariantInput,
    VariantPatch,
};
use crate::permissions::{
    classify_change, classify_patch, ensure_can_apply, ensure_can_view, ensure_project_role,
    role_for, ChangeClass,
};
use crate::validation::{check_schema, validate_variant};

use super::manager::{config_role, field_names, load_project, project_role, record_audit, ConfigManager};

/// Options for creating a config.
#[derive(Debug, Clone)]
pub struct CreateConfigOptions {
    /// Owning project.
    pub project_id: String,
    /// Config name, unique within the project.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Content of the default variant.
    pub default_variant: VariantInput,
    /// Content per environment id. Environments not listed copy the
    /// default variant.
    pub environment_variants: BTreeMap<String, VariantInput>,
    /// Config-level editor grants.
    pub editors: Vec<String>,
    /// Config-level maintainer grants.
    pub maintainers: Vec<String>,
}

impl CreateConfigOptions {
    /// Creates options for a config whose variants all start from
    /// `default_variant`.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        name: impl Into<String>,
        default_variant: VariantInput,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            description: String::new(),
            default_variant,
            environment_variants: BTreeMap::new(),
            editors: Vec::new(),
            maintainers: Vec::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the content of one environment's variant.
    #[must_use]
    pub fn with_environment_variant(
        mut self,
        environment_id: impl Into<String>,
        input: VariantInput,
    ) -> Self {
        self.environment_variants.insert(environment_id.into(), input);
        self
    }

    /// Sets the config-level grants.
    #[must_use]
    pub fn with_members(mut self, editors: Vec<String>, maintainers: Vec<String>) -> Self {
        self.editors = editors;
        self.maintainers = maintainers;
        self
    }
}

/// Ids created by [`ConfigManager::create_config`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateConfigResult {
    /// The new config.
    pub config_id: String,
    /// Its variants: the default variant first, then one per environment.
    pub config_variant_ids: Vec<String>,
}

/// Options for a direct config-level edit.
#[derive(Debug, Clone)]
pub struct PatchConfigOptions {
    /// Target config.
    pub config_id: String,
    /// Aggregate version the caller last saw.
    pub prev_version: i64,
    /// New description.
    pub description: Option<String>,
    /// New member grants.
    pub members: Option<ConfigMembers>,
}

impl PatchConfigOptions {
    /// Creates an empty edit.
    #[must_use]
    pub fn new(config_id: impl Into<String>, prev_version: i64) -> Self {
        Self {
            config_id: config_id.into(),
            prev_version,
            description: None,
            members: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the member grants.
    #[must_use]
    pub fn with_members(mut self, members: ConfigMembers) -> Self {
        self.members = Some(members);
        self
    }
}

/// One row of [`ConfigManager::get_config_list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSummary {
    /// Config id.
    pub id: String,
    /// Config name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Aggregate version.
    pub version: i64,
    /// Number of pending proposals.
    pub pending_proposals: i64,
    /// The caller's effective role.
    pub my_role: ConfigRole,
}

/// A config with everything an editor page needs.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDetails {
    /// The config and its members.
    pub config: Config,
    /// Default variant first, then one per environment in order.
    pub variants: Vec<ConfigVariant>,
    /// The project's environments in order.
    pub environments: Vec<Environment>,
    /// The caller's effective role.
    pub my_role: ConfigRole,
}

/// Whether direct edits to `variant` are disallowed.
fn variant_requires_proposals(
    conn: &rusqlite::Connection,
    project: &Project,
    variant: &ConfigVariant,
) -> Result<bool> {
    match &variant.environment_id {
        None => Ok(project.require_proposals),
        Some(environment_id) => Ok(Database::get_environment(conn, environment_id)?
            .is_some_and(|e| e.requires_proposals(project))),
    }
}

/// Whether any edit to the config as a whole is disallowed.
fn config_requires_proposals(conn: &rusqlite::Connection, project: &Project) -> Result<bool> {
    Ok(project.require_proposals
        || Database::list_environments(conn, &project.id)?
            .iter()
            .any(|e| e.require_proposals))
}

/// Validates `variant` in its final form; when it is the default variant,
/// also re-checks the environment variants that inherit its schema.
pub(super) fn validate_with_dependents(
    conn: &rusqlite::Connection,
    variant: &ConfigVariant,
) -> Result<()> {
    if variant.is_default() {
        validate_variant(variant, None)?;
        for dependent in Database::list_variants(conn, &variant.config_id)? {
            if !dependent.is_default() && dependent.use_default_schema {
                validate_variant(&dependent, Some(variant))?;
            }
        }
        Ok(())
    } else {
        let default = Database::get_default_variant(conn, &variant.config_id)?;
        validate_variant(variant, default.as_ref())
    }
}

fn build_variant(
    config_id: &str,
    environment_id: Option<String>,
    input: VariantInput,
    at: chrono::DateTime<chrono::Utc>,
) -> Result<ConfigVariant> {
    let value = input.value.into_json()?;
    if let Some(schema) = &input.schema {
        check_schema(schema)?;
    }
    Ok(ConfigVariant {
        id: new_id(),
        config_id: config_id.to_string(),
        use_default_schema: environment_id.is_some() && input.use_default_schema,
        environment_id,
        value,
        schema: input.schema,
        overrides: input.overrides,
        version: 1,
        created_at: at,
        updated_at: at,
    })
}

impl ConfigManager {
    /// Creates a config with a default variant and one variant per
    /// environment, all at version 1, in one transaction.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is project maintainer or admin,
    /// a validation error for a bad name, member list, schema or value, and
    /// `BadRequest` for a duplicate name or an unknown environment id.
    pub fn create_config(
        &mut self,
        identity: &Identity,
        options: CreateConfigOptions,
    ) -> Result<CreateConfigResult> {
        validate_config_name(&options.name)?;
        let members = ConfigMembers::new(options.editors, options.maintainers).normalized()?;

        let tx = self.db.begin_immediate()?;
        load_project(&tx, &options.project_id)?;
        ensure_project_role(
            project_role(&tx, identity, &options.project_id)?,
            ProjectRole::Maintainer,
        )?;
        if Database::get_config_by_name(&tx, &options.project_id, &options.name)?.is_some() {
            return Err(Error::bad_request(format!(
                "config '{}' already exists",
                options.name
            )));
        }

        let environments = Database::list_environments(&tx, &options.project_id)?;
        if let Some(unknown) = options
            .environment_variants
            .keys()
            .find(|id| !environments.iter().any(|e| &e.id == *id))
        {
            return Err(Error::bad_request(format!(
                "environment {unknown} does not belong to the project"
            )));
        }

        let at = now();
        let config = Config {
            id: new_id(),
            project_id: options.project_id.clone(),
            name: options.name.clone(),
            description: options.description,
            creator_email: identity.email().to_string(),
            created_at: at,
            updated_at: at,
            version: 1,
            members,
            pending_proposals: 0,
        };
        Database::insert_config(&tx, &config)?;

        let default = build_variant(&config.id, None, options.default_variant.clone(), at)?;
        validate_variant(&default, None)?;
        Database::insert_variant(&tx, &default)?;

        let mut environment_variants = options.environment_variants;
        let mut variant_ids = vec![default.id.clone()];
        let mut replica_ids = Vec::new();
        for environment in &environments {
            let input = environment_variants
                .remove(&environment.id)
                .unwrap_or_else(|| options.default_variant.clone());
            let variant = build_variant(&config.id, Some(environment.id.clone()), input, at)?;
            validate_variant(&variant, Some(&default))?;
            Database::insert_variant(&tx, &variant)?;
            variant_ids.push(variant.id.clone());
            replica_ids.push(variant.id);
        }

        record_audit(
            &tx,
            identity,
            Some(&config.project_id),
            Some(&config.id),
            AuditMessage::ConfigCreated {
                config_id: config.id.clone(),
                name: config.name.clone(),
            },
        )?;
        tx.commit()?;

        log::info!("created config {} with {} variants", config.name, variant_ids.len());
        self.notify_replica(&replica_ids);
        Ok(CreateConfigResult {
            config_id: config.id,
            config_variant_ids: variant_ids,
        })
    }

    /// Applies a partial update to one variant if its version still equals
    /// `prev_version`. Pending proposals on the variant are rejected.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown variant, `Forbidden` if the caller's
    /// role is below what the patch requires, `BadRequest` for an empty patch
    /// or when the variant's environment requires proposals,
    /// `VersionConflict` on a stale version and a validation error if the
    /// result violates its schema.
    pub fn patch_config_variant(
        &mut self,
        identity: &Identity,
        variant_id: &str,
        prev_version: i64,
        patch: VariantPatch,
    ) -> Result<ConfigVariant> {
        let tx = self.db.begin_immediate()?;
        let variant = Database::get_variant(&tx, variant_id)?
            .ok_or_else(|| Error::not_found(format!("config variant {variant_id}")))?;
        let config = Database::get_config(&tx, &variant.config_id)?
            .ok_or_else(|| Error::not_found(format!("config {}", variant.config_id)))?;
        let project = load_project(&tx, &config.project_id)?;

        let class = classify_patch(&patch);
        if class == ChangeClass::None {
            return Err(Error::bad_request("patch does not change anything"));
        }
        ensure_can_apply(config_role(&tx, identity, &config)?, class)?;
        if variant_requires_proposals(&tx, &project, &variant)? {
            return Err(Error::bad_request(
                "direct edits are disabled here, create a proposal instead",
            ));
        }
        if variant.version != prev_version {
            log::debug!(
                "stale patch of variant {variant_id}: expected {prev_version}, found {}",
                variant.version
            );
            return Err(Error::VersionConflict {
                entity: format!("config variant {variant_id}"),
                expected: prev_version,
                found: variant.version,
            });
        }

        let fields = patch.changed_fields();
        let mut updated = variant;
        patch.apply_to(&mut updated);
        updated.updated_at = now();
        validate_with_dependents(&tx, &updated)?;
        updated.version = Database::update_variant_versioned(&tx, &updated, prev_version)?;

        let rejected = Database::reject_pending_proposals(
            &tx,
            PendingScope::Variant(variant_id),
            None,
            identity.email(),
            RejectionReason::ConfigEdited,
            None,
            to_millis(updated.updated_at),
        )?;
        record_audit(
            &tx,
            identity,
            Some(&config.project_id),
            Some(&config.id),
            AuditMessage::ConfigVariantUpdated {
                config_id: config.id.clone(),
                variant_id: variant_id.to_string(),
                version: updated.version,
                fields: field_names(&fields),
            },
        )?;
        let affected = Database::list_environment_variant_ids(&tx, &config.id)?;
        tx.commit()?;

        log::info!(
            "patched {} variant {variant_id} to version {} ({} proposals invalidated)",
            config.name,
            updated.version,
            rejected.len()
        );
        self.notify_replica(&affected);
        Ok(updated)
    }

    /// Edits config-level fields if the aggregate version still equals
    /// `prev_version`. Pending config-level proposals are rejected.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown config, `Forbidden` if the caller's
    /// role is too low (members need maintainer, description needs editor),
    /// `BadRequest` for an empty edit or when the project requires
    /// proposals, and `VersionConflict` on a stale version.
    pub fn patch_config(&mut self, identity: &Identity, options: PatchConfigOptions) -> Result<Config> {
        let members = options
            .members
            .as_ref()
            .map(ConfigMembers::normalized)
            .transpose()?;
        let mut diff = ProposalDiff::new();
        if let Some(description) = &options.description {
            diff = diff.with_description(description.clone());
        }
        if let Some(members) = &members {
            diff = diff.with_members(members.clone());
        }
        let class = classify_change(&diff);
        if class == ChangeClass::None {
            return Err(Error::bad_request("patch does not change anything"));
        }

        let tx = self.db.begin_immediate()?;
        let config = Database::get_config(&tx, &options.config_id)?
            .ok_or_else(|| Error::not_found(format!("config {}", options.config_id)))?;
        let project = load_project(&tx, &config.project_id)?;
        ensure_can_apply(config_role(&tx, identity, &config)?, class)?;
        if project.require_proposals {
            return Err(Error::bad_request(
                "direct edits are disabled in this project, create a proposal instead",
            ));
        }

        let at = to_millis(now());
        Database::bump_config_version(
            &tx,
            &config.id,
            options.prev_version,
            options.description.as_deref(),
            at,
        )?;
        if let Some(members) = &members {
            Database::replace_config_members(&tx, &config.id, members)?;
        }
        Database::reject_pending_proposals(
            &tx,
            PendingScope::ConfigLevel(&config.id),
            None,
            identity.email(),
            RejectionReason::ConfigEdited,
            None,
            at,
        )?;

        record_audit(
            &tx,
            identity,
            Some(&config.project_id),
            Some(&config.id),
            AuditMessage::ConfigUpdated {
                config_id: config.id.clone(),
                fields: field_names(&diff.applied_fields()),
            },
        )?;
        if let Some(after) = members {
            record_audit(
                &tx,
                identity,
                Some(&config.project_id),
                Some(&config.id),
                AuditMessage::ConfigMembersChanged {
                    config_id: config.id.clone(),
                    before: config.members.clone(),
                    after,
                },
            )?;
        }
        let updated = Database::get_config(&tx, &config.id)?
            .ok_or_else(|| Error::not_found(format!("config {}", config.id)))?;
        tx.commit()?;

        log::info!("patched config {} to version {}", updated.name, updated.version);
        Ok(updated)
    }

    /// Deletes a config and its variants if its aggregate version still
    /// equals `prev_version`. Pending proposals are rejected and kept.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown config, `Forbidden` unless the
    /// caller is a config maintainer, `BadRequest` when proposals are
    /// required, and `VersionConflict` on a stale version.
    pub fn delete_config(
        &mut self,
        identity: &Identity,
        project_id: &str,
        name: &str,
        prev_version: i64,
    ) -> Result<()> {
        let tx = self.db.begin_immediate()?;
        let config = Database::get_config_by_name(&tx, project_id, name)?
            .ok_or_else(|| Error::not_found(format!("config {name}")))?;
        let project = load_project(&tx, project_id)?;
        ensure_can_apply(config_role(&tx, identity, &config)?, ChangeClass::Maintainer)?;
        if config_requires_proposals(&tx, &project)? {
            return Err(Error::bad_request(
                "direct deletion is disabled, create a proposal to delete the config",
            ));
        }

        let variant_ids = Database::list_environment_variant_ids(&tx, &config.id)?;
        Database::delete_config_versioned(&tx, &config.id, prev_version)?;
        Database::reject_pending_proposals(
            &tx,
            PendingScope::WholeConfig(&config.id),
            None,
            identity.email(),
            RejectionReason::ConfigDeleted,
            None,
            to_millis(now()),
        )?;
        record_audit(
            &tx,
            identity,
            Some(project_id),
            Some(&config.id),
            AuditMessage::ConfigDeleted {
                config_id: config.id.clone(),
                name: config.name.clone(),
            },
        )?;
        tx.commit()?;

        log::info!("deleted config {}", config.name);
        self.notify_replica(&variant_ids);
        Ok(())
    }

    /// Lists the configs of a project the caller can see.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown project.
    pub fn get_config_list(&self, identity: &Identity, project_id: &str) -> Result<Vec<ConfigSummary>> {
        let conn = self.db.connection();
        load_project(conn, project_id)?;
        let member_role = project_role(conn, identity, project_id)?;
        Ok(Database::list_configs(conn, project_id)?
            .into_iter()
            .filter_map(|config| {
                let my_role = role_for(identity, member_role, &config.members)?;
                Some(ConfigSummary {
                    id: config.id,
                    name: config.name,
                    description: config.description,
                    version: config.version,
                    pending_proposals: config.pending_proposals,
                    my_role,
                })
            })
            .collect())
    }

    /// Returns a config with its variants and the caller's role.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown config and `Forbidden` if the
    /// caller cannot see it.
    pub fn get_config(&self, identity: &Identity, project_id: &str, name: &str) -> Result<ConfigDetails> {
        let conn = self.db.connection();
        let config = Database::get_config_by_name(conn, project_id, name)?
            .ok_or_else(|| Error::not_found(format!("config {name}")))?;
        let my_role = ensure_can_view(config_role(conn, identity, &config)?)?;
        let variants = Database::list_variants(conn, &config.id)?;
        let environments = Database::list_environments(conn, project_id)?;
        Ok(ConfigDetails {
            config,
            variants,
            environments,
            my_role,
        })
    }
}
