//! Project, environment and project-membership use cases.

use crate::database::codec::{new_id, now, to_millis};
use crate::database::{Database, PendingScope};
use crate::error::{Error, Result};
use crate::model::{
    AuditMessage, ConfigVariant, Environment, Identity, Project, ProjectMember, ProjectRole,
    RejectionReason,
};
use crate::permissions::ensure_project_role;

use super::manager::{load_project, project_role, record_audit, require_non_empty, ConfigManager};

/// Environments every new project starts with, in order.
pub const DEFAULT_ENVIRONMENTS: [&str; 2] = ["Production", "Development"];

/// Options for creating a project.
#[derive(Debug, Clone)]
pub struct CreateProjectOptions {
    /// Project name.
    pub name: String,
    /// Free-text description.
    pub description: String,
    /// Overrides the manager's default proposal requirement.
    pub require_proposals: Option<bool>,
    /// Overrides the manager's default self-approval setting.
    pub allow_self_approvals: Option<bool>,
}

impl CreateProjectOptions {
    /// Creates options with the given name and manager defaults.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            require_proposals: None,
            allow_self_approvals: None,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the proposal requirement.
    #[must_use]
    pub const fn with_require_proposals(mut self, require: bool) -> Self {
        self.require_proposals = Some(require);
        self
    }

    /// Sets the self-approval setting.
    #[must_use]
    pub const fn with_allow_self_approvals(mut self, allow: bool) -> Self {
        self.allow_self_approvals = Some(allow);
        self
    }
}

/// Options for adding an environment to a project.
#[derive(Debug, Clone)]
pub struct CreateEnvironmentOptions {
    /// Owning project.
    pub project_id: String,
    /// Environment name, unique within the project.
    pub name: String,
    /// Whether direct edits in this environment are disallowed.
    pub require_proposals: bool,
}

impl CreateEnvironmentOptions {
    /// Creates options for an environment without its own proposal
    /// requirement.
    #[must_use]
    pub fn new(project_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            name: name.into(),
            require_proposals: false,
        }
    }

    /// Sets the proposal requirement.
    #[must_use]
    pub const fn with_require_proposals(mut self, require: bool) -> Self {
        self.require_proposals = require;
        self
    }
}

/// New project-wide proposal settings. Unset fields keep their value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectSettingsUpdate {
    /// New proposal requirement.
    pub require_proposals: Option<bool>,
    /// New self-approval setting.
    pub allow_self_approvals: Option<bool>,
}

impl ConfigManager {
    /// Creates a project with the default environments and makes the caller
    /// its admin.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name, or a storage error.
    pub fn create_project(
        &mut self,
        identity: &Identity,
        options: CreateProjectOptions,
    ) -> Result<Project> {
        let name = require_non_empty("name", &options.name)?;
        let at = now();
        let project = Project {
            id: new_id(),
            name,
            description: options.description,
            require_proposals: options
                .require_proposals
                .unwrap_or(self.default_require_proposals),
            allow_self_approvals: options
                .allow_self_approvals
                .unwrap_or(self.default_allow_self_approvals),
            created_at: at,
            updated_at: at,
        };

        let tx = self.db.begin_immediate()?;
        Database::insert_project(&tx, &project)?;
        for (position, name) in (0_i64..).zip(DEFAULT_ENVIRONMENTS) {
            Database::insert_environment(
                &tx,
                &Environment {
                    id: new_id(),
                    project_id: project.id.clone(),
                    name: name.to_string(),
                    position,
                    require_proposals: false,
                    created_at: at,
                },
            )?;
        }
        Database::upsert_project_member(&tx, &project.id, identity.email(), ProjectRole::Admin)?;
        record_audit(
            &tx,
            identity,
            Some(&project.id),
            None,
            AuditMessage::ProjectCreated {
                project_id: project.id.clone(),
                name: project.name.clone(),
            },
        )?;
        tx.commit()?;

        log::info!("created project {} ({})", project.name, project.id);
        Ok(project)
    }

    /// Returns a project the caller is a member of.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown project and `Forbidden` for a
    /// non-member.
    pub fn get_project(&self, identity: &Identity, project_id: &str) -> Result<Project> {
        let conn = self.db.connection();
        let project = load_project(conn, project_id)?;
        ensure_project_role(project_role(conn, identity, project_id)?, ProjectRole::Viewer)?;
        Ok(project)
    }

    /// Adds an environment. Every existing config gets a variant in it,
    /// copied from the config's default variant.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is project admin, and
    /// `BadRequest` for a duplicate name.
    pub fn create_environment(
        &mut self,
        identity: &Identity,
        options: CreateEnvironmentOptions,
    ) -> Result<Environment> {
        let name = require_non_empty("name", &options.name)?;
        let tx = self.db.begin_immediate()?;
        load_project(&tx, &options.project_id)?;
        ensure_project_role(
            project_role(&tx, identity, &options.project_id)?,
            ProjectRole::Admin,
        )?;
        if Database::list_environments(&tx, &options.project_id)?
            .iter()
            .any(|e| e.name == name)
        {
            return Err(Error::bad_request(format!(
                "environment '{name}' already exists"
            )));
        }

        let at = now();
        let environment = Environment {
            id: new_id(),
            project_id: options.project_id.clone(),
            name,
            position: Database::next_environment_position(&tx, &options.project_id)?,
            require_proposals: options.require_proposals,
            created_at: at,
        };
        Database::insert_environment(&tx, &environment)?;

        let mut variant_ids = Vec::new();
        for config in Database::list_configs(&tx, &options.project_id)? {
            let Some(default) = Database::get_default_variant(&tx, &config.id)? else {
                continue;
            };
            let variant = ConfigVariant {
                id: new_id(),
                config_id: config.id.clone(),
                environment_id: Some(environment.id.clone()),
                value: default.value,
                schema: default.schema,
                use_default_schema: false,
                overrides: default.overrides,
                version: 1,
                created_at: at,
                updated_at: at,
            };
            Database::insert_variant(&tx, &variant)?;
            Database::bump_config_version(&tx, &config.id, config.version, None, to_millis(at))?;
            variant_ids.push(variant.id);
        }

        record_audit(
            &tx,
            identity,
            Some(&environment.project_id),
            None,
            AuditMessage::EnvironmentCreated {
                environment_id: environment.id.clone(),
                name: environment.name.clone(),
            },
        )?;
        tx.commit()?;

        log::info!(
            "created environment {} with {} variants",
            environment.name,
            variant_ids.len()
        );
        self.notify_replica(&variant_ids);
        Ok(environment)
    }

    /// Deletes an environment and every variant in it. Pending proposals on
    /// those variants are rejected.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown environment, `Forbidden` unless the
    /// caller is project admin, and `BadRequest` for the last environment.
    pub fn delete_environment(&mut self, identity: &Identity, environment_id: &str) -> Result<()> {
        let tx = self.db.begin_immediate()?;
        let environment = Database::get_environment(&tx, environment_id)?
            .ok_or_else(|| Error::not_found(format!("environment {environment_id}")))?;
        ensure_project_role(
            project_role(&tx, identity, &environment.project_id)?,
            ProjectRole::Admin,
        )?;
        if Database::list_environments(&tx, &environment.project_id)?.len() <= 1 {
            return Err(Error::bad_request(
                "a project must keep at least one environment",
            ));
        }

        let variant_ids = Database::list_variant_ids_in_environment(&tx, environment_id)?;
        let at = to_millis(now());
        for variant_id in &variant_ids {
            Database::reject_pending_proposals(
                &tx,
                PendingScope::Variant(variant_id),
                None,
                identity.email(),
                RejectionReason::ConfigEdited,
                None,
                at,
            )?;
        }
        Database::delete_environment(&tx, environment_id)?;
        record_audit(
            &tx,
            identity,
            Some(&environment.project_id),
            None,
            AuditMessage::EnvironmentDeleted {
                environment_id: environment.id.clone(),
                name: environment.name.clone(),
            },
        )?;
        tx.commit()?;

        log::info!("deleted environment {}", environment.name);
        self.notify_replica(&variant_ids);
        Ok(())
    }

    /// Lists a project's environments in order.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for a non-member.
    pub fn list_environments(&self, identity: &Identity, project_id: &str) -> Result<Vec<Environment>> {
        let conn = self.db.connection();
        load_project(conn, project_id)?;
        ensure_project_role(project_role(conn, identity, project_id)?, ProjectRole::Viewer)?;
        Database::list_environments(conn, project_id)
    }

    /// Updates project-wide proposal settings.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is project admin.
    pub fn update_project_settings(
        &mut self,
        identity: &Identity,
        project_id: &str,
        update: ProjectSettingsUpdate,
    ) -> Result<Project> {
        let tx = self.db.begin_immediate()?;
        let mut project = load_project(&tx, project_id)?;
        ensure_project_role(project_role(&tx, identity, project_id)?, ProjectRole::Admin)?;

        if let Some(require) = update.require_proposals {
            project.require_proposals = require;
        }
        if let Some(allow) = update.allow_self_approvals {
            project.allow_self_approvals = allow;
        }
        project.updated_at = now();
        Database::update_project_settings(
            &tx,
            project_id,
            project.require_proposals,
            project.allow_self_approvals,
            to_millis(project.updated_at),
        )?;
        record_audit(
            &tx,
            identity,
            Some(project_id),
            None,
            AuditMessage::ProjectSettingsUpdated {
                project_id: project_id.to_string(),
                require_proposals: project.require_proposals,
                allow_self_approvals: project.allow_self_approvals,
            },
        )?;
        tx.commit()?;
        Ok(project)
    }

    /// Sets an environment's own proposal requirement.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown environment and `Forbidden` unless
    /// the caller is project admin.
    pub fn set_environment_require_proposals(
        &mut self,
        identity: &Identity,
        environment_id: &str,
        require_proposals: bool,
    ) -> Result<Environment> {
        let tx = self.db.begin_immediate()?;
        let mut environment = Database::get_environment(&tx, environment_id)?
            .ok_or_else(|| Error::not_found(format!("environment {environment_id}")))?;
        ensure_project_role(
            project_role(&tx, identity, &environment.project_id)?,
            ProjectRole::Admin,
        )?;
        Database::update_environment_require_proposals(&tx, environment_id, require_proposals)?;
        environment.require_proposals = require_proposals;
        record_audit(
            &tx,
            identity,
            Some(&environment.project_id),
            None,
            AuditMessage::EnvironmentUpdated {
                environment_id: environment_id.to_string(),
                require_proposals,
            },
        )?;
        tx.commit()?;
        Ok(environment)
    }

    /// Grants, changes or (with `None`) revokes a project role.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is project admin, and
    /// `BadRequest` when the change would leave the project without an
    /// admin.
    pub fn set_project_member(
        &mut self,
        identity: &Identity,
        project_id: &str,
        email: &str,
        role: Option<ProjectRole>,
    ) -> Result<()> {
        let member = Identity::new(email)?;
        let tx = self.db.begin_immediate()?;
        load_project(&tx, project_id)?;
        ensure_project_role(project_role(&tx, identity, project_id)?, ProjectRole::Admin)?;

        let members = Database::list_project_members(&tx, project_id)?;
        let was_admin = members
            .iter()
            .any(|m| m.email == member.email() && m.role == ProjectRole::Admin);
        let admins = members
            .iter()
            .filter(|m| m.role == ProjectRole::Admin)
            .count();
        if was_admin && role != Some(ProjectRole::Admin) && admins <= 1 {
            return Err(Error::bad_request("a project must keep at least one admin"));
        }

        match role {
            Some(role) => Database::upsert_project_member(&tx, project_id, member.email(), role)?,
            None => {
                Database::delete_project_member(&tx, project_id, member.email())?;
            }
        }
        record_audit(
            &tx,
            identity,
            Some(project_id),
            None,
            AuditMessage::ProjectMemberChanged {
                project_id: project_id.to_string(),
                email: member.email().to_string(),
                role,
            },
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Lists a project's members.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` for a non-member.
    pub fn list_project_members(
        &self,
        identity: &Identity,
        project_id: &str,
    ) -> Result<Vec<ProjectMember>> {
        let conn = self.db.connection();
        load_project(conn, project_id)?;
        ensure_project_role(project_role(conn, identity, project_id)?, ProjectRole::Viewer)?;
        Database::list_project_members(conn, project_id)
    }
}
