//! Issuing, verifying and revoking API and SDK keys.

use crate::database::codec::{new_id, now};
use crate::database::Database;
use crate::error::{Error, Result};
use crate::keys::{
    generate_token, is_well_formed, lookup_prefix, stored_secret, verify_token_hash, TokenKind,
};
use crate::model::{ApiKey, AuditMessage, Identity, IssuedKey, ProjectRole, SdkKey};
use crate::permissions::ensure_project_role;

use super::manager::{project_role, record_audit, require_non_empty, ConfigManager};

/// Options for creating an SDK key.
#[derive(Debug, Clone)]
pub struct CreateSdkKeyOptions {
    /// Project the key reads from.
    pub project_id: String,
    /// Environment the key reads from.
    pub environment_id: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    pub description: String,
}

impl CreateSdkKeyOptions {
    /// Creates options with an empty description.
    #[must_use]
    pub fn new(
        project_id: impl Into<String>,
        environment_id: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            environment_id: environment_id.into(),
            name: name.into(),
            description: String::new(),
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

fn ensure_creator(creator_email: &str, identity: &Identity) -> Result<()> {
    if identity.is(creator_email) {
        Ok(())
    } else {
        Err(Error::forbidden("only the creator of a key can delete it"))
    }
}

impl ConfigManager {
    /// Issues an API key acting as `identity`. The token is returned once.
    ///
    /// # Errors
    ///
    /// Returns a validation error for an empty name.
    pub fn create_api_key(
        &mut self,
        identity: &Identity,
        name: &str,
        description: &str,
    ) -> Result<IssuedKey<ApiKey>> {
        let name = require_non_empty("name", name)?;
        let token = generate_token(TokenKind::Api);
        let key = ApiKey {
            id: new_id(),
            name,
            description: description.to_string(),
            creator_email: identity.email().to_string(),
            created_at: now(),
        };

        let tx = self.db.begin_immediate()?;
        Database::insert_api_key(&tx, &key, &stored_secret(&token))?;
        record_audit(
            &tx,
            identity,
            None,
            None,
            AuditMessage::ApiKeyCreated {
                key_id: key.id.clone(),
                name: key.name.clone(),
            },
        )?;
        tx.commit()?;

        log::info!("created api key {} for {}", key.id, key.creator_email);
        Ok(IssuedKey { key, token })
    }

    /// Looks up the API key a token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for a malformed token and `Forbidden` when no
    /// stored key matches.
    pub fn verify_api_key(&self, token: &str) -> Result<ApiKey> {
        if !is_well_formed(TokenKind::Api, token) {
            return Err(Error::bad_request("malformed api key"));
        }
        Database::find_api_keys_by_prefix(self.db.connection(), lookup_prefix(token))?
            .into_iter()
            .find(|(_, hash)| verify_token_hash(token, hash))
            .map(|(key, _)| key)
            .ok_or_else(|| Error::forbidden("unknown api key"))
    }

    /// Lists the caller's API keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_api_keys(&self, identity: &Identity) -> Result<Vec<ApiKey>> {
        Database::list_api_keys(self.db.connection(), identity.email())
    }

    /// Revokes an API key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown key and `Forbidden` unless the
    /// caller created it.
    pub fn delete_api_key(&mut self, identity: &Identity, key_id: &str) -> Result<()> {
        let tx = self.db.begin_immediate()?;
        let key = Database::get_api_key(&tx, key_id)?
            .ok_or_else(|| Error::not_found(format!("api key {key_id}")))?;
        ensure_creator(&key.creator_email, identity)?;
        Database::delete_api_key(&tx, key_id)?;
        record_audit(
            &tx,
            identity,
            None,
            None,
            AuditMessage::ApiKeyDeleted {
                key_id: key.id.clone(),
                name: key.name,
            },
        )?;
        tx.commit()?;

        log::info!("deleted api key {key_id}");
        Ok(())
    }

    /// Issues an SDK key for one environment. The token is returned once.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is a project maintainer or
    /// admin, `BadRequest` if the environment is not part of the project,
    /// and a validation error for an empty name.
    pub fn create_sdk_key(
        &mut self,
        identity: &Identity,
        options: CreateSdkKeyOptions,
    ) -> Result<IssuedKey<SdkKey>> {
        let name = require_non_empty("name", &options.name)?;
        let tx = self.db.begin_immediate()?;
        ensure_project_role(
            project_role(&tx, identity, &options.project_id)?,
            ProjectRole::Maintainer,
        )?;
        let environment = Database::get_environment(&tx, &options.environment_id)?
            .filter(|env| env.project_id == options.project_id)
            .ok_or_else(|| {
                Error::bad_request(format!(
                    "environment {} is not part of project {}",
                    options.environment_id, options.project_id
                ))
            })?;

        let token = generate_token(TokenKind::Sdk);
        let key = SdkKey {
            id: new_id(),
            project_id: options.project_id,
            environment_id: environment.id,
            name,
            description: options.description,
            creator_email: identity.email().to_string(),
            created_at: now(),
        };
        Database::insert_sdk_key(&tx, &key, &stored_secret(&token))?;
        record_audit(
            &tx,
            identity,
            Some(&key.project_id),
            None,
            AuditMessage::SdkKeyCreated {
                key_id: key.id.clone(),
                environment_id: key.environment_id.clone(),
                name: key.name.clone(),
            },
        )?;
        tx.commit()?;

        log::info!(
            "created sdk key {} for environment {}",
            key.id,
            environment.name
        );
        Ok(IssuedKey { key, token })
    }

    /// Looks up the SDK key a token belongs to.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for a malformed token and `Forbidden` when no
    /// stored key matches.
    pub fn verify_sdk_key(&self, token: &str) -> Result<SdkKey> {
        if !is_well_formed(TokenKind::Sdk, token) {
            return Err(Error::bad_request("malformed sdk key"));
        }
        Database::find_sdk_keys_by_prefix(self.db.connection(), lookup_prefix(token))?
            .into_iter()
            .find(|(_, hash)| verify_token_hash(token, hash))
            .map(|(key, _)| key)
            .ok_or_else(|| Error::forbidden("unknown sdk key"))
    }

    /// Lists a project's SDK keys.
    ///
    /// # Errors
    ///
    /// Returns `Forbidden` unless the caller is a project member.
    pub fn list_sdk_keys(&self, identity: &Identity, project_id: &str) -> Result<Vec<SdkKey>> {
        let conn = self.db.connection();
        ensure_project_role(project_role(conn, identity, project_id)?, ProjectRole::Viewer)?;
        Database::list_sdk_keys(conn, project_id)
    }

    /// Revokes an SDK key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown key and `Forbidden` unless the
    /// caller created it.
    pub fn delete_sdk_key(&mut self, identity: &Identity, key_id: &str) -> Result<()> {
        let tx = self.db.begin_immediate()?;
        let key = Database::get_sdk_key(&tx, key_id)?
            .ok_or_else(|| Error::not_found(format!("sdk key {key_id}")))?;
        ensure_creator(&key.creator_email, identity)?;
        Database::delete_sdk_key(&tx, key_id)?;
        record_audit(
            &tx,
            identity,
            Some(&key.project_id),
            None,
            AuditMessage::SdkKeyDeleted {
                key_id: key.id.clone(),
                name: key.name,
            },
        )?;
        tx.commit()?;

        log::info!("deleted sdk key {key_id}");
        Ok(())
    }
}
