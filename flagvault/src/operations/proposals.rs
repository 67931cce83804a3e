//! The proposal lifecycle: create, approve, reject.
//!
//! A proposal moves from `pending` to `approved` or `rejected` exactly once.
//! Approval applies the diff through the same compare-and-swap writes as a
//! direct edit, against the version the proposal was written for, and
//! rejects every rival still pending on the same target in the same
//! transaction.

use crate::database::codec::{new_id, now, to_millis};
use crate::database::{Database, PendingScope};
use crate::error::{Error, Result};
use crate::model::{
    AuditMessage, ConfigMembers, Identity, Patch, Proposal, ProposalBase, ProposalDiff,
    ProposalStatus, ProposalTarget, RejectionReason,
};
use crate::permissions::{
    classify_change, ensure_can_apply, ensure_can_view, ensure_not_self_approval, role_for,
};

use super::configs::validate_with_dependents;
use super::manager::{
    config_role, field_names, load_project, project_role, record_audit, ConfigManager,
};

/// Options for proposing a change.
#[derive(Debug, Clone)]
pub struct CreateProposalOptions {
    /// Config the proposal belongs to.
    pub config_id: String,
    /// Config-level or one variant.
    pub target: ProposalTarget,
    /// Version of the target the diff was written against.
    pub base_version: i64,
    /// Proposed changes.
    pub diff: ProposalDiff,
    /// Optional note for reviewers.
    pub message: Option<String>,
}

impl CreateProposalOptions {
    /// Creates options without a message.
    #[must_use]
    pub fn new(
        config_id: impl Into<String>,
        target: ProposalTarget,
        base_version: i64,
        diff: ProposalDiff,
    ) -> Self {
        Self {
            config_id: config_id.into(),
            target,
            base_version,
            diff,
            message: None,
        }
    }

    /// Attaches a note for reviewers.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

fn missing_proposal(id: &str) -> Error {
    Error::bad_request(format!("proposal {id} does not exist"))
}

fn ensure_pending(proposal: &Proposal) -> Result<()> {
    if proposal.is_pending() {
        Ok(())
    } else {
        Err(Error::bad_request(format!(
            "proposal {} is already {}",
            proposal.id, proposal.status
        )))
    }
}

fn target_moved(entity: &str, base: i64, current: i64) -> Error {
    log::debug!("{entity} moved from version {base} to {current} since proposal creation");
    Error::forbidden(format!(
        "{entity} changed since the proposal was created (base version {base}, current {current})"
    ))
}

impl ConfigManager {
    /// Records a pending proposal. Anyone who can see the config may
    /// propose, whatever change the diff makes.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an unknown config or variant, an empty diff
    /// or one that does not fit the target, `Forbidden` if the caller cannot
    /// see the config, `VersionConflict` when `base_version` is not the
    /// target's current version, and a validation error for a proposed
    /// value that violates its schema.
    pub fn create_proposal(
        &mut self,
        identity: &Identity,
        options: CreateProposalOptions,
    ) -> Result<Proposal> {
        let mut diff = options.diff;
        diff.check_target(&options.target)?;
        if let Some(members) = diff.members.as_set() {
            diff.members = Patch::Set(members.normalized()?);
        }

        let tx = self.db.begin_immediate()?;
        let config = Database::get_config(&tx, &options.config_id)?
            .ok_or_else(|| Error::bad_request(format!("config {} does not exist", options.config_id)))?;
        ensure_can_view(config_role(&tx, identity, &config)?)?;

        let (base, current_version) = match &options.target {
            ProposalTarget::Config => (ProposalBase::of_config(&config), config.version),
            ProposalTarget::Variant { variant_id } => {
                let variant = Database::get_variant(&tx, variant_id)?
                    .filter(|v| v.config_id == config.id)
                    .ok_or_else(|| {
                        Error::bad_request(format!("config variant {variant_id} does not exist"))
                    })?;
                let mut proposed = variant.clone();
                diff.variant_patch().apply_to(&mut proposed);
                validate_with_dependents(&tx, &proposed)?;
                (ProposalBase::of_variant(&variant), variant.version)
            }
        };
        if current_version != options.base_version {
            return Err(Error::VersionConflict {
                entity: format!("proposal target of config {}", config.name),
                expected: options.base_version,
                found: current_version,
            });
        }

        let proposal = Proposal {
            id: new_id(),
            config_id: config.id.clone(),
            target: options.target,
            base_version: options.base_version,
            base,
            diff,
            proposer_email: identity.email().to_string(),
            message: options.message,
            status: ProposalStatus::Pending,
            created_at: now(),
            approved_at: None,
            rejected_at: None,
            reviewer_email: None,
            rejection_reason: None,
            rejected_in_favor_of_proposal_id: None,
        };
        Database::insert_proposal(&tx, &config.project_id, &proposal)?;
        record_audit(
            &tx,
            identity,
            Some(&config.project_id),
            Some(&config.id),
            AuditMessage::ProposalCreated {
                proposal_id: proposal.id.clone(),
                config_id: config.id.clone(),
            },
        )?;
        tx.commit()?;

        log::info!("created proposal {} on config {}", proposal.id, config.name);
        Ok(proposal)
    }

    /// Approves a pending proposal: applies its diff and rejects every other
    /// pending proposal on the same target in favor of it.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an unknown or no longer pending proposal,
    /// and `Forbidden` if the reviewer's live role is below what the diff
    /// requires, for a disallowed self-approval, or when the target changed
    /// since the proposal was created. Nothing is written on failure.
    pub fn approve_proposal(&mut self, identity: &Identity, proposal_id: &str) -> Result<Proposal> {
        let tx = self.db.begin_immediate()?;
        let proposal =
            Database::get_proposal(&tx, proposal_id)?.ok_or_else(|| missing_proposal(proposal_id))?;
        ensure_pending(&proposal)?;
        let config = Database::get_config(&tx, &proposal.config_id)?.ok_or_else(|| {
            Error::bad_request(format!("config {} no longer exists", proposal.config_id))
        })?;
        let project = load_project(&tx, &config.project_id)?;

        ensure_can_apply(
            config_role(&tx, identity, &config)?,
            classify_change(&proposal.diff),
        )?;
        ensure_not_self_approval(&project, &proposal.proposer_email, identity)?;

        let at = now();
        let millis = to_millis(at);
        let diff = &proposal.diff;
        let mut changes = Vec::new();
        let mut affected = Vec::new();

        match &proposal.target {
            ProposalTarget::Variant { variant_id } => {
                let variant = Database::get_variant(&tx, variant_id)?
                    .ok_or_else(|| Error::forbidden("the proposed variant no longer exists"))?;
                if variant.version != proposal.base_version {
                    return Err(target_moved("config variant", proposal.base_version, variant.version));
                }
                let patch = diff.variant_patch();
                let fields = field_names(&patch.changed_fields());
                let mut updated = variant;
                patch.apply_to(&mut updated);
                updated.updated_at = at;
                validate_with_dependents(&tx, &updated)?;
                let version = Database::update_variant_versioned(&tx, &updated, proposal.base_version)?;
                changes.push(AuditMessage::ConfigVariantUpdated {
                    config_id: config.id.clone(),
                    variant_id: variant_id.clone(),
                    version,
                    fields,
                });
                affected = Database::list_environment_variant_ids(&tx, &config.id)?;
            }
            ProposalTarget::Config => {
                if config.version != proposal.base_version {
                    return Err(target_moved("config", proposal.base_version, config.version));
                }
                if diff.delete {
                    affected = Database::list_environment_variant_ids(&tx, &config.id)?;
                    Database::delete_config_versioned(&tx, &config.id, proposal.base_version)?;
                    changes.push(AuditMessage::ConfigDeleted {
                        config_id: config.id.clone(),
                        name: config.name.clone(),
                    });
                } else {
                    let members = diff
                        .members
                        .as_set()
                        .map(ConfigMembers::normalized)
                        .transpose()?;
                    Database::bump_config_version(
                        &tx,
                        &config.id,
                        proposal.base_version,
                        diff.description.as_set().map(String::as_str),
                        millis,
                    )?;
                    changes.push(AuditMessage::ConfigUpdated {
                        config_id: config.id.clone(),
                        fields: field_names(&diff.applied_fields()),
                    });
                    if let Some(after) = members {
                        Database::replace_config_members(&tx, &config.id, &after)?;
                        changes.push(AuditMessage::ConfigMembersChanged {
                            config_id: config.id.clone(),
                            before: config.members.clone(),
                            after,
                        });
                    }
                }
            }
        }

        if !Database::mark_proposal_approved(&tx, proposal_id, identity.email(), millis)? {
            return Err(Error::bad_request(format!(
                "proposal {proposal_id} is no longer pending"
            )));
        }
        let scope = match &proposal.target {
            ProposalTarget::Variant { variant_id } => PendingScope::Variant(variant_id),
            ProposalTarget::Config => PendingScope::ConfigLevel(&config.id),
        };
        let superseded = Database::reject_pending_proposals(
            &tx,
            scope,
            Some(proposal_id),
            identity.email(),
            RejectionReason::AnotherProposalApproved,
            Some(proposal_id),
            millis,
        )?;
        if diff.delete {
            Database::reject_pending_proposals(
                &tx,
                PendingScope::WholeConfig(&config.id),
                Some(proposal_id),
                identity.email(),
                RejectionReason::ConfigDeleted,
                None,
                millis,
            )?;
        }

        record_audit(
            &tx,
            identity,
            Some(&config.project_id),
            Some(&config.id),
            AuditMessage::ProposalApproved {
                proposal_id: proposal_id.to_string(),
                config_id: config.id.clone(),
                applied_fields: field_names(&diff.applied_fields()),
            },
        )?;
        for change in changes {
            record_audit(&tx, identity, Some(&config.project_id), Some(&config.id), change)?;
        }
        let approved =
            Database::get_proposal(&tx, proposal_id)?.ok_or_else(|| missing_proposal(proposal_id))?;
        tx.commit()?;

        log::info!(
            "approved proposal {proposal_id} on config {} ({} superseded)",
            config.name,
            superseded.len()
        );
        self.notify_replica(&affected);
        Ok(approved)
    }

    /// Rejects a pending proposal. Any identity may reject, including the
    /// proposer.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an unknown or no longer pending proposal.
    pub fn reject_proposal(&mut self, identity: &Identity, proposal_id: &str) -> Result<Proposal> {
        let tx = self.db.begin_immediate()?;
        let proposal =
            Database::get_proposal(&tx, proposal_id)?.ok_or_else(|| missing_proposal(proposal_id))?;
        ensure_pending(&proposal)?;
        let project_id = Database::get_proposal_project_id(&tx, proposal_id)?;

        Database::mark_proposal_rejected(
            &tx,
            proposal_id,
            identity.email(),
            RejectionReason::RejectedExplicitly,
            None,
            to_millis(now()),
        )?;
        record_audit(
            &tx,
            identity,
            project_id.as_deref(),
            Some(&proposal.config_id),
            AuditMessage::ProposalRejected {
                proposal_id: proposal_id.to_string(),
                config_id: proposal.config_id.clone(),
                reason: RejectionReason::RejectedExplicitly,
                rejected_in_favor_of_proposal_id: None,
            },
        )?;
        let rejected =
            Database::get_proposal(&tx, proposal_id)?.ok_or_else(|| missing_proposal(proposal_id))?;
        tx.commit()?;

        log::info!("rejected proposal {proposal_id}");
        Ok(rejected)
    }

    /// Returns a proposal. Proposals of deleted configs stay readable by
    /// project members.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for an unknown proposal and `Forbidden` if the
    /// caller cannot see its config.
    pub fn get_proposal(&self, identity: &Identity, proposal_id: &str) -> Result<Proposal> {
        let conn = self.db.connection();
        let proposal =
            Database::get_proposal(conn, proposal_id)?.ok_or_else(|| missing_proposal(proposal_id))?;
        let role = match Database::get_config(conn, &proposal.config_id)? {
            Some(config) => config_role(conn, identity, &config)?,
            None => {
                let project_id = Database::get_proposal_project_id(conn, proposal_id)?
                    .ok_or_else(|| missing_proposal(proposal_id))?;
                role_for(
                    identity,
                    project_role(conn, identity, &project_id)?,
                    &ConfigMembers::default(),
                )
            }
        };
        ensure_can_view(role)?;
        Ok(proposal)
    }

    /// Lists a config's proposals, newest first.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for an unknown config and `Forbidden` if the
    /// caller cannot see it.
    pub fn list_proposals(
        &self,
        identity: &Identity,
        config_id: &str,
        status: Option<ProposalStatus>,
    ) -> Result<Vec<Proposal>> {
        let conn = self.db.connection();
        let config = Database::get_config(conn, config_id)?
            .ok_or_else(|| Error::not_found(format!("config {config_id}")))?;
        ensure_can_view(config_role(conn, identity, &config)?)?;
        Database::list_proposals(conn, config_id, status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ProjectRole, VariantPatch};
    use crate::operations::test_support::{identity, project_with_config};
    use crate::operations::{ConfigManager, CreateConfigResult, ProjectSettingsUpdate};
    use crate::ErrorKind;
    use serde_json::{json, Value};

    fn propose_value(
        manager: &mut ConfigManager,
        who: &Identity,
        created: &CreateConfigResult,
        value: Value,
    ) -> Proposal {
        manager
            .create_proposal(
                who,
                CreateProposalOptions::new(
                    &created.config_id,
                    ProposalTarget::Variant {
                        variant_id: created.config_variant_ids[1].clone(),
                    },
                    1,
                    ProposalDiff::new().with_value(value),
                ),
            )
            .unwrap()
    }

    #[test]
    fn test_approval_rejects_rivals() {
        let (mut manager, admin, project, created) = project_with_config(json!({"enabled": true}));
        manager
            .set_project_member(&admin, &project.id, "v@example.com", Some(ProjectRole::Viewer))
            .unwrap();
        let viewer = identity("v@example.com");

        let first = propose_value(&mut manager, &viewer, &created, json!({"enabled": false}));
        let second = propose_value(&mut manager, &viewer, &created, json!({"enabled": 1}));
        let third = propose_value(&mut manager, &admin, &created, json!({}));

        let approved = manager.approve_proposal(&admin, &second.id).unwrap();
        assert_eq!(approved.status, ProposalStatus::Approved);
        assert_eq!(approved.reviewer_email.as_deref(), Some("admin@example.com"));

        for loser in [&first, &third] {
            let loser = manager.get_proposal(&admin, &loser.id).unwrap();
            assert_eq!(loser.status, ProposalStatus::Rejected);
            assert_eq!(loser.rejection_reason, Some(RejectionReason::AnotherProposalApproved));
            assert_eq!(loser.rejected_in_favor_of_proposal_id.as_deref(), Some(second.id.as_str()));
        }

        for again in [&first, &second, &third] {
            let err = manager.approve_proposal(&admin, &again.id).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::BadRequest);
        }
    }

    #[test]
    fn test_viewer_can_propose_but_not_approve() {
        let (mut manager, admin, project, created) = project_with_config(json!(1));
        manager
            .set_project_member(&admin, &project.id, "v@example.com", Some(ProjectRole::Viewer))
            .unwrap();
        manager
            .update_project_settings(
                &admin,
                &project.id,
                ProjectSettingsUpdate {
                    require_proposals: None,
                    allow_self_approvals: Some(true),
                },
            )
            .unwrap();
        let viewer = identity("v@example.com");
        let proposal = propose_value(&mut manager, &viewer, &created, json!(2));

        let err = manager.approve_proposal(&viewer, &proposal.id).unwrap_err();
        assert!(err.is_forbidden());
        let still = manager.get_proposal(&viewer, &proposal.id).unwrap();
        assert!(still.is_pending());
    }

    #[test]
    fn test_stale_proposal_is_forbidden() {
        let (mut manager, admin, project, created) = project_with_config(json!(1));
        manager
            .set_project_member(&admin, &project.id, "m@example.com", Some(ProjectRole::Admin))
            .unwrap();
        let other_admin = identity("m@example.com");
        let proposal = propose_value(&mut manager, &other_admin, &created, json!(2));

        // Rejects the pending proposal as a side effect.
        manager
            .patch_config_variant(
                &admin,
                &created.config_variant_ids[1],
                1,
                VariantPatch::new().with_value(json!(3)),
            )
            .unwrap();
        let err = manager.approve_proposal(&admin, &proposal.id).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);

        // A config-level proposal made stale by an environment being added.
        let config_proposal = manager
            .create_proposal(
                &other_admin,
                CreateProposalOptions::new(
                    &created.config_id,
                    ProposalTarget::Config,
                    1,
                    ProposalDiff::new().with_description("text"),
                ),
            )
            .unwrap();
        manager
            .create_environment(
                &admin,
                crate::operations::CreateEnvironmentOptions::new(&project.id, "Staging"),
            )
            .unwrap();
        let err = manager.approve_proposal(&admin, &config_proposal.id).unwrap_err();
        assert!(err.is_forbidden());
        assert!(manager
            .get_proposal(&admin, &config_proposal.id)
            .unwrap()
            .is_pending());
    }

    #[test]
    fn test_reject_by_anyone_once() {
        let (mut manager, admin, _project, created) = project_with_config(json!(1));
        let proposal = propose_value(&mut manager, &admin, &created, json!(2));
        let stranger = identity("stranger@example.com");

        let rejected = manager.reject_proposal(&stranger, &proposal.id).unwrap();
        assert_eq!(rejected.status, ProposalStatus::Rejected);
        assert_eq!(rejected.rejection_reason, Some(RejectionReason::RejectedExplicitly));
        assert_eq!(rejected.reviewer_email.as_deref(), Some("stranger@example.com"));
        assert!(rejected.rejected_in_favor_of_proposal_id.is_none());

        let again = manager.reject_proposal(&admin, &proposal.id).unwrap_err();
        assert_eq!(again.kind(), ErrorKind::BadRequest);
        let missing = manager.reject_proposal(&admin, "missing").unwrap_err();
        assert_eq!(missing.kind(), ErrorKind::BadRequest);
    }

    #[test]
    fn test_create_proposal_checks() {
        let (mut manager, admin, _project, created) = project_with_config(json!(1));
        let target = ProposalTarget::Variant {
            variant_id: created.config_variant_ids[1].clone(),
        };

        let empty = manager
            .create_proposal(
                &admin,
                CreateProposalOptions::new(&created.config_id, target.clone(), 1, ProposalDiff::new()),
            )
            .unwrap_err();
        assert_eq!(empty.kind(), ErrorKind::BadRequest);

        let stale = manager
            .create_proposal(
                &admin,
                CreateProposalOptions::new(
                    &created.config_id,
                    target.clone(),
                    7,
                    ProposalDiff::new().with_value(json!(2)),
                ),
            )
            .unwrap_err();
        assert!(stale.is_version_conflict());

        let outsider = identity("outsider@example.com");
        let hidden = manager
            .create_proposal(
                &outsider,
                CreateProposalOptions::new(
                    &created.config_id,
                    target,
                    1,
                    ProposalDiff::new().with_value(json!(2)),
                ),
            )
            .unwrap_err();
        assert!(hidden.is_forbidden());
    }

    #[test]
    fn test_delete_proposal_keeps_history() {
        let (mut manager, admin, project, created) = project_with_config(json!(1));
        manager
            .set_project_member(&admin, &project.id, "m@example.com", Some(ProjectRole::Admin))
            .unwrap();
        let other_admin = identity("m@example.com");

        let variant_proposal = propose_value(&mut manager, &other_admin, &created, json!(5));
        let delete = manager
            .create_proposal(
                &other_admin,
                CreateProposalOptions::new(
                    &created.config_id,
                    ProposalTarget::Config,
                    1,
                    ProposalDiff::new().with_delete(),
                )
                .with_message("no longer used"),
            )
            .unwrap();

        manager.approve_proposal(&admin, &delete.id).unwrap();
        assert!(manager.get_config_list(&admin, &project.id).unwrap().is_empty());

        let approved = manager.get_proposal(&admin, &delete.id).unwrap();
        assert_eq!(approved.status, ProposalStatus::Approved);
        assert_eq!(approved.message.as_deref(), Some("no longer used"));
        let orphan = manager.get_proposal(&admin, &variant_proposal.id).unwrap();
        assert_eq!(orphan.rejection_reason, Some(RejectionReason::ConfigDeleted));
    }

    #[test]
    fn test_member_proposal_snapshots_base() {
        let (mut manager, admin, _project, created) = project_with_config(json!(1));
        let proposal = manager
            .create_proposal(
                &admin,
                CreateProposalOptions::new(
                    &created.config_id,
                    ProposalTarget::Config,
                    1,
                    ProposalDiff::new()
                        .with_members(ConfigMembers::new(vec!["New@Example.com".into()], vec![])),
                ),
            )
            .unwrap();
        assert_eq!(
            proposal.base,
            ProposalBase::Config {
                description: String::new(),
                members: ConfigMembers::default(),
            }
        );
        assert_eq!(
            proposal.diff.members.as_set().unwrap().editors,
            vec!["new@example.com".to_string()]
        );

        let listed = manager
            .list_proposals(&admin, &created.config_id, Some(ProposalStatus::Pending))
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
