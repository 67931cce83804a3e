//! Role resolution and change classification.
//!
//! Every access decision in the crate goes through this module. A caller's
//! effective config role is the strongest of:
//!
//! - their config-level grant (`editors` / `maintainers` lists),
//! - their project role (admin acts as maintainer, maintainer as editor),
//! - viewer, for any other project member.
//!
//! Callers with neither a project role nor a config grant cannot see the
//! config at all.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ConfigMembers, ConfigRole, Identity, Project, ProjectRole, ProposalDiff, VariantPatch};

/// The least role needed to apply a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeClass {
    /// Nothing changes.
    None,
    /// Value, override or description changes.
    Editor,
    /// Schema, schema inheritance, membership or deletion.
    Maintainer,
}

impl ChangeClass {
    /// Returns the config role required to apply a change of this class.
    #[must_use]
    pub const fn required_role(self) -> Option<ConfigRole> {
        match self {
            Self::None => None,
            Self::Editor => Some(ConfigRole::Editor),
            Self::Maintainer => Some(ConfigRole::Maintainer),
        }
    }
}

impl fmt::Display for ChangeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Editor => write!(f, "editor"),
            Self::Maintainer => write!(f, "maintainer"),
        }
    }
}

/// Maps a project role onto the config role it implies.
#[must_use]
pub const fn config_role_from_project(role: ProjectRole) -> ConfigRole {
    match role {
        ProjectRole::Admin => ConfigRole::Maintainer,
        ProjectRole::Maintainer => ConfigRole::Editor,
        ProjectRole::Viewer => ConfigRole::Viewer,
    }
}

/// Resolves the effective config role of `identity`.
///
/// Returns `None` when the caller is neither a project member nor listed on
/// the config.
///
/// # Examples
///
/// ```
/// use flagvault::model::{ConfigMembers, ConfigRole, Identity, ProjectRole};
/// use flagvault::permissions::role_for;
///
/// let alice = Identity::new("alice@example.com").unwrap();
/// let members = ConfigMembers::new(vec![], vec!["alice@example.com".into()]);
///
/// assert_eq!(role_for(&alice, Some(ProjectRole::Viewer), &members), Some(ConfigRole::Maintainer));
/// assert_eq!(role_for(&alice, None, &ConfigMembers::default()), None);
/// ```
#[must_use]
pub fn role_for(
    identity: &Identity,
    project_role: Option<ProjectRole>,
    members: &ConfigMembers,
) -> Option<ConfigRole> {
    let from_project = project_role.map(config_role_from_project);
    let from_config = members.role_of(identity.email());
    from_project.max(from_config)
}

/// Classifies a proposed diff. The strongest field wins.
///
/// # Examples
///
/// ```
/// use flagvault::model::ProposalDiff;
/// use flagvault::permissions::{classify_change, ChangeClass};
/// use serde_json::json;
///
/// let value_only = ProposalDiff::new().with_value(json!(1));
/// assert_eq!(classify_change(&value_only), ChangeClass::Editor);
///
/// let with_schema = value_only.with_schema(None);
/// assert_eq!(classify_change(&with_schema), ChangeClass::Maintainer);
/// ```
#[must_use]
pub fn classify_change(diff: &ProposalDiff) -> ChangeClass {
    if diff.schema.is_set() || diff.use_default_schema.is_set() || diff.members.is_set() || diff.delete {
        ChangeClass::Maintainer
    } else if diff.value.is_set() || diff.overrides.is_set() || diff.description.is_set() {
        ChangeClass::Editor
    } else {
        ChangeClass::None
    }
}

/// Classifies a direct variant patch.
#[must_use]
pub fn classify_patch(patch: &VariantPatch) -> ChangeClass {
    classify_change(&ProposalDiff::from(patch.clone()))
}

/// Fails with `Forbidden` unless the caller can see the config.
///
/// # Errors
///
/// Returns [`Error::Forbidden`] when `role` is `None`.
pub fn ensure_can_view(role: Option<ConfigRole>) -> Result<ConfigRole> {
    role.ok_or_else(|| Error::forbidden("config is not visible to the caller"))
}

/// Fails with `Forbidden` unless `role` is enough for a change of `class`.
///
/// # Errors
///
/// Returns [`Error::Forbidden`] naming the missing role.
pub fn ensure_can_apply(role: Option<ConfigRole>, class: ChangeClass) -> Result<()> {
    let role = ensure_can_view(role)?;
    match class.required_role() {
        Some(required) if role < required => {
            log::debug!("denied {class} change for role {role}");
            Err(Error::forbidden(format!(
                "{required} role required, caller is {role}"
            )))
        }
        _ => Ok(()),
    }
}

/// Fails with `Forbidden` if the reviewer is the proposer and the project
/// does not allow self-approval.
///
/// # Errors
///
/// Returns [`Error::Forbidden`] for a disallowed self-approval.
pub fn ensure_not_self_approval(project: &Project, proposer_email: &str, reviewer: &Identity) -> Result<()> {
    if reviewer.is(proposer_email) && !project.allow_self_approvals {
        log::debug!("denied self-approval by {reviewer}");
        return Err(Error::forbidden("self-approval is disabled for this project"));
    }
    Ok(())
}

/// Fails with `Forbidden` unless the caller holds at least `required` on the
/// project.
///
/// # Errors
///
/// Returns [`Error::Forbidden`] naming the missing role.
pub fn ensure_project_role(actual: Option<ProjectRole>, required: ProjectRole) -> Result<ProjectRole> {
    match actual {
        Some(role) if role >= required => Ok(role),
        Some(role) => Err(Error::forbidden(format!(
            "project {required} role required, caller is {role}"
        ))),
        None => Err(Error::forbidden("project is not visible to the caller")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Patch;
    use chrono::Utc;
    use serde_json::json;

    fn alice() -> Identity {
        Identity::new("alice@example.com").unwrap()
    }

    fn project(allow_self_approvals: bool) -> Project {
        let now = Utc::now();
        Project {
            id: "p".into(),
            name: "p".into(),
            description: String::new(),
            require_proposals: false,
            allow_self_approvals,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_role_precedence_table() {
        let none = ConfigMembers::default();
        let editor = ConfigMembers::new(vec!["alice@example.com".into()], vec![]);
        let maintainer = ConfigMembers::new(vec![], vec!["alice@example.com".into()]);

        let project_roles = [
            None,
            Some(ProjectRole::Viewer),
            Some(ProjectRole::Maintainer),
            Some(ProjectRole::Admin),
        ];
        let expected = [
            // (no grant, editor grant, maintainer grant)
            [None, Some(ConfigRole::Editor), Some(ConfigRole::Maintainer)],
            [Some(ConfigRole::Viewer), Some(ConfigRole::Editor), Some(ConfigRole::Maintainer)],
            [Some(ConfigRole::Editor), Some(ConfigRole::Editor), Some(ConfigRole::Maintainer)],
            [Some(ConfigRole::Maintainer), Some(ConfigRole::Maintainer), Some(ConfigRole::Maintainer)],
        ];

        for (project_role, row) in project_roles.iter().zip(expected) {
            for (members, want) in [&none, &editor, &maintainer].into_iter().zip(row) {
                assert_eq!(
                    role_for(&alice(), *project_role, members),
                    want,
                    "project role {project_role:?}, members {members:?}"
                );
            }
        }
    }

    #[test]
    fn test_classify_each_field() {
        let cases = [
            (ProposalDiff::new(), ChangeClass::None),
            (ProposalDiff::new().with_value(json!(1)), ChangeClass::Editor),
            (ProposalDiff::new().with_overrides(vec![]), ChangeClass::Editor),
            (ProposalDiff::new().with_description("d"), ChangeClass::Editor),
            (ProposalDiff::new().with_schema(None), ChangeClass::Maintainer),
            (
                ProposalDiff::new().with_schema(Some(json!({"type": "string"}))),
                ChangeClass::Maintainer,
            ),
            (
                ProposalDiff::new().with_use_default_schema(true),
                ChangeClass::Maintainer,
            ),
            (
                ProposalDiff::new().with_members(ConfigMembers::default()),
                ChangeClass::Maintainer,
            ),
            (ProposalDiff::new().with_delete(), ChangeClass::Maintainer),
        ];
        for (diff, want) in cases {
            assert_eq!(classify_change(&diff), want, "{diff:?}");
        }
    }

    #[test]
    fn test_classify_patch_matches_diff() {
        let patch = VariantPatch::new().with_value(json!(true));
        assert_eq!(classify_patch(&patch), ChangeClass::Editor);
        let patch = VariantPatch {
            schema: Patch::Set(None),
            ..VariantPatch::default()
        };
        assert_eq!(classify_patch(&patch), ChangeClass::Maintainer);
    }

    #[test]
    fn test_ensure_can_apply() {
        assert!(ensure_can_apply(Some(ConfigRole::Editor), ChangeClass::Editor).is_ok());
        assert!(ensure_can_apply(Some(ConfigRole::Viewer), ChangeClass::None).is_ok());
        assert!(ensure_can_apply(None, ChangeClass::None).unwrap_err().is_forbidden());
        assert!(ensure_can_apply(Some(ConfigRole::Editor), ChangeClass::Maintainer)
            .unwrap_err()
            .is_forbidden());
        assert!(ensure_can_apply(Some(ConfigRole::Viewer), ChangeClass::Editor)
            .unwrap_err()
            .is_forbidden());
    }

    #[test]
    fn test_self_approval_toggle() {
        let me = alice();
        assert!(ensure_not_self_approval(&project(false), "alice@example.com", &me)
            .unwrap_err()
            .is_forbidden());
        assert!(ensure_not_self_approval(&project(true), "alice@example.com", &me).is_ok());
        assert!(ensure_not_self_approval(&project(false), "bob@example.com", &me).is_ok());
    }

    #[test]
    fn test_ensure_project_role() {
        assert!(ensure_project_role(Some(ProjectRole::Admin), ProjectRole::Maintainer).is_ok());
        assert!(ensure_project_role(Some(ProjectRole::Viewer), ProjectRole::Maintainer).is_err());
        assert!(ensure_project_role(None, ProjectRole::Viewer).is_err());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn diff_strategy() -> impl Strategy<Value = ProposalDiff> {
            (
                any::<bool>(),
                any::<bool>(),
                any::<bool>(),
                any::<bool>(),
                any::<bool>(),
                any::<bool>(),
                any::<bool>(),
            )
                .prop_map(|(value, schema, inherit, overrides, description, members, delete)| {
                    let mut diff = ProposalDiff::new();
                    if value {
                        diff = diff.with_value(json!(1));
                    }
                    if schema {
                        diff = diff.with_schema(None);
                    }
                    if inherit {
                        diff = diff.with_use_default_schema(false);
                    }
                    if overrides {
                        diff = diff.with_overrides(vec![]);
                    }
                    if description {
                        diff = diff.with_description("d");
                    }
                    if members {
                        diff = diff.with_members(ConfigMembers::default());
                    }
                    if delete {
                        diff = diff.with_delete();
                    }
                    diff
                })
        }

        proptest! {
            // Adding a maintainer-class field always yields maintainer.
            #[test]
            fn prop_maintainer_fields_dominate(diff in diff_strategy()) {
                prop_assert_eq!(classify_change(&diff.clone().with_schema(None)), ChangeClass::Maintainer);
                prop_assert_eq!(classify_change(&diff.clone().with_members(ConfigMembers::default())), ChangeClass::Maintainer);
                prop_assert_eq!(classify_change(&diff.with_delete()), ChangeClass::Maintainer);
            }

            // Classification is None exactly when the diff is empty.
            #[test]
            fn prop_none_iff_empty(diff in diff_strategy()) {
                prop_assert_eq!(classify_change(&diff) == ChangeClass::None, diff.is_empty());
            }

            // A value-only diff is always editor class.
            #[test]
            fn prop_value_only_is_editor(n in any::<i64>()) {
                prop_assert_eq!(classify_change(&ProposalDiff::new().with_value(json!(n))), ChangeClass::Editor);
            }
        }
    }
}
