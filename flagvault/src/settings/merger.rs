//! Settings merging and precedence handling.

use crate::settings::loader::SettingsSource;
use crate::settings::schema::{ProjectDefaults, ReplicaSettings, Settings};

/// Merges settings layers; later layers win field by field.
///
/// # Examples
///
/// ```
/// use flagvault::settings::{Settings, SettingsMerger};
///
/// let low = Settings { busy_timeout_ms: Some(10), ..Default::default() };
/// let high = Settings { busy_timeout_ms: Some(20), ..Default::default() };
///
/// let mut result = low;
/// SettingsMerger::merge_into(&mut result, &high);
/// assert_eq!(result.busy_timeout_ms, Some(20));
/// ```
pub struct SettingsMerger;

impl SettingsMerger {
    /// Merges sources given lowest precedence first.
    #[must_use]
    pub fn merge(sources: Vec<SettingsSource>) -> Settings {
        let mut result = Settings::default();
        for source in sources {
            Self::merge_into(&mut result, &source.settings);
        }
        result
    }

    /// Merges `source` over `target`. Set fields in `source` win; nested
    /// sections merge field by field.
    pub fn merge_into(target: &mut Settings, source: &Settings) {
        if source.data_dir.is_some() {
            target.data_dir.clone_from(&source.data_dir);
        }

        if source.busy_timeout_ms.is_some() {
            target.busy_timeout_ms = source.busy_timeout_ms;
        }

        if source.log_mode.is_some() {
            target.log_mode.clone_from(&source.log_mode);
        }

        if let Some(ref projects) = source.projects {
            target.projects = Some(match &target.projects {
                Some(existing) => Self::merge_projects(existing, projects),
                None => projects.clone(),
            });
        }

        if let Some(ref replica) = source.replica {
            target.replica = Some(match &target.replica {
                Some(existing) => Self::merge_replica(existing, replica),
                None => replica.clone(),
            });
        }
    }

    fn merge_projects(target: &ProjectDefaults, source: &ProjectDefaults) -> ProjectDefaults {
        ProjectDefaults {
            require_proposals: source.require_proposals.or(target.require_proposals),
            allow_self_approvals: source.allow_self_approvals.or(target.allow_self_approvals),
        }
    }

    fn merge_replica(target: &ReplicaSettings, source: &ReplicaSettings) -> ReplicaSettings {
        ReplicaSettings {
            resync_on_open: source.resync_on_open.or(target.resync_on_open),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_nested_sections_merge_per_field() {
        let mut target = Settings {
            projects: Some(ProjectDefaults {
                require_proposals: Some(true),
                allow_self_approvals: Some(false),
            }),
            ..Default::default()
        };
        let source = Settings {
            projects: Some(ProjectDefaults {
                require_proposals: None,
                allow_self_approvals: Some(true),
            }),
            ..Default::default()
        };

        SettingsMerger::merge_into(&mut target, &source);
        assert!(target.require_proposals());
        assert!(target.allow_self_approvals());
    }

    #[test]
    fn test_merge_sources_in_order() {
        let sources = vec![
            SettingsSource {
                path: PathBuf::from("user"),
                precedence: 1,
                settings: Settings {
                    log_mode: Some("quiet".into()),
                    busy_timeout_ms: Some(1),
                    ..Default::default()
                },
            },
            SettingsSource {
                path: PathBuf::from("project"),
                precedence: 2,
                settings: Settings {
                    busy_timeout_ms: Some(2),
                    ..Default::default()
                },
            },
        ];

        let merged = SettingsMerger::merge(sources);
        assert_eq!(merged.busy_timeout_ms, Some(2));
        assert_eq!(merged.log_mode.as_deref(), Some("quiet"));
    }
}
