//! Config creation, querying, patching and deletion through the public API.

mod common;

use common::{identity, Fixture};
use flagvault::model::{ConfigMembers, ConfigRole, ProjectRole, VariantInput, VariantPatch};
use flagvault::operations::{CreateConfigOptions, CreateEnvironmentOptions, PatchConfigOptions};
use flagvault::settings::{ProjectDefaults, ReplicaSettings, Settings, SettingsBuilder};
use flagvault::{ConfigManager, ErrorKind, SdkResolver};
use serde_json::json;

/// Deleting a config twice: the first call succeeds, the second reports the
/// config as missing, and the list no longer shows it.
#[test]
fn test_delete_config_twice() {
    let mut f = Fixture::new();
    f.create_config("feature-flag", json!(true));
    f.create_config("keep-me", json!(1));

    f.manager
        .delete_config(&f.admin, &f.project.id, "feature-flag", 1)
        .unwrap();
    let err = f
        .manager
        .delete_config(&f.admin, &f.project.id, "feature-flag", 1)
        .unwrap_err();
    assert!(err.is_not_found());

    let names: Vec<_> = f
        .manager
        .get_config_list(&f.admin, &f.project.id)
        .unwrap()
        .into_iter()
        .map(|c| c.name)
        .collect();
    assert_eq!(names, ["keep-me"]);
}

/// A stale `prev_version` on delete is a conflict, not a deletion.
#[test]
fn test_delete_config_stale_version() {
    let mut f = Fixture::new();
    let created = f.create_config("feature-flag", json!(true));
    f.manager
        .patch_config(
            &f.admin,
            PatchConfigOptions::new(&created.config_id, 1).with_description("rollout switch"),
        )
        .unwrap();

    let err = f
        .manager
        .delete_config(&f.admin, &f.project.id, "feature-flag", 1)
        .unwrap_err();
    assert!(err.is_version_conflict());
    assert_eq!(
        f.manager
            .get_config(&f.admin, &f.project.id, "feature-flag")
            .unwrap()
            .config
            .description,
        "rollout switch"
    );
}

/// Visibility and roles as seen through the query use cases.
#[test]
fn test_config_visibility() {
    let mut f = Fixture::new();
    let shared = f.create_config("shared", json!(1));
    f.create_config("private", json!(2));

    let outsider = identity("contractor@example.com");
    f.manager
        .patch_config(
            &f.admin,
            PatchConfigOptions::new(&shared.config_id, 1)
                .with_members(ConfigMembers::new(vec![outsider.email().to_string()], vec![])),
        )
        .unwrap();

    let list = f
        .manager
        .get_config_list(&outsider, &f.project.id)
        .unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0].name, "shared");
    assert_eq!(list[0].my_role, ConfigRole::Editor);
    assert_eq!(list[0].version, 2);

    assert!(f
        .manager
        .get_config(&outsider, &f.project.id, "private")
        .unwrap_err()
        .is_forbidden());
    assert!(f
        .manager
        .get_config(&f.admin, &f.project.id, "missing")
        .unwrap_err()
        .is_not_found());

    let details = f
        .manager
        .get_config(&f.admin, &f.project.id, "shared")
        .unwrap();
    assert_eq!(details.my_role, ConfigRole::Maintainer);
    assert_eq!(details.variants.len(), 3);
    assert!(details.variants[0].is_default());
}

/// Schemas are enforced on create and patch, including for variants that
/// inherit the default schema.
#[test]
fn test_schema_enforced_on_inheriting_variants() {
    let mut f = Fixture::new();
    let schema = json!({"type": "object", "properties": {"limit": {"type": "integer"}}});
    let production = f.production().to_string();
    let created = f
        .manager
        .create_config(
            &f.admin,
            CreateConfigOptions::new(
                &f.project.id,
                "limits",
                VariantInput::new(json!({"limit": 1})).with_schema(schema),
            )
            .with_environment_variant(
                &production,
                VariantInput::new(json!({"limit": 5})).with_use_default_schema(true),
            ),
        )
        .unwrap();

    let err = f
        .manager
        .patch_config_variant(
            &f.admin,
            &created.config_variant_ids[1],
            1,
            VariantPatch::new().with_value(json!({"limit": "many"})),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    let err = f
        .manager
        .create_config(
            &f.admin,
            CreateConfigOptions::new(
                &f.project.id,
                "broken",
                VariantInput::new(json!("x")).with_schema(json!({"type": "number"})),
            ),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

/// The default variant always validates against its own schema; marking it
/// as inheriting is refused.
#[test]
fn test_default_variant_cannot_inherit_schema() {
    let mut f = Fixture::new();
    let created = f
        .manager
        .create_config(
            &f.admin,
            CreateConfigOptions::new(
                &f.project.id,
                "kill-switch",
                VariantInput::new(json!(true)).with_schema(json!({"type": "boolean"})),
            ),
        )
        .unwrap();
    let default_id = &created.config_variant_ids[0];

    for patch in [
        VariantPatch::new()
            .with_use_default_schema(true)
            .with_value(json!("text")),
        VariantPatch::new().with_use_default_schema(true),
    ] {
        let err = f
            .manager
            .patch_config_variant(&f.admin, default_id, 1, patch)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::BadRequest);
    }

    let details = f
        .manager
        .get_config(&f.admin, &f.project.id, "kill-switch")
        .unwrap();
    let default = &details.variants[0];
    assert!(default.is_default());
    assert!(!default.use_default_schema);
    assert_eq!(default.value, json!(true));
    assert_eq!(default.version, 1);
}

/// JSON-with-comments input is normalized before storage.
#[test]
fn test_jsonc_values() {
    let mut f = Fixture::new();
    let created = f
        .manager
        .create_config(
            &f.admin,
            CreateConfigOptions::new(
                &f.project.id,
                "commented",
                VariantInput::from_jsonc("{\n  // rollout\n  \"percent\": 10,\n}"),
            ),
        )
        .unwrap();
    let details = f
        .manager
        .get_config(&f.admin, &f.project.id, "commented")
        .unwrap();
    assert!(details
        .variants
        .iter()
        .all(|v| v.value == json!({"percent": 10})));

    f.manager
        .patch_config_variant(
            &f.admin,
            &created.config_variant_ids[1],
            1,
            VariantPatch::new()
                .with_value_jsonc("[1, 2, /* three */ 3,]")
                .unwrap(),
        )
        .unwrap();
}

/// Environments: new ones inherit every config, the last one cannot go.
#[test]
fn test_environment_lifecycle() {
    let mut f = Fixture::new();
    f.create_config("a", json!("base"));
    let staging = f
        .manager
        .create_environment(&f.admin, CreateEnvironmentOptions::new(&f.project.id, "Staging"))
        .unwrap();
    let details = f.manager.get_config(&f.admin, &f.project.id, "a").unwrap();
    assert_eq!(details.variants.len(), 4);
    assert_eq!(details.config.version, 2);

    let maintainer = identity("m@example.com");
    f.manager
        .set_project_member(&f.admin, &f.project.id, maintainer.email(), Some(ProjectRole::Maintainer))
        .unwrap();
    assert!(f
        .manager
        .delete_environment(&maintainer, &staging.id)
        .unwrap_err()
        .is_forbidden());

    for env in f.environments.clone() {
        f.manager.delete_environment(&f.admin, &env.id).unwrap();
    }
    let err = f
        .manager
        .delete_environment(&f.admin, &staging.id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
    assert_eq!(f.replica.len(), 1);
}

/// A manager built from settings applies the configured project defaults
/// and serves through its replica.
#[test]
fn test_manager_from_settings() {
    let data_dir = tempfile::tempdir().unwrap();
    let settings = SettingsBuilder::new()
        .skip_files()
        .skip_env()
        .with_data_dir(data_dir.path())
        .with_settings(Settings {
            projects: Some(ProjectDefaults {
                require_proposals: Some(true),
                allow_self_approvals: Some(true),
            }),
            replica: Some(ReplicaSettings {
                resync_on_open: Some(true),
            }),
            ..Default::default()
        })
        .build()
        .unwrap();

    let mut manager = ConfigManager::from_settings(&settings).unwrap();
    assert!(data_dir.path().join("flagvault.db").exists());
    let admin = identity("admin@example.com");
    let project = manager
        .create_project(&admin, flagvault::CreateProjectOptions::new("shop"))
        .unwrap();
    assert!(project.require_proposals);
    assert!(project.allow_self_approvals);

    let created = manager
        .create_config(
            &admin,
            CreateConfigOptions::new(&project.id, "flag", VariantInput::new(json!(true))),
        )
        .unwrap();
    let production = manager.list_environments(&admin, &project.id).unwrap().remove(0);
    let resolver = SdkResolver::new(manager.replica().unwrap().clone());
    let served = resolver.resolve(&project.id, &production.id, "flag").unwrap();
    assert_eq!(served.value, json!(true));
    assert_eq!(served.version, 1);
    assert_eq!(created.config_variant_ids.len(), 3);
}
