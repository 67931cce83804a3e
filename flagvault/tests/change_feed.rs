//! Change feed tests.
//!
//! These drive mutations through `ConfigManager` and observe the per-project
//! event stream of the attached replica.

mod common;

use std::time::Duration;

use common::{identity, Fixture};
use flagvault::model::{ProposalTarget, VariantInput, VariantPatch};
use flagvault::operations::{
    CreateConfigOptions, CreateEnvironmentOptions, CreateProjectOptions, CreateProposalOptions,
};
use flagvault::overrides::{Condition, ConditionValue, Operator, Override};
use flagvault::{ProposalDiff, ReplicaEventKind};
use futures::StreamExt;
use serde_json::json;

/// Creating a config with two environment variants emits two `created`
/// events to that project's subscribers and nothing to other projects.
#[tokio::test]
async fn test_create_config_events_scoped_to_project() {
    let mut f = Fixture::new();
    let other = f
        .manager
        .create_project(&f.admin, CreateProjectOptions::new("other"))
        .unwrap();

    let mut mine = f.replica.subscribe(&f.project.id);
    let mut theirs = f.replica.subscribe(&other.id);
    assert!(mine.try_next().is_none(), "empty project replays nothing");

    let created = f.create_config("feature-flag", json!({"enabled": true}));

    for expected in &created.config_variant_ids[1..] {
        let event = mine.next().await.unwrap();
        assert_eq!(event.kind, ReplicaEventKind::Created);
        assert_eq!(&event.variant_id, expected);
        assert_eq!(event.config_name, "feature-flag");
        assert_eq!(event.version, 1);
        assert_eq!(event.value, json!({"enabled": true}));
    }
    assert!(mine.try_next().is_none());
    assert!(theirs.try_next().is_none());
}

/// Ten rapid creates arrive as ten events, in order, none dropped.
#[tokio::test]
async fn test_rapid_creates_arrive_in_order() {
    let mut f = Fixture::new();
    let mut subscription = f.replica.subscribe(&f.project.id);

    let names: Vec<String> = (0..10).map(|i| format!("flag-{i}")).collect();
    for name in &names {
        f.create_config(name, json!(false));
    }

    let production = f.production().to_string();
    let mut seen = Vec::new();
    while let Some(event) = subscription.try_next() {
        if event.environment_id == production {
            seen.push(event.config_name);
        }
    }
    assert_eq!(seen, names);
}

/// A subscriber that joins late first receives a `created` replay of every
/// existing variant, then live events.
#[tokio::test]
async fn test_late_subscriber_replay_then_updates() {
    let mut f = Fixture::new();
    let created = f.create_config("banner", json!("hello"));
    let variant_id = created.config_variant_ids[1].clone();

    let mut subscription = f.replica.subscribe(&f.project.id);
    let replay: Vec<_> = (0..2).map(|_| subscription.try_next().unwrap()).collect();
    assert!(replay.iter().all(|e| e.kind == ReplicaEventKind::Created));

    f.manager
        .patch_config_variant(
            &f.admin,
            &variant_id,
            1,
            VariantPatch::new().with_value(json!("bye")),
        )
        .unwrap();
    let event = tokio::time::timeout(Duration::from_secs(1), subscription.next())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.kind, ReplicaEventKind::Updated);
    assert_eq!(event.variant_id, variant_id);
    assert_eq!(event.version, 2);
    assert_eq!(event.value, json!("bye"));
}

/// Approving a proposal is visible on the feed; deleting the config emits
/// `deleted` with the last known snapshot.
#[tokio::test]
async fn test_approval_and_delete_events() {
    let mut f = Fixture::with_project(
        CreateProjectOptions::new("shop").with_allow_self_approvals(true),
    );
    let created = f.create_config("feature-flag", json!({"enabled": true}));
    let mut subscription = f.replica.subscribe(&f.project.id);
    while subscription.try_next().is_some() {}

    let proposal = f
        .manager
        .create_proposal(
            &f.admin,
            CreateProposalOptions::new(
                &created.config_id,
                ProposalTarget::Variant {
                    variant_id: created.config_variant_ids[1].clone(),
                },
                1,
                ProposalDiff::new().with_value(json!({"enabled": false})),
            ),
        )
        .unwrap();
    f.manager.approve_proposal(&f.admin, &proposal.id).unwrap();

    let event = subscription.next().await.unwrap();
    assert_eq!(event.kind, ReplicaEventKind::Updated);
    assert_eq!(event.value, json!({"enabled": false}));
    assert!(subscription.try_next().is_none(), "untouched variant emits nothing");

    f.manager
        .delete_config(&f.admin, &f.project.id, "feature-flag", 1)
        .unwrap();
    let deleted: Vec<_> = (0..2).map(|_| subscription.try_next().unwrap()).collect();
    assert!(deleted.iter().all(|e| e.kind == ReplicaEventKind::Deleted));
    assert!(deleted
        .iter()
        .any(|e| e.value == json!({"enabled": false}) && e.version == 2));
}

/// Editing a config re-publishes the variants in the same environment whose
/// overrides reference it, with the new rendering.
#[tokio::test]
async fn test_referenced_config_change_updates_dependents() {
    let mut f = Fixture::new();
    let list = f.create_config("vip-users", json!({"ids": ["u1"]}));
    let mut rule = Override::new("vip", json!(true));
    rule.conditions.push(Condition {
        property: "userId".into(),
        operator: Operator::In,
        value: ConditionValue::reference("vip-users", vec!["ids".into()]),
    });
    let flag = f
        .manager
        .create_config(
            &f.admin,
            CreateConfigOptions::new(
                &f.project.id,
                "beta-banner",
                VariantInput::new(json!(false)).with_overrides(vec![rule]),
            ),
        )
        .unwrap();
    let mut subscription = f.replica.subscribe(&f.project.id);
    while subscription.try_next().is_some() {}

    f.manager
        .patch_config_variant(
            &f.admin,
            &list.config_variant_ids[1],
            1,
            VariantPatch::new().with_value(json!({"ids": ["u1", "u2"]})),
        )
        .unwrap();

    let own = subscription.next().await.unwrap();
    assert_eq!(own.kind, ReplicaEventKind::Updated);
    assert_eq!(own.config_name, "vip-users");
    let dependent = subscription.next().await.unwrap();
    assert_eq!(dependent.kind, ReplicaEventKind::Updated);
    assert_eq!(dependent.variant_id, flag.config_variant_ids[1]);
    assert_eq!(dependent.environment_id, own.environment_id);
    assert_eq!(dependent.version, 1);
    assert_eq!(
        dependent.rendered_overrides[0].conditions[0].value,
        ConditionValue::literal(json!(["u1", "u2"]))
    );
    assert!(subscription.try_next().is_none(), "other environments keep their rendering");
}

/// Adding an environment emits a `created` event for each config's new
/// variant.
#[tokio::test]
async fn test_new_environment_emits_created() {
    let mut f = Fixture::new();
    f.create_config("a", json!(1));
    f.create_config("b", json!(2));
    let mut subscription = f.replica.subscribe(&f.project.id);
    while subscription.try_next().is_some() {}

    let staging = f
        .manager
        .create_environment(
            &f.admin,
            CreateEnvironmentOptions::new(&f.project.id, "Staging"),
        )
        .unwrap();
    let mut names = Vec::new();
    while let Some(event) = subscription.try_next() {
        assert_eq!(event.kind, ReplicaEventKind::Created);
        assert_eq!(event.environment_id, staging.id);
        names.push(event.config_name);
    }
    names.sort();
    assert_eq!(names, ["a", "b"]);
}

/// Subscriptions used as a `Stream` end after `close` and unsubscribe on
/// drop.
#[tokio::test]
async fn test_stream_close_and_drop() {
    let mut f = Fixture::new();
    let mut streamed = f.replica.subscribe(&f.project.id);
    let dropped = f.replica.subscribe(&f.project.id);
    assert_eq!(f.replica.subscriber_count(), 2);

    drop(dropped);
    assert_eq!(f.replica.subscriber_count(), 1);

    f.create_config("flag", json!(true));
    let first = StreamExt::next(&mut streamed).await.unwrap();
    assert_eq!(first.config_name, "flag");

    streamed.close();
    assert_eq!(f.replica.subscriber_count(), 0);
    assert!(StreamExt::next(&mut streamed).await.is_none());

    // Mutations after close reach nobody and do not fail.
    f.create_config("later", json!(false));
    assert_eq!(f.replica.len(), 4);
    let stranger = identity("stranger@example.com");
    assert!(f
        .manager
        .get_config_list(&stranger, &f.project.id)
        .unwrap()
        .is_empty());
}
