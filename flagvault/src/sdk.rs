//! Read path for SDK clients.
//!
//! [`SdkResolver`] answers from the [`ConfigReplica`], never from the
//! version store, so serving scales with the projection rather than with
//! SQLite. A missing config is `None`, not an error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::model::{ResolvedVariant, SdkKey};
use crate::operations::ConfigManager;
use crate::overrides::{evaluate, Evaluation, EvaluationContext, Override};
use crate::replica::ConfigReplica;

/// What an SDK receives for one config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkConfig {
    /// Config name.
    pub name: String,
    /// Base value of the environment variant.
    pub value: Value,
    /// Effective schema.
    pub schema: Option<Value>,
    /// Stored overrides, unchanged, for client-side evaluation.
    pub overrides: Vec<Override>,
    /// Variant version.
    pub version: i64,
}

impl From<ResolvedVariant> for SdkConfig {
    fn from(variant: ResolvedVariant) -> Self {
        Self {
            name: variant.config_name,
            value: variant.value,
            schema: variant.schema,
            overrides: variant.overrides,
            version: variant.version,
        }
    }
}

/// A config together with the value its overrides select for a context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SdkEvaluation {
    /// The config as stored.
    pub config: SdkConfig,
    /// Value selected for the request context.
    pub evaluation: Evaluation,
}

/// Result of resolving a config with an SDK key.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyedResolution {
    /// The authenticated key.
    pub key: SdkKey,
    /// The config in the key's environment.
    pub config: Option<SdkConfig>,
    /// Set when a context was supplied and the config exists.
    pub evaluation: Option<Evaluation>,
}

/// Serves configs to SDK clients from a replica.
#[derive(Debug, Clone)]
pub struct SdkResolver {
    replica: ConfigReplica,
}

impl SdkResolver {
    /// Creates a resolver over `replica`.
    #[must_use]
    pub const fn new(replica: ConfigReplica) -> Self {
        Self { replica }
    }

    /// Returns the config `name` in a project environment.
    #[must_use]
    pub fn resolve(&self, project_id: &str, environment_id: &str, name: &str) -> Option<SdkConfig> {
        self.replica
            .get(project_id, environment_id, name)
            .map(SdkConfig::from)
    }

    /// Resolves a config and evaluates its overrides, with references to
    /// other configs substituted, against `context`.
    #[must_use]
    pub fn evaluate(
        &self,
        project_id: &str,
        environment_id: &str,
        name: &str,
        context: &EvaluationContext,
    ) -> Option<SdkEvaluation> {
        let (variant, rendered) = self.replica.get_rendered(project_id, environment_id, name)?;
        let evaluation = evaluate(context, &rendered, &variant.value);
        Some(SdkEvaluation {
            config: variant.into(),
            evaluation,
        })
    }

    /// Authenticates an SDK key and resolves `name` in its environment.
    ///
    /// # Errors
    ///
    /// Returns `BadRequest` for a malformed token and `Forbidden` for an
    /// unknown one.
    pub fn resolve_for_key(
        &self,
        manager: &ConfigManager,
        token: &str,
        name: &str,
        context: Option<&EvaluationContext>,
    ) -> Result<KeyedResolution> {
        let key = manager.verify_sdk_key(token)?;
        let resolution = match context {
            Some(context) => match self.evaluate(&key.project_id, &key.environment_id, name, context) {
                Some(found) => KeyedResolution {
                    config: Some(found.config),
                    evaluation: Some(found.evaluation),
                    key,
                },
                None => KeyedResolution {
                    key,
                    config: None,
                    evaluation: None,
                },
            },
            None => KeyedResolution {
                config: self.resolve(&key.project_id, &key.environment_id, name),
                evaluation: None,
                key,
            },
        };
        log::debug!(
            "sdk key {} resolved {name}: {}",
            resolution.key.id,
            if resolution.config.is_some() { "hit" } else { "miss" }
        );
        Ok(resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_util::create_test_database;
    use crate::model::{Identity, VariantInput, VariantPatch};
    use crate::operations::{CreateConfigOptions, CreateProjectOptions, CreateSdkKeyOptions};
    use crate::overrides::{Condition, ConditionValue, Operator};
    use serde_json::json;

    struct Fixture {
        manager: ConfigManager,
        resolver: SdkResolver,
        admin: Identity,
        project_id: String,
        environment_id: String,
    }

    fn fixture() -> Fixture {
        let db = create_test_database();
        let replica = ConfigReplica::open(db.reopen().unwrap()).unwrap();
        let mut manager = ConfigManager::new(db).with_replica(replica.clone());
        let admin = Identity::new("admin@example.com").unwrap();
        let project = manager
            .create_project(&admin, CreateProjectOptions::new("shop"))
            .unwrap();
        let environment_id = manager
            .list_environments(&admin, &project.id)
            .unwrap()
            .remove(0)
            .id;
        Fixture {
            manager,
            resolver: SdkResolver::new(replica),
            admin,
            project_id: project.id,
            environment_id,
        }
    }

    #[test]
    fn test_resolve_missing_is_none() {
        let f = fixture();
        assert!(f.resolver.resolve(&f.project_id, &f.environment_id, "nope").is_none());
        assert!(f
            .resolver
            .evaluate(&f.project_id, &f.environment_id, "nope", &EvaluationContext::new())
            .is_none());
    }

    #[test]
    fn test_resolve_keeps_stored_overrides() {
        let mut f = fixture();
        f.manager
            .create_config(
                &f.admin,
                CreateConfigOptions::new(&f.project_id, "plan-limit", VariantInput::new(json!(10))),
            )
            .unwrap();
        let threshold = f
            .resolver
            .resolve(&f.project_id, &f.environment_id, "plan-limit")
            .unwrap();
        let rules = vec![Override::new("pro", json!(100)).with_condition(Condition {
            property: "seats".into(),
            operator: Operator::GreaterThan,
            value: ConditionValue::reference("plan-limit", vec![]),
        })];

        let created = f
            .manager
            .create_config(
                &f.admin,
                CreateConfigOptions::new(&f.project_id, "quota", VariantInput::new(json!(5)))
                    .with_environment_variant(
                        &f.environment_id,
                        VariantInput::new(json!(5)).with_overrides(rules.clone()),
                    ),
            )
            .unwrap();
        assert_eq!(threshold.version, 1);

        let stored = f
            .resolver
            .resolve(&f.project_id, &f.environment_id, "quota")
            .unwrap();
        assert_eq!(stored.overrides, rules);
        assert_eq!(stored.value, json!(5));

        let mut context = EvaluationContext::new();
        context.insert("seats".into(), json!(11));
        let evaluated = f
            .resolver
            .evaluate(&f.project_id, &f.environment_id, "quota", &context)
            .unwrap();
        assert_eq!(evaluated.evaluation.value, json!(100));
        assert_eq!(evaluated.config.overrides, rules);

        context.insert("seats".into(), json!(3));
        let evaluated = f
            .resolver
            .evaluate(&f.project_id, &f.environment_id, "quota", &context)
            .unwrap();
        assert_eq!(evaluated.evaluation.value, json!(5));
        assert!(evaluated.evaluation.matched_override_name.is_none());

        let variant_id = created.config_variant_ids[1].clone();
        f.manager
            .patch_config_variant(&f.admin, &variant_id, 1, VariantPatch::new().with_value(json!(6)))
            .unwrap();
        let updated = f
            .resolver
            .resolve(&f.project_id, &f.environment_id, "quota")
            .unwrap();
        assert_eq!(updated.value, json!(6));
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn test_resolve_for_key() {
        let mut f = fixture();
        f.manager
            .create_config(
                &f.admin,
                CreateConfigOptions::new(&f.project_id, "banner", VariantInput::new(json!("hi"))),
            )
            .unwrap();
        let issued = f
            .manager
            .create_sdk_key(
                &f.admin,
                CreateSdkKeyOptions::new(&f.project_id, &f.environment_id, "web"),
            )
            .unwrap();

        let found = f
            .resolver
            .resolve_for_key(&f.manager, &issued.token, "banner", None)
            .unwrap();
        assert_eq!(found.key.id, issued.key.id);
        assert_eq!(found.config.unwrap().value, json!("hi"));
        assert!(found.evaluation.is_none());

        let with_context = f
            .resolver
            .resolve_for_key(&f.manager, &issued.token, "banner", Some(&EvaluationContext::new()))
            .unwrap();
        assert_eq!(with_context.evaluation.unwrap().value, json!("hi"));

        let missing = f
            .resolver
            .resolve_for_key(&f.manager, &issued.token, "absent", None)
            .unwrap();
        assert!(missing.config.is_none());

        assert!(f
            .resolver
            .resolve_for_key(&f.manager, "rp_bad", "banner", None)
            .is_err());
    }
}
