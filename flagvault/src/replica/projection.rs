//! In-memory projection of environment variants.

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::model::ResolvedVariant;
use crate::overrides::{render_overrides, ConditionValue, Override};

use super::event::{ReplicaEvent, ReplicaEventKind};

type NameKey = (String, String, String);

fn name_key(variant: &ResolvedVariant) -> NameKey {
    (
        variant.project_id.clone(),
        variant.environment_id.clone(),
        variant.config_name.clone(),
    )
}

fn references(variant: &ResolvedVariant, name: &str) -> bool {
    variant
        .overrides
        .iter()
        .flat_map(|rule| &rule.conditions)
        .any(|condition| match &condition.value {
            ConditionValue::Reference { config_name, .. } => config_name == name,
            ConditionValue::Literal { .. } => false,
        })
}

/// Variants keyed by id, with a (project, environment, name) index.
#[derive(Debug, Default)]
pub(super) struct Projection {
    variants: HashMap<String, ResolvedVariant>,
    by_name: BTreeMap<NameKey, String>,
    // Overrides as last published for each variant.
    rendered: HashMap<String, Vec<Override>>,
    // Insertion order, so replays list variants in creation order.
    order: Vec<String>,
}

impl Projection {
    pub(super) fn len(&self) -> usize {
        self.variants.len()
    }

    pub(super) fn lookup(
        &self,
        project_id: &str,
        environment_id: &str,
        name: &str,
    ) -> Option<&ResolvedVariant> {
        let key = (
            project_id.to_string(),
            environment_id.to_string(),
            name.to_string(),
        );
        self.by_name.get(&key).and_then(|id| self.variants.get(id))
    }

    /// Substitutes config references with values from the same project
    /// and environment.
    pub(super) fn render(&self, variant: &ResolvedVariant) -> Vec<Override> {
        let resolver = |name: &str| -> Option<Value> {
            self.lookup(&variant.project_id, &variant.environment_id, name)
                .map(|target| target.value.clone())
        };
        render_overrides(&variant.overrides, &resolver)
    }

    /// Applies the current state of one variant (`None` when it no longer
    /// exists) and returns the events describing the change: one for the
    /// variant itself, followed by an `updated` event for every variant in
    /// the same project and environment whose rendered overrides moved
    /// because they reference it.
    pub(super) fn apply(
        &mut self,
        variant_id: &str,
        current: Option<ResolvedVariant>,
    ) -> Vec<ReplicaEvent> {
        let mut events = Vec::new();
        let Some(variant) = current else {
            if let Some(previous) = self.remove(variant_id) {
                let rendered = self
                    .rendered
                    .remove(variant_id)
                    .unwrap_or_else(|| self.render(&previous));
                events.push(ReplicaEvent::new(ReplicaEventKind::Deleted, &previous, rendered));
                self.refresh_dependents(&name_key(&previous), &mut events);
            }
            return events;
        };
        let previous_key = match self.variants.get(variant_id) {
            None => None,
            Some(previous) if *previous == variant => return events,
            Some(previous) => Some(name_key(previous)),
        };
        let kind = if previous_key.is_some() {
            ReplicaEventKind::Updated
        } else {
            ReplicaEventKind::Created
        };

        self.insert(variant.clone());
        let rendered = self.render(&variant);
        self.rendered.insert(variant_id.to_string(), rendered.clone());
        events.push(ReplicaEvent::new(kind, &variant, rendered));

        let key = name_key(&variant);
        if let Some(previous_key) = previous_key.filter(|previous| *previous != key) {
            self.refresh_dependents(&previous_key, &mut events);
        }
        self.refresh_dependents(&key, &mut events);
        events
    }

    /// Re-renders the variants that reference the config at `key` and
    /// emits `updated` for each whose rendering differs from the last one
    /// published.
    fn refresh_dependents(&mut self, key: &NameKey, events: &mut Vec<ReplicaEvent>) {
        let (project_id, environment_id, name) = key;
        let start = (project_id.clone(), environment_id.clone(), String::new());
        let dependents: Vec<String> = self
            .by_name
            .range(start..)
            .take_while(|((p, e, _), _)| p == project_id && e == environment_id)
            .map(|(_, id)| id)
            .filter(|id| self.variants.get(*id).is_some_and(|v| references(v, name)))
            .cloned()
            .collect();

        for id in dependents {
            let Some(variant) = self.variants.get(&id) else {
                continue;
            };
            let rendered = self.render(variant);
            if self.rendered.get(&id) == Some(&rendered) {
                continue;
            }
            log::trace!("re-rendered {} after {name} changed", variant.config_name);
            events.push(ReplicaEvent::new(ReplicaEventKind::Updated, variant, rendered.clone()));
            self.rendered.insert(id, rendered);
        }
    }

    /// Ids currently held, in insertion order.
    pub(super) fn ids(&self) -> Vec<String> {
        self.order.clone()
    }

    /// `created` events for every variant of a project.
    pub(super) fn replay(&self, project_id: &str) -> Vec<ReplicaEvent> {
        self.order
            .iter()
            .filter_map(|id| self.variants.get(id))
            .filter(|variant| variant.project_id == project_id)
            .map(|variant| ReplicaEvent::new(ReplicaEventKind::Created, variant, self.render(variant)))
            .collect()
    }

    fn insert(&mut self, variant: ResolvedVariant) {
        let id = variant.variant_id.clone();
        if let Some(previous) = self.variants.get(&id) {
            self.by_name.remove(&name_key(previous));
        } else {
            self.order.push(id.clone());
        }
        self.by_name.insert(name_key(&variant), id.clone());
        self.variants.insert(id, variant);
    }

    fn remove(&mut self, variant_id: &str) -> Option<ResolvedVariant> {
        let previous = self.variants.remove(variant_id)?;
        self.by_name.remove(&name_key(&previous));
        self.order.retain(|id| id != variant_id);
        Some(previous)
    }
}
