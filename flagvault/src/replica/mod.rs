//! Read-optimized replica of environment variants and its change feed.
//!
//! [`ConfigReplica`] keeps an in-memory projection of every environment
//! variant, refreshed by [`notify`](ConfigReplica::notify) after a commit or by
//! a full [`resync`](ConfigReplica::resync). Each refresh that changes the
//! projection publishes a [`ReplicaEvent`] to the subscribers of the
//! variant's project.
//!
//! # Examples
//!
//! ```no_run
//! use flagvault::database::{Database, DatabaseConfig};
//! use flagvault::replica::ConfigReplica;
//!
//! # async fn run() -> flagvault::Result<()> {
//! let db = Database::open(DatabaseConfig::new("/tmp/flagvault.db"))?;
//! let replica = ConfigReplica::open(db)?;
//!
//! let mut events = replica.subscribe("project-id");
//! while let Some(event) = events.next().await {
//!     println!("{} {} v{}", event.kind, event.config_name, event.version);
//! }
//! # Ok(())
//! # }
//! ```

mod event;
mod projection;
mod subscription;

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::database::Database;
use crate::error::Result;
use crate::model::ResolvedVariant;
use crate::overrides::Override;

pub use event::{ReplicaEvent, ReplicaEventKind};
pub use subscription::Subscription;

use projection::Projection;
use subscription::{Subscriber, SubscriberRegistry};

struct Inner {
    db: Mutex<Database>,
    projection: Mutex<Projection>,
    registry: Arc<Mutex<SubscriberRegistry>>,
}

/// Shared handle to the replica. Clones refer to the same projection.
///
/// Lock order is database, then projection, then subscriber registry.
#[derive(Clone)]
pub struct ConfigReplica {
    inner: Arc<Inner>,
}

impl ConfigReplica {
    /// Creates a replica reading through `db` and loads every variant.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial load fails.
    pub fn open(db: Database) -> Result<Self> {
        let replica = Self::empty(db);
        replica.resync()?;
        Ok(replica)
    }

    /// Creates a replica with an empty projection. Variants enter it through
    /// [`notify`](Self::notify) or [`resync`](Self::resync).
    #[must_use]
    pub fn empty(db: Database) -> Self {
        Self {
            inner: Arc::new(Inner {
                db: Mutex::new(db),
                projection: Mutex::new(Projection::default()),
                registry: Arc::new(Mutex::new(SubscriberRegistry::default())),
            }),
        }
    }

    /// Re-reads the given variants and publishes one event per variant
    /// whose state changed, in the order given. Each is followed by
    /// `updated` events for variants whose rendered overrides reference it.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails; events for variants processed
    /// before the failure have already been published.
    pub fn notify<S: AsRef<str>>(&self, variant_ids: &[S]) -> Result<usize> {
        let db = self.inner.db.lock();
        let mut projection = self.inner.projection.lock();
        let mut published = 0;
        for id in variant_ids {
            let id = id.as_ref();
            let current = Database::get_resolved_variant(db.connection(), id)?;
            for event in projection.apply(id, current) {
                self.inner.registry.lock().publish(&event);
                published += 1;
            }
        }
        Ok(published)
    }

    /// Reloads every variant and publishes an event for each difference
    /// between the store and the projection.
    ///
    /// # Errors
    ///
    /// Returns an error if the full read fails; the projection is left
    /// unchanged in that case.
    pub fn resync(&self) -> Result<usize> {
        let db = self.inner.db.lock();
        let rows = Database::list_resolved_variants(db.connection())?;
        let mut projection = self.inner.projection.lock();

        let mut stale = projection.ids();
        let mut events = Vec::new();
        for row in rows {
            let id = row.variant_id.clone();
            stale.retain(|known| *known != id);
            events.extend(projection.apply(&id, Some(row)));
        }
        for id in stale {
            events.extend(projection.apply(&id, None));
        }

        let mut registry = self.inner.registry.lock();
        for event in &events {
            registry.publish(event);
        }
        log::debug!(
            "replica resync: {} variants, {} changes",
            projection.len(),
            events.len()
        );
        Ok(events.len())
    }

    /// Subscribes to a project's events.
    ///
    /// The subscription first yields a `created` event for every variant of
    /// the project currently in the projection, then every later event.
    #[must_use]
    pub fn subscribe(&self, project_id: &str) -> Subscription {
        let projection = self.inner.projection.lock();
        let (sender, receiver) = mpsc::unbounded_channel();
        for event in projection.replay(project_id) {
            // The receiver is still in scope, so this cannot fail.
            let _ = sender.send(event);
        }
        let id = self.inner.registry.lock().register(Subscriber {
            project_id: project_id.to_string(),
            sender,
        });
        Subscription::new(id, receiver, Arc::downgrade(&self.inner.registry))
    }

    /// Returns the variant of config `name` in a project environment.
    #[must_use]
    pub fn get(&self, project_id: &str, environment_id: &str, name: &str) -> Option<ResolvedVariant> {
        self.inner
            .projection
            .lock()
            .lookup(project_id, environment_id, name)
            .cloned()
    }

    /// Like [`get`](Self::get), also returning the overrides with config
    /// references substituted.
    #[must_use]
    pub fn get_rendered(
        &self,
        project_id: &str,
        environment_id: &str,
        name: &str,
    ) -> Option<(ResolvedVariant, Vec<Override>)> {
        let projection = self.inner.projection.lock();
        let variant = projection.lookup(project_id, environment_id, name)?;
        let rendered = projection.render(variant);
        Some((variant.clone(), rendered))
    }

    /// Number of variants in the projection.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.projection.lock().len()
    }

    /// Returns true if the projection holds no variants.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.inner.registry.lock().len()
    }
}

impl std::fmt::Debug for ConfigReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigReplica")
            .field("variants", &self.len())
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}
