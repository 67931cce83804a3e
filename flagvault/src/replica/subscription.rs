//! Per-subscriber event channels.
//!
//! Each subscriber owns an unbounded channel, so a slow consumer never
//! blocks publishing and never loses events. Dropping or closing a
//! [`Subscription`] removes its sender from the registry.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::event::ReplicaEvent;

pub(super) struct Subscriber {
    pub(super) project_id: String,
    pub(super) sender: mpsc::UnboundedSender<ReplicaEvent>,
}

/// Live subscribers keyed by subscription id.
#[derive(Default)]
pub(super) struct SubscriberRegistry {
    next_id: u64,
    subscribers: HashMap<u64, Subscriber>,
}

impl SubscriberRegistry {
    pub(super) fn register(&mut self, subscriber: Subscriber) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.subscribers.insert(id, subscriber);
        log::debug!("registered replica subscriber {id}");
        id
    }

    pub(super) fn unregister(&mut self, id: u64) {
        if self.subscribers.remove(&id).is_some() {
            log::debug!("unregistered replica subscriber {id}");
        }
    }

    pub(super) fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Sends `event` to every subscriber of its project, dropping
    /// subscribers whose receiver is gone.
    pub(super) fn publish(&mut self, event: &ReplicaEvent) {
        self.subscribers.retain(|id, subscriber| {
            if subscriber.project_id != event.project_id {
                return true;
            }
            let delivered = subscriber.sender.send(event.clone()).is_ok();
            if !delivered {
                log::debug!("dropping disconnected replica subscriber {id}");
            }
            delivered
        });
    }
}

/// Handle returned by [`ConfigReplica::subscribe`](super::ConfigReplica::subscribe).
///
/// Yields every event for its project published after the initial replay,
/// in publication order.
pub struct Subscription {
    id: u64,
    receiver: mpsc::UnboundedReceiver<ReplicaEvent>,
    registry: Weak<Mutex<SubscriberRegistry>>,
    closed: bool,
}

impl Subscription {
    pub(super) fn new(
        id: u64,
        receiver: mpsc::UnboundedReceiver<ReplicaEvent>,
        registry: Weak<Mutex<SubscriberRegistry>>,
    ) -> Self {
        Self {
            id,
            receiver,
            registry,
            closed: false,
        }
    }

    /// Waits for the next event. Returns `None` once the subscription is
    /// closed or the replica is gone.
    pub async fn next(&mut self) -> Option<ReplicaEvent> {
        if self.closed {
            return None;
        }
        self.receiver.recv().await
    }

    /// Returns an already-published event without waiting.
    pub fn try_next(&mut self) -> Option<ReplicaEvent> {
        if self.closed {
            return None;
        }
        self.receiver.try_recv().ok()
    }

    /// Unsubscribes and discards undelivered events.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.unregister();
        self.receiver.close();
        while self.receiver.try_recv().is_ok() {}
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    fn unregister(&self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.lock().unregister(self.id);
        }
    }
}

impl Stream for Subscription {
    type Item = ReplicaEvent;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.closed {
            return Poll::Ready(None);
        }
        this.receiver.poll_recv(cx)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if !self.closed {
            self.unregister();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
