//! Live-subscription registry.
//!
//! Tracks snapshot subscribers per sub-collection and fans committed
//! snapshots out to them.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::memory::LinkState;
use super::{CollectionRef, SnapshotEvent};

/// Sender half of a subscription stream.
pub type EventSender = mpsc::UnboundedSender<SnapshotEvent>;

/// A single subscriber.
#[derive(Debug)]
pub struct Subscriber {
    pub id: String,
    pub collection: CollectionRef,
    sender: EventSender,
    /// Connectivity of the device that owns the subscription
    link: Arc<LinkState>,
}

/// Registry of live subscribers, shared by every device handle of a backend.
#[derive(Debug, Default)]
pub struct SubscriberRegistry {
    subscribers: DashMap<String, Subscriber>,
    /// Subscriber ids per sub-collection
    by_collection: DashMap<CollectionRef, Vec<String>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a subscriber and return its id.
    pub(crate) fn register(
        &self,
        collection: CollectionRef,
        sender: EventSender,
        link: Arc<LinkState>,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();

        self.subscribers.insert(
            id.clone(),
            Subscriber {
                id: id.clone(),
                collection: collection.clone(),
                sender,
                link,
            },
        );
        self.by_collection
            .entry(collection.clone())
            .or_default()
            .push(id.clone());

        tracing::debug!(subscription = %id, collection = %collection, "Subscriber registered");
        id
    }

    pub fn unregister(&self, id: &str) {
        if let Some((_, sub)) = self.subscribers.remove(id) {
            if let Some(mut ids) = self.by_collection.get_mut(&sub.collection) {
                ids.retain(|other| other != id);
                if ids.is_empty() {
                    drop(ids);
                    self.by_collection.remove(&sub.collection);
                }
            }

            tracing::debug!(subscription = %id, collection = %sub.collection, "Subscriber unregistered");
        }
    }

    /// Deliver an event to every reachable subscriber of a sub-collection.
    ///
    /// Returns the number of subscribers that received it.
    pub fn broadcast(&self, collection: &CollectionRef, event: &SnapshotEvent) -> usize {
        let ids = match self.by_collection.get(collection) {
            Some(ids) => ids.clone(),
            None => return 0,
        };

        let sent = ids
            .iter()
            .filter(|id| self.send_to(id, event.clone()))
            .count();

        tracing::trace!(collection = %collection, recipients = sent, "Snapshot broadcast");
        sent
    }

    /// Send an event to one subscriber if its device is reachable.
    pub fn send_to(&self, id: &str, event: SnapshotEvent) -> bool {
        match self.subscribers.get(id) {
            Some(sub) if sub.link.is_up() => sub.sender.send(event).is_ok(),
            _ => false,
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Number of sub-collections with at least one subscriber.
    pub fn collection_count(&self) -> usize {
        self.by_collection.len()
    }
}
