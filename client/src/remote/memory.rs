//! In-process Remote Store.
//!
//! Stands in for the hosted document store in tests and in the agent
//! binary. One backend can be shared by several device handles, each with
//! its own connectivity, so multi-device convergence can be exercised in a
//! single process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use fitsync_engine::Document;
use serde_json::Value;
use tokio::sync::mpsc;

use super::subscriptions::SubscriberRegistry;
use super::{CollectionRef, RemoteError, RemoteStore, Subscription, WriteBatch, WriteOp};

/// Connectivity of one device handle.
#[derive(Debug)]
pub(crate) struct LinkState {
    reachable: AtomicBool,
    network_enabled: AtomicBool,
}

impl LinkState {
    pub(crate) fn connected() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            network_enabled: AtomicBool::new(true),
        }
    }

    pub(crate) fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn set_network_enabled(&self, enabled: bool) {
        self.network_enabled.store(enabled, Ordering::SeqCst);
    }

    fn network_enabled(&self) -> bool {
        self.network_enabled.load(Ordering::SeqCst)
    }

    pub(crate) fn is_up(&self) -> bool {
        self.reachable.load(Ordering::SeqCst) && self.network_enabled()
    }
}

#[derive(Debug, Default)]
struct Backend {
    /// Documents per sub-collection, in insertion order
    collections: DashMap<CollectionRef, Vec<Document>>,
    subscribers: SubscriberRegistry,
}

#[derive(Debug, Default)]
struct FaultPlan {
    remaining: usize,
    error: Option<RemoteError>,
    /// Only writes fail; reads pass through
    writes_only: bool,
}

/// A device's handle on an in-process document store.
#[derive(Debug, Clone)]
pub struct InMemoryRemote {
    backend: Arc<Backend>,
    link: Arc<LinkState>,
    faults: Arc<Mutex<FaultPlan>>,
}

impl Default for InMemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryRemote {
    /// A fresh, empty store with one connected device handle.
    pub fn new() -> Self {
        Self {
            backend: Arc::new(Backend::default()),
            link: Arc::new(LinkState::connected()),
            faults: Arc::new(Mutex::new(FaultPlan::default())),
        }
    }

    /// Another device handle on the same store, with its own connectivity.
    pub fn connect_device(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            link: Arc::new(LinkState::connected()),
            faults: Arc::new(Mutex::new(FaultPlan::default())),
        }
    }

    /// Simulate losing or regaining connectivity on this device.
    pub fn set_reachable(&self, reachable: bool) {
        self.link.set_reachable(reachable);
    }

    pub fn is_network_enabled(&self) -> bool {
        self.link.network_enabled()
    }

    /// Make the next `count` data calls on this device fail with `error`.
    pub fn fail_next(&self, count: usize, error: RemoteError) {
        let mut plan = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        plan.remaining = count;
        plan.error = Some(error);
        plan.writes_only = false;
    }

    /// Like [`fail_next`](Self::fail_next), but reads keep working.
    pub fn fail_next_writes(&self, count: usize, error: RemoteError) {
        let mut plan = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
        plan.remaining = count;
        plan.error = Some(error);
        plan.writes_only = true;
    }

    /// Current documents of a sub-collection, bypassing connectivity.
    pub fn documents(&self, collection: &CollectionRef) -> Vec<Document> {
        self.backend
            .collections
            .get(collection)
            .map(|docs| docs.value().clone())
            .unwrap_or_default()
    }

    /// Number of live subscriptions across all devices.
    pub fn subscriber_count(&self) -> usize {
        self.backend.subscribers.subscriber_count()
    }

    fn check(&self) -> Result<(), RemoteError> {
        self.check_call(true)
    }

    fn check_read(&self) -> Result<(), RemoteError> {
        self.check_call(false)
    }

    fn check_call(&self, write: bool) -> Result<(), RemoteError> {
        {
            let mut plan = self.faults.lock().unwrap_or_else(PoisonError::into_inner);
            if plan.remaining > 0 && (write || !plan.writes_only) {
                plan.remaining -= 1;
                if let Some(error) = plan.error.clone() {
                    return Err(error);
                }
            }
        }
        if !self.link.reachable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("device is offline".into()));
        }
        if !self.link.network_enabled() {
            return Err(RemoteError::Unavailable("network disabled".into()));
        }
        Ok(())
    }

    /// Apply a mutation to a sub-collection and broadcast the result if it
    /// changed anything.
    fn mutate<T>(
        &self,
        collection: &CollectionRef,
        f: impl FnOnce(&mut Vec<Document>) -> Result<(T, bool), RemoteError>,
    ) -> Result<T, RemoteError> {
        let mut docs = self
            .backend
            .collections
            .entry(collection.clone())
            .or_default();

        let (value, changed) = f(docs.value_mut())?;
        if changed {
            // Broadcast while holding the entry so snapshots arrive in commit order
            self.backend
                .subscribers
                .broadcast(collection, &Ok(docs.value().clone()));
        }
        Ok(value)
    }
}

fn new_document_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn upsert(docs: &mut Vec<Document>, id: &str, data: Value) {
    match docs.iter_mut().find(|d| d.id == id) {
        Some(doc) => doc.data = data,
        None => docs.push(Document::new(id, data)),
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemote {
    async fn list(&self, collection: &CollectionRef) -> Result<Vec<Document>, RemoteError> {
        self.check_read()?;
        Ok(self.documents(collection))
    }

    async fn add(&self, collection: &CollectionRef, data: Value) -> Result<String, RemoteError> {
        self.check()?;
        self.mutate(collection, |docs| {
            let id = new_document_id();
            docs.push(Document::new(id.clone(), data));
            Ok((id, true))
        })
    }

    async fn set(
        &self,
        collection: &CollectionRef,
        id: &str,
        data: Value,
    ) -> Result<(), RemoteError> {
        self.check()?;
        if id.is_empty() {
            return Err(RemoteError::Malformed("empty document id".into()));
        }
        self.mutate(collection, |docs| {
            upsert(docs, id, data);
            Ok(((), true))
        })
    }

    async fn delete(&self, collection: &CollectionRef, id: &str) -> Result<(), RemoteError> {
        self.check()?;
        self.mutate(collection, |docs| {
            let before = docs.len();
            docs.retain(|d| d.id != id);
            Ok(((), docs.len() != before))
        })
    }

    async fn commit(
        &self,
        collection: &CollectionRef,
        batch: WriteBatch,
    ) -> Result<(), RemoteError> {
        self.check()?;
        if batch.is_empty() {
            return Ok(());
        }
        self.mutate(collection, |docs| {
            let mut next = docs.clone();
            for op in batch.into_ops() {
                match op {
                    WriteOp::Delete { id } => next.retain(|d| d.id != id),
                    WriteOp::Insert { data } => next.push(Document::new(new_document_id(), data)),
                    WriteOp::Set { id, data } => {
                        if id.is_empty() {
                            return Err(RemoteError::Malformed("empty document id".into()));
                        }
                        upsert(&mut next, &id, data);
                    }
                }
            }
            let changed = next != *docs;
            *docs = next;
            Ok(((), changed))
        })
    }

    async fn subscribe(&self, collection: &CollectionRef) -> Result<Subscription, RemoteError> {
        let (tx, rx) = mpsc::unbounded_channel();

        // Register under the entry lock so no commit slips between the
        // initial snapshot and the first broadcast
        let docs = self
            .backend
            .collections
            .entry(collection.clone())
            .or_default();
        let id = self
            .backend
            .subscribers
            .register(collection.clone(), tx, Arc::clone(&self.link));
        self.backend
            .subscribers
            .send_to(&id, Ok(docs.value().clone()));
        drop(docs);

        Ok(Subscription::new(id, collection.clone(), rx))
    }

    fn unsubscribe(&self, subscription_id: &str) {
        self.backend.subscribers.unregister(subscription_id);
    }

    async fn enable_network(&self) -> Result<(), RemoteError> {
        self.link.set_network_enabled(true);
        Ok(())
    }

    async fn disable_network(&self) -> Result<(), RemoteError> {
        self.link.set_network_enabled(false);
        Ok(())
    }
}
