//! Remote Store contract.
//!
//! A multi-tenant document store with one sub-collection per user per data
//! kind. Live subscriptions deliver the full document set on every change,
//! never deltas.

mod memory;
mod subscriptions;

pub use memory::InMemoryRemote;

use async_trait::async_trait;
use fitsync_engine::{DataKind, Document};
use futures::Stream;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

/// One user's sub-collection of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionRef {
    pub user_id: String,
    pub kind: DataKind,
}

impl CollectionRef {
    pub fn new(user_id: impl Into<String>, kind: DataKind) -> Self {
        Self {
            user_id: user_id.into(),
            kind,
        }
    }

    /// Document path, e.g. `users/u1/workoutLogs`.
    pub fn path(&self) -> String {
        format!("users/{}/{}", self.user_id, self.kind.collection_name())
    }
}

impl fmt::Display for CollectionRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Remote transport failures. All of them are recoverable.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("subscription closed")]
    Closed,
}

/// A single write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Delete { id: String },
    /// Insert under a store-generated id
    Insert { data: Value },
    /// Create or replace under a caller-chosen id
    Set { id: String, data: Value },
}

/// Writes committed atomically against one sub-collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delete(&mut self, id: impl Into<String>) -> &mut Self {
        self.ops.push(WriteOp::Delete { id: id.into() });
        self
    }

    pub fn insert(&mut self, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Insert { data });
        self
    }

    pub fn set(&mut self, id: impl Into<String>, data: Value) -> &mut Self {
        self.ops.push(WriteOp::Set {
            id: id.into(),
            data,
        });
        self
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// A full snapshot of a sub-collection, or a stream error.
pub type SnapshotEvent = Result<Vec<Document>, RemoteError>;

/// Live subscription to one sub-collection.
///
/// A stream of [`SnapshotEvent`]s; release it with
/// [`RemoteStore::unsubscribe`].
#[derive(Debug)]
pub struct Subscription {
    id: String,
    collection: CollectionRef,
    events: mpsc::UnboundedReceiver<SnapshotEvent>,
}

impl Subscription {
    pub fn new(
        id: impl Into<String>,
        collection: CollectionRef,
        events: mpsc::UnboundedReceiver<SnapshotEvent>,
    ) -> Self {
        Self {
            id: id.into(),
            collection,
            events,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn collection(&self) -> &CollectionRef {
        &self.collection
    }
}

impl Stream for Subscription {
    type Item = SnapshotEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.events.poll_recv(cx)
    }
}

/// Per-user document store with live subscriptions.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Read the whole sub-collection.
    async fn list(&self, collection: &CollectionRef) -> Result<Vec<Document>, RemoteError>;

    /// Insert a document under a generated id; returns the id.
    async fn add(&self, collection: &CollectionRef, data: Value) -> Result<String, RemoteError>;

    /// Create or overwrite the document with the given id.
    async fn set(&self, collection: &CollectionRef, id: &str, data: Value)
        -> Result<(), RemoteError>;

    async fn delete(&self, collection: &CollectionRef, id: &str) -> Result<(), RemoteError>;

    /// Apply all writes of a batch, or none of them.
    async fn commit(&self, collection: &CollectionRef, batch: WriteBatch)
        -> Result<(), RemoteError>;

    /// Subscribe to full snapshots. The current snapshot is delivered first.
    async fn subscribe(&self, collection: &CollectionRef) -> Result<Subscription, RemoteError>;

    fn unsubscribe(&self, subscription_id: &str);

    async fn enable_network(&self) -> Result<(), RemoteError>;

    async fn disable_network(&self) -> Result<(), RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn collection_path() {
        let coll = CollectionRef::new("u1", DataKind::ChatLogs);
        assert_eq!(coll.path(), "users/u1/chatLogs");
    }

    #[test]
    fn batch_builder() {
        let mut batch = WriteBatch::new();
        batch.delete("a").insert(json!({"x": 1})).set("3", json!({}));
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.ops()[0], WriteOp::Delete { id: "a".into() });
        assert!(WriteBatch::new().is_empty());
    }
}
