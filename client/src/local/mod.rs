//! Local Store: durable per-user key-value storage on the device.
//!
//! Values are the structured text produced by the engine's local codec.
//! The store knows nothing about record kinds; [`load_collection`] and
//! [`save_collection`] bridge the two.

mod memory;
mod sqlite;

pub use memory::MemoryLocalStore;
pub use sqlite::SqliteLocalStore;

use async_trait::async_trait;
use fitsync_engine::{DataKind, SyncRecord};
use std::fmt;

/// Key of one user's collection of one kind: `@<email>:<suffix>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorageKey(String);

impl StorageKey {
    pub fn new(email: &str, kind: DataKind) -> Self {
        Self(format!("@{}:{}", email, kind.storage_suffix()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Local storage failures.
#[derive(Debug, thiserror::Error)]
pub enum LocalStoreError {
    #[error("local storage exhausted: {needed} bytes needed, {available} available")]
    Exhausted { needed: usize, available: usize },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
}

/// Asynchronous key-value storage owned by the active session.
#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Stored text, or `None` when the key is absent.
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, LocalStoreError>;

    async fn set(&self, key: &StorageKey, value: &str) -> Result<(), LocalStoreError>;

    async fn remove(&self, key: &StorageKey) -> Result<(), LocalStoreError>;
}

/// Read a collection; absent, unreadable or malformed content yields an
/// empty collection.
pub async fn load_collection<R: SyncRecord>(store: &dyn LocalStore, key: &StorageKey) -> Vec<R> {
    let text = match store.get(key).await {
        Ok(Some(text)) => text,
        Ok(None) => return Vec::new(),
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Local read failed, starting empty");
            return Vec::new();
        }
    };

    match R::decode_local(&text) {
        Ok(records) => records,
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Malformed local collection, starting empty");
            Vec::new()
        }
    }
}

/// Encode and write a whole collection.
pub async fn save_collection<R: SyncRecord>(
    store: &dyn LocalStore,
    key: &StorageKey,
    records: &[R],
) -> crate::error::Result<()> {
    let text = R::encode_local(records)?;
    store.set(key, &text).await?;
    Ok(())
}
