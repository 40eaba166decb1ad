//! In-process Local Store.

use super::{LocalStore, LocalStoreError, StorageKey};
use async_trait::async_trait;
use dashmap::DashMap;

/// Local Store backed by a concurrent map.
///
/// An optional byte quota makes writes fail the way a full device does.
#[derive(Debug, Default)]
pub struct MemoryLocalStore {
    entries: DashMap<String, String>,
    quota: Option<usize>,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects writes once the total value size would exceed `bytes`.
    pub fn with_quota(bytes: usize) -> Self {
        Self {
            entries: DashMap::new(),
            quota: Some(bytes),
        }
    }

    /// Total bytes held by values.
    pub fn used_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.value().len()).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, key: &StorageKey) -> Result<Option<String>, LocalStoreError> {
        Ok(self.entries.get(key.as_str()).map(|v| v.value().clone()))
    }

    async fn set(&self, key: &StorageKey, value: &str) -> Result<(), LocalStoreError> {
        if let Some(quota) = self.quota {
            let others: usize = self
                .entries
                .iter()
                .filter(|e| e.key() != key.as_str())
                .map(|e| e.value().len())
                .sum();
            let available = quota.saturating_sub(others);
            if value.len() > available {
                return Err(LocalStoreError::Exhausted {
                    needed: value.len(),
                    available,
                });
            }
        }
        self.entries
            .insert(key.as_str().to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &StorageKey) -> Result<(), LocalStoreError> {
        self.entries.remove(key.as_str());
        Ok(())
    }
}
