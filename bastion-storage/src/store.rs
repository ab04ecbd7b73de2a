//! Durable store trait and the in-memory backend.

use async_trait::async_trait;
use bastion_core::StorageError;
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

/// Keyed durable store. Latest value per key wins.
///
/// Implementations must be thread-safe. A write that does not fit reports
/// [`StorageError::QuotaExceeded`] and leaves the previous value in place.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StorageError>;

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), StorageError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StorageError>;

    /// Keys starting with `prefix`, in lexicographic order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// In-memory store, optionally limited to a byte budget.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    records: RwLock<BTreeMap<String, Vec<u8>>>,
    byte_budget: Option<usize>,
    unavailable: AtomicBool,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject writes that would push `sum(key + encoded value)` past `bytes`.
    pub fn with_byte_budget(bytes: usize) -> Self {
        Self {
            byte_budget: Some(bytes),
            ..Self::default()
        }
    }

    /// Make every write fail with a backend error until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn bytes_used(&self) -> usize {
        self.records
            .read()
            .map(|records| records.iter().map(|(k, v)| k.len() + v.len()).sum())
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get(&self, key: &str) -> Result<Option<JsonValue>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        records
            .get(key)
            .map(|bytes| {
                serde_json::from_slice(bytes).map_err(|e| StorageError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                })
            })
            .transpose()
    }

    async fn set(&self, key: &str, value: JsonValue) -> Result<(), StorageError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StorageError::Backend {
                reason: "store unavailable".to_string(),
            });
        }
        let bytes = serde_json::to_vec(&value).map_err(|e| StorageError::Serialization {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        if let Some(budget) = self.byte_budget {
            let used: usize = records
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum();
            if used + key.len() + bytes.len() > budget {
                return Err(StorageError::QuotaExceeded {
                    key: key.to_string(),
                });
            }
        }
        records.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.remove(key).is_some())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect())
    }
}
