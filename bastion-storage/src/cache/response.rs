//! The TTL response cache.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use bastion_core::{CacheConfig, Clock, StorageError};
use bastion_events::{BastionEvent, EventBus};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::entry::CacheEntry;
use super::stats::{CacheCounters, CacheStats};
use crate::records::{cache_record_key, CACHE_PREFIX};
use crate::store::DurableStore;

/// What happened to the durable copy of a `put`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// TTL of zero, nothing cached.
    NotCached,
    /// No durable store configured.
    MemoryOnly,
    Persisted,
    /// Quota was hit; the cache was cleared and the retry succeeded.
    PersistedAfterClear,
    /// The durable write failed; the entry lives in memory only.
    Failed,
}

/// Result of one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub expired: usize,
    pub evicted: usize,
    pub remaining: usize,
}

pub struct ResponseCache {
    config: CacheConfig,
    entries: RwLock<HashMap<String, CacheEntry>>,
    counters: CacheCounters,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn DurableStore>>,
    events: Option<EventBus>,
}

impl ResponseCache {
    pub fn new(config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            counters: CacheCounters::default(),
            clock,
            store: None,
            events: None,
        }
    }

    /// Mirror every mutation into `store`.
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Publish `StorageDegraded` warnings on `events`.
    pub fn with_events(mut self, events: EventBus) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn entries(&self) -> RwLockReadGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn entries_mut(&self) -> RwLockWriteGuard<'_, HashMap<String, CacheEntry>> {
        self.entries.write().unwrap_or_else(PoisonError::into_inner)
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// The live value for `key`. Expired entries are misses even before
    /// a sweep removes them.
    pub fn get(&self, key: &str) -> Option<JsonValue> {
        let now = self.clock.now();
        let hit = self
            .entries()
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone());

        let counter = if hit.is_some() {
            &self.counters.hits
        } else {
            &self.counters.misses
        };
        CacheCounters::bump(counter, 1);
        hit
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.len())
    }

    // ========================================================================
    // WRITES
    // ========================================================================

    /// Cache `value` under `key` for `ttl`. A zero TTL caches nothing.
    pub async fn put(&self, key: &str, value: JsonValue, ttl: Duration) -> PersistOutcome {
        if ttl.is_zero() {
            return PersistOutcome::NotCached;
        }
        let entry = CacheEntry::new(key, value, self.clock.now(), ttl);
        self.entries_mut().insert(key.to_string(), entry.clone());

        let evicted = self.evict_over_capacity();
        let outcome = self.persist(&entry).await;
        self.forget_persisted(&evicted).await;
        outcome
    }

    /// Drop `key` from memory and the durable store.
    pub async fn invalidate(&self, key: &str) -> bool {
        let removed = self.entries_mut().remove(key).is_some();
        self.forget_persisted(&[key.to_string()]).await;
        removed
    }

    /// Drop everything. Returns the number of in-memory entries removed.
    pub async fn clear(&self) -> usize {
        let removed = {
            let mut entries = self.entries_mut();
            let n = entries.len();
            entries.clear();
            n
        };
        if let Some(store) = &self.store {
            if let Err(e) = clear_persisted(store.as_ref(), None).await {
                warn!(error = %e, "Failed to clear persisted response cache");
            }
        }
        removed
    }

    async fn persist(&self, entry: &CacheEntry) -> PersistOutcome {
        let Some(store) = &self.store else {
            return PersistOutcome::MemoryOnly;
        };
        let record_key = cache_record_key(&entry.key);
        let record = match serde_json::to_value(entry) {
            Ok(record) => record,
            Err(e) => {
                self.degrade(format!("Failed to encode cached response {}: {}", entry.key, e));
                return PersistOutcome::Failed;
            }
        };

        match store.set(&record_key, record.clone()).await {
            Ok(()) => PersistOutcome::Persisted,
            Err(StorageError::QuotaExceeded { .. }) => {
                warn!(key = %entry.key, "Storage quota exceeded, clearing response cache");
                self.entries_mut().retain(|k, _| k == &entry.key);
                if let Err(e) = clear_persisted(store.as_ref(), Some(&record_key)).await {
                    warn!(error = %e, "Failed to clear persisted response cache");
                }
                match store.set(&record_key, record).await {
                    Ok(()) => {
                        self.degrade(
                            "Storage quota exceeded, cached responses were cleared to recover space"
                                .to_string(),
                        );
                        PersistOutcome::PersistedAfterClear
                    }
                    Err(e) => {
                        self.degrade(format!(
                            "Storage quota exceeded and clearing the cache did not help: {}",
                            e
                        ));
                        PersistOutcome::Failed
                    }
                }
            }
            Err(e) => {
                self.degrade(format!("Failed to persist cached response {}: {}", entry.key, e));
                PersistOutcome::Failed
            }
        }
    }

    async fn forget_persisted(&self, keys: &[String]) {
        let Some(store) = &self.store else {
            return;
        };
        for key in keys {
            if let Err(e) = store.delete(&cache_record_key(key)).await {
                debug!(key = %key, error = %e, "Failed to delete persisted cache entry");
            }
        }
    }

    fn degrade(&self, message: String) {
        CacheCounters::bump(&self.counters.persist_failures, 1);
        warn!(message = %message, "Response cache running without durable copy");
        if let Some(events) = &self.events {
            events.publish(BastionEvent::StorageDegraded { message });
        }
    }

    // ========================================================================
    // EVICTION
    // ========================================================================

    /// Remove every entry past its TTL. Returns the removed keys.
    pub fn evict_expired(&self) -> Vec<String> {
        let now = self.clock.now();
        let mut entries = self.entries_mut();
        let expired: Vec<String> = entries
            .values()
            .filter(|entry| !entry.is_live(now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in &expired {
            entries.remove(key);
        }
        CacheCounters::bump(&self.counters.expirations, expired.len() as u64);
        expired
    }

    /// Remove the oldest entries until the count is back at capacity.
    pub fn evict_over_capacity(&self) -> Vec<String> {
        let mut entries = self.entries_mut();
        let excess = entries.len().saturating_sub(self.config.capacity);
        if excess == 0 {
            return Vec::new();
        }
        let mut by_age: Vec<(_, String)> = entries
            .values()
            .map(|entry| (entry.fetched_at, entry.key.clone()))
            .collect();
        by_age.sort();
        let evicted: Vec<String> = by_age.into_iter().take(excess).map(|(_, key)| key).collect();
        for key in &evicted {
            entries.remove(key);
        }
        CacheCounters::bump(&self.counters.evictions, evicted.len() as u64);
        evicted
    }

    /// Expire, then trim to capacity, then drop the durable copies.
    pub async fn sweep(&self) -> SweepReport {
        let expired = self.evict_expired();
        let evicted = self.evict_over_capacity();
        self.forget_persisted(&expired).await;
        self.forget_persisted(&evicted).await;
        let report = SweepReport {
            expired: expired.len(),
            evicted: evicted.len(),
            remaining: self.len(),
        };
        debug!(
            expired = report.expired,
            evicted = report.evicted,
            remaining = report.remaining,
            "Response cache swept"
        );
        report
    }

    /// Load persisted entries, discarding (and deleting) expired ones.
    pub async fn restore(&self) -> Result<usize, StorageError> {
        let Some(store) = &self.store else {
            return Ok(0);
        };
        let now = self.clock.now();
        let mut restored: usize = 0;
        for record_key in store.list(CACHE_PREFIX).await? {
            let entry = match store.get(&record_key).await? {
                Some(value) => serde_json::from_value::<CacheEntry>(value).ok(),
                None => None,
            };
            match entry {
                Some(entry) if entry.is_live(now) => {
                    self.entries_mut().insert(entry.key.clone(), entry);
                    restored += 1;
                }
                _ => {
                    store.delete(&record_key).await?;
                }
            }
        }
        let evicted = self.evict_over_capacity();
        self.forget_persisted(&evicted).await;
        info!(restored, evicted = evicted.len(), "Response cache restored");
        Ok(restored.saturating_sub(evicted.len()))
    }
}

async fn clear_persisted(store: &dyn DurableStore, keep: Option<&str>) -> Result<u64, StorageError> {
    let mut deleted = 0;
    for key in store.list(CACHE_PREFIX).await? {
        if Some(key.as_str()) == keep {
            continue;
        }
        if store.delete(&key).await? {
            deleted += 1;
        }
    }
    Ok(deleted)
}

impl std::fmt::Debug for ResponseCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseCache")
            .field("capacity", &self.config.capacity)
            .field("entries", &self.len())
            .field("persistent", &self.store.is_some())
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryDurableStore;
    use bastion_core::ManualClock;
    use serde_json::json;

    fn cache_with(capacity: usize) -> (ResponseCache, ManualClock) {
        let clock = ManualClock::starting_now();
        let cache = ResponseCache::new(CacheConfig::new(capacity), Arc::new(clock.clone()));
        (cache, clock)
    }

    fn persistent_cache(
        capacity: usize,
        store: Arc<InMemoryDurableStore>,
    ) -> (ResponseCache, ManualClock, EventBus) {
        let clock = ManualClock::starting_now();
        let events = EventBus::new(16);
        let cache = ResponseCache::new(CacheConfig::new(capacity), Arc::new(clock.clone()))
            .with_store(store)
            .with_events(events.clone());
        (cache, clock, events)
    }

    #[tokio::test]
    async fn test_get_within_ttl() {
        let (cache, clock) = cache_with(10);
        assert_eq!(
            cache.put("user/1", json!({"level": 10}), Duration::from_secs(30)).await,
            PersistOutcome::MemoryOnly
        );
        clock.advance(Duration::from_secs(30));
        assert_eq!(cache.get("user/1"), Some(json!({"level": 10})));
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.entry_count, 1);
    }

    #[tokio::test]
    async fn test_never_served_past_ttl() {
        let (cache, clock) = cache_with(10);
        cache.put("user/1", json!(1), Duration::from_secs(30)).await;
        clock.advance(Duration::from_millis(30_001));
        assert_eq!(cache.get("user/1"), None);
        assert_eq!(cache.stats().misses, 1);
        // Still held until swept.
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.evict_expired(), vec!["user/1".to_string()]);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_is_not_cached() {
        let (cache, _clock) = cache_with(10);
        assert_eq!(cache.put("k", json!(1), Duration::ZERO).await, PersistOutcome::NotCached);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_capacity_evicts_oldest_first() {
        let (cache, clock) = cache_with(3);
        for key in ["a", "b", "c", "d", "e"] {
            cache.put(key, json!(key), Duration::from_secs(600)).await;
            clock.advance(Duration::from_secs(1));
        }
        assert_eq!(cache.len(), 3);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert!(cache.get("e").is_some());
        assert_eq!(cache.stats().evictions, 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_expired_and_persisted_copies() {
        let store = Arc::new(InMemoryDurableStore::new());
        let (cache, clock, _events) = persistent_cache(10, store.clone());
        cache.put("short", json!(1), Duration::from_secs(5)).await;
        cache.put("long", json!(2), Duration::from_secs(500)).await;
        assert_eq!(store.list(CACHE_PREFIX).await.expect("list").len(), 2);

        clock.advance(Duration::from_secs(6));
        let report = cache.sweep().await;
        assert_eq!(report, SweepReport { expired: 1, evicted: 0, remaining: 1 });
        assert_eq!(
            store.list(CACHE_PREFIX).await.expect("list"),
            vec!["cache/long".to_string()]
        );
    }

    #[tokio::test]
    async fn test_restore_survives_restart() {
        let store = Arc::new(InMemoryDurableStore::new());
        let clock = ManualClock::starting_now();
        {
            let cache = ResponseCache::new(CacheConfig::new(10), Arc::new(clock.clone()))
                .with_store(store.clone());
            cache.put("fresh", json!("yes"), Duration::from_secs(120)).await;
            cache.put("stale", json!("no"), Duration::from_secs(10)).await;
        }
        clock.advance(Duration::from_secs(60));

        let cache = ResponseCache::new(CacheConfig::new(10), Arc::new(clock.clone()))
            .with_store(store.clone());
        assert_eq!(cache.restore().await.expect("restore"), 1);
        assert_eq!(cache.get("fresh"), Some(json!("yes")));
        assert!(cache.get("stale").is_none());
        assert!(store.get("cache/stale").await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_restore_into_smaller_capacity_counts_survivors() {
        let store = Arc::new(InMemoryDurableStore::new());
        let clock = ManualClock::starting_now();
        {
            let cache = ResponseCache::new(CacheConfig::new(10), Arc::new(clock.clone()))
                .with_store(store.clone());
            for key in ["a", "b", "c", "d"] {
                cache.put(key, json!(key), Duration::from_secs(600)).await;
                clock.advance(Duration::from_secs(1));
            }
        }

        let cache = ResponseCache::new(CacheConfig::new(2), Arc::new(clock.clone()))
            .with_store(store.clone());
        assert_eq!(cache.restore().await.expect("restore"), 2);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("d"), Some(json!("d")));
    }

    #[tokio::test]
    async fn test_quota_clears_cache_and_retries_once() {
        // Each record is roughly 390 bytes: two fit, the third does not.
        let store = Arc::new(InMemoryDurableStore::with_byte_budget(1_000));
        let (cache, _clock, events) = persistent_cache(10, store.clone());
        let mut rx = events.subscribe();
        let payload = json!("x".repeat(300));

        assert_eq!(cache.put("a", payload.clone(), Duration::from_secs(60)).await, PersistOutcome::Persisted);
        assert_eq!(cache.put("b", payload.clone(), Duration::from_secs(60)).await, PersistOutcome::Persisted);
        assert_eq!(
            cache.put("c", payload.clone(), Duration::from_secs(60)).await,
            PersistOutcome::PersistedAfterClear
        );

        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_none());
        assert_eq!(cache.get("c"), Some(payload));
        assert_eq!(
            store.list(CACHE_PREFIX).await.expect("list"),
            vec!["cache/c".to_string()]
        );
        let event = rx.recv().await.expect("warning event");
        assert_eq!(event.event_type(), "StorageDegraded");
    }

    #[tokio::test]
    async fn test_quota_failure_keeps_memory_copy() {
        let store = Arc::new(InMemoryDurableStore::with_byte_budget(64));
        let (cache, _clock, events) = persistent_cache(10, store.clone());
        let mut rx = events.subscribe();
        let payload = json!("y".repeat(500));

        assert_eq!(
            cache.put("big", payload.clone(), Duration::from_secs(60)).await,
            PersistOutcome::Failed
        );
        assert_eq!(cache.get("big"), Some(payload));
        assert!(store.is_empty());
        assert!(matches!(
            rx.recv().await,
            Ok(BastionEvent::StorageDegraded { .. })
        ));
        assert_eq!(cache.stats().persist_failures, 1);
    }

    #[tokio::test]
    async fn test_backend_failure_does_not_clear() {
        let store = Arc::new(InMemoryDurableStore::new());
        let (cache, _clock, _events) = persistent_cache(10, store.clone());
        cache.put("a", json!(1), Duration::from_secs(60)).await;
        store.set_unavailable(true);
        assert_eq!(cache.put("b", json!(2), Duration::from_secs(60)).await, PersistOutcome::Failed);
        assert_eq!(cache.get("a"), Some(json!(1)));
        assert_eq!(cache.get("b"), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let store = Arc::new(InMemoryDurableStore::new());
        let (cache, _clock, _events) = persistent_cache(10, store.clone());
        cache.put("a", json!(1), Duration::from_secs(60)).await;
        cache.put("b", json!(2), Duration::from_secs(60)).await;
        assert!(cache.invalidate("a").await);
        assert!(!cache.invalidate("a").await);
        assert_eq!(cache.clear().await, 1);
        assert!(store.is_empty());
    }
}
