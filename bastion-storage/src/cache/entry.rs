//! Cache entries.

use bastion_core::{offset, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// A cached response, also the persisted record shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub value: JsonValue,
    pub fetched_at: Timestamp,
    pub ttl_ms: u64,
}

impl CacheEntry {
    pub fn new(key: impl Into<String>, value: JsonValue, fetched_at: Timestamp, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            value,
            fetched_at,
            ttl_ms: u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn expires_at(&self) -> Timestamp {
        offset(self.fetched_at, self.ttl())
    }

    /// Servable at `now`; the last servable instant is `fetched_at + ttl`.
    pub fn is_live(&self, now: Timestamp) -> bool {
        now <= self.expires_at()
    }
}
