//! Response cache.
//!
//! TTL-keyed cache of remote responses, bounded by entry count and mirrored
//! into the durable store so it survives restarts.
//!
//! # Invariants
//!
//! - An entry is never returned once `now > fetched_at + ttl`.
//! - After [`ResponseCache::sweep`] the entry count is at most the configured
//!   capacity; the oldest `fetched_at` entries are evicted first.
//! - A persistence failure never breaks the in-memory cache.

mod entry;
mod response;
mod stats;

pub use entry::CacheEntry;
pub use response::{PersistOutcome, ResponseCache, SweepReport};
pub use stats::CacheStats;
