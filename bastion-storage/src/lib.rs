//! Bastion Storage
//!
//! The durable store is an opaque keyed `get/set/delete/list` store holding
//! JSON values. Two backends are provided:
//!
//! - [`InMemoryDurableStore`]: process-local, optionally byte-budgeted so
//!   quota failures can be exercised.
//! - [`LmdbDurableStore`]: memory-mapped LMDB via `heed`; a full map is
//!   reported as [`StorageError::QuotaExceeded`].
//!
//! [`ResponseCache`] sits on top: a TTL cache of remote responses that is
//! mirrored into the durable store and degrades to memory-only on failure.

pub mod cache;
mod lmdb;
pub mod records;
mod store;

pub use bastion_core::StorageError;
pub use cache::{CacheEntry, CacheStats, PersistOutcome, ResponseCache, SweepReport};
pub use lmdb::LmdbDurableStore;
pub use records::{load_record, save_record};
pub use store::{DurableStore, InMemoryDurableStore};
