//! Bastion Sync
//!
//! Reconciles the local claim board with a remote authority.
//!
//! Each tick pushes queued local mutations, then pulls a [`Bundle`] holding
//! only the collections that changed since the last [`SinceMarks`]. Every
//! collection present in the bundle replaces local state wholesale: the
//! authority always wins. All calls go through the request scheduler.

mod activity;
mod authority;
mod bridge;
mod bundle;

pub use activity::ActivityTracker;
pub use authority::{HttpAuthority, RemoteAuthority};
pub use bridge::{SyncBridge, SyncMetrics, SyncReport, SyncSnapshot};
pub use bundle::{Bundle, SinceMarks};
