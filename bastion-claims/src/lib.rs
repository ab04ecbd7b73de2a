//! Bastion Claims
//!
//! Time-bounded exclusive claims ("dibs", med deals, assists, retals) over
//! shared targets.
//!
//! - [`ClaimStore`] holds every claim ever seen, an index of the active ones
//!   per `(target, kind)` and a min-heap of expiry instants.
//! - [`ConflictArbiter`] is the pure decision logic: given the store and the
//!   [`WarConfig`](bastion_core::WarConfig), accept or reject a mutation.
//! - [`ClaimArbiter`] applies accepted mutations, publishes lifecycle events
//!   and queues them in the outbox for the sync bridge.
//!
//! Claims are never deleted, only transitioned out of `active`.

mod arbiter;
mod board;
mod outbox;
mod service;
mod status;
mod store;
mod sweep;

pub use arbiter::{ConflictArbiter, CreateDecision, TransitionDecision};
pub use board::ClaimBoard;
pub use outbox::{ClaimMutation, Outbox};
pub use service::ClaimArbiter;
pub use status::{ObservedStatus, ObservedStatusParseError};
pub use store::ClaimStore;
pub use sweep::{claim_sweep_task, ClaimSweepMetrics, ClaimSweepSnapshot};
