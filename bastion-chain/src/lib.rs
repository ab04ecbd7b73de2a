//! Bastion Chain
//!
//! Watches the chain resource and classifies how close it is to lapsing.
//!
//! - [`assess`] is the pure scorer: `(ChainState, RiskThresholds) -> RiskAssessment`.
//! - [`RiskTracker`] remembers the last level and publishes tick, level-change
//!   and warning events.
//! - [`ChainMonitor`] polls through the request scheduler at critical
//!   priority and owns the single [`ChainState`](bastion_core::ChainState).

mod monitor;
mod poll;
mod scorer;
mod tracker;

pub use monitor::ChainMonitor;
pub use poll::{chain_poll_task, ChainPollMetrics, ChainPollSnapshot};
pub use scorer::{advisory, assess};
pub use tracker::RiskTracker;
