//! Bastion Runtime
//!
//! Builds one [`BastionContext`] per process and runs its background jobs:
//! cache sweep, claim expiry sweep, the sync loop, chain polling and the
//! event relay. Also holds configuration loading and tracing setup for the
//! `bastion` binary.

pub mod config;
pub mod context;
pub mod error;
pub mod jobs;
pub mod telemetry;

pub use config::{config_path, load_config};
pub use context::{BastionContext, JobHandles, JobMetrics, RestoreReport};
pub use error::{RuntimeError, RuntimeResult};
pub use telemetry::{init_tracing, LogFormat};
