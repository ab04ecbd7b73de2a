//! Runtime errors.

use bastion_core::{ConfigError, RemoteError, StorageError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Remote client error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Telemetry error: {reason}")]
    Telemetry { reason: String },

    #[error("Failed to join background job {job}: {reason}")]
    Join { job: &'static str, reason: String },
}

pub type RuntimeResult<T> = Result<T, RuntimeError>;
