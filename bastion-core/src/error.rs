//! Error types for Bastion operations

use thiserror::Error;

/// What a single remote call reported.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Network error: {reason}")]
    Network { reason: String },

    #[error("Rate limited by remote: {message}")]
    RateLimited { message: String },

    #[error("Credential rejected by remote: {message}")]
    CredentialInvalid { message: String },

    #[error("Access denied by remote: {message}")]
    AccessDenied { message: String },

    #[error("Remote error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("Invalid response: {reason}")]
    Decode { reason: String },
}

impl RemoteError {
    /// Failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, RemoteError::Network { .. } | RemoteError::RateLimited { .. })
    }

    /// Failures that poison every further call until re-authorization.
    pub fn is_credential_failure(&self) -> bool {
        matches!(self, RemoteError::CredentialInvalid { .. })
    }

    /// Failures that mean the credential cannot read the resource.
    pub fn is_permission_failure(&self) -> bool {
        matches!(
            self,
            RemoteError::CredentialInvalid { .. } | RemoteError::AccessDenied { .. }
        )
    }
}

/// Scheduler-level failures surfaced to callers of `submit`/`fetch`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    #[error("Request {key} failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        key: String,
        attempts: u32,
        last: RemoteError,
    },

    #[error("Credential invalid, re-authorize before issuing further requests: {reason}")]
    CredentialInvalid { reason: String },

    #[error("Call quota saturated for {key} after {waits} waits, wait and retry")]
    QuotaStuck { key: String, waits: u32 },

    #[error("Request {key} failed: {source}")]
    Remote { key: String, source: RemoteError },

    #[error("Request {key} aborted: {reason}")]
    Aborted { key: String, reason: String },

    #[error("Request dropped before completion")]
    Dropped,
}

impl FetchError {
    /// True when the failure means the credential cannot read the resource.
    pub fn is_permission_failure(&self) -> bool {
        match self {
            FetchError::CredentialInvalid { .. } => true,
            FetchError::Remote { source, .. } => source.is_permission_failure(),
            FetchError::RetriesExhausted { last, .. } => last.is_permission_failure(),
            _ => false,
        }
    }
}

/// Durable store errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage quota exceeded while writing {key}")]
    QuotaExceeded { key: String },

    #[error("Storage backend failure: {reason}")]
    Backend { reason: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl StorageError {
    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, StorageError::QuotaExceeded { .. })
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("Failed to parse config TOML: {reason}")]
    Parse { reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, value: impl ToString, reason: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Claim programming errors. Conflicts are outcomes, not errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClaimError {
    #[error("Required id missing: {field}")]
    MissingId { field: String },
}

/// Sync bridge errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Sync request failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Invalid bundle from authority: {reason}")]
    Decode { reason: String },
}

/// Master error type for all Bastion errors.
#[derive(Debug, Clone, Error)]
pub enum BastionError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Claim error: {0}")]
    Claim(#[from] ClaimError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),
}

/// Result type alias for Bastion operations.
pub type BastionResult<T> = Result<T, BastionError>;

// =============================================================================
// TESTS
// =============================================================================
