//! Bastion Core - Shared Types
//!
//! Data structures, configuration records and the error taxonomy shared by
//! every other Bastion crate. Behavior lives in the crates that own it; the
//! only logic here is what a type needs to keep its own invariants (claim
//! status transitions, milestone distances, config validation).

pub mod chain;
pub mod claim;
pub mod clock;
pub mod config;
pub mod constants;
pub mod error;
pub mod identity;
pub mod note;
pub mod risk;

pub use chain::{upcoming_milestones, BonusMilestone, ChainReading, ChainState};
pub use claim::{
    Claim, ClaimKind, ClaimKindParseError, ClaimOutcome, ClaimRejection, ClaimStatus, CreateClaim,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    ApiConfig, AuthorityConfig, BastionConfig, CacheConfig, ChainConfig, ClaimSweepConfig,
    KindTtls, RiskThresholds, SchedulerConfig, SyncConfig, WarConfig, WarMode,
};
pub use error::{
    BastionError, BastionResult, ClaimError, ConfigError, FetchError, RemoteError, StorageError,
    SyncError,
};
pub use identity::{new_claim_id, offset, ActorId, ClaimId, DurationMs, TargetId, Timestamp};
pub use note::TargetNote;
pub use risk::{RiskAssessment, RiskFactor, RiskLevel};
