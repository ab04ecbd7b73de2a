//! Constants for Bastion
//!
//! Default values for every configuration section. Centralizing them keeps
//! `Default` impls, `from_env` overlays and tests in agreement.

// ============================================================================
// REQUEST SCHEDULER
// ============================================================================

/// Maximum simultaneously in-flight remote calls
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

/// Remote calls allowed per sliding window
pub const DEFAULT_CALLS_PER_MINUTE: u32 = 100;

/// Sliding window length in milliseconds (60 seconds)
pub const DEFAULT_CALL_WINDOW_MS: u64 = 60_000;

/// Attempts per task before a transient failure is surfaced
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// First retry delay in milliseconds, doubled per attempt
pub const DEFAULT_RETRY_BASE_MS: u64 = 1_000;

/// First quota wait in milliseconds, doubled per wait
pub const DEFAULT_QUOTA_BACKOFF_BASE_MS: u64 = 1_000;

/// Upper bound for any single backoff delay in milliseconds
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;

/// Quota waits before a call fails with `QuotaStuck`
pub const DEFAULT_MAX_QUOTA_WAITS: u32 = 5;

/// Most urgent task priority (chain polling)
pub const PRIORITY_CRITICAL: u8 = 0;

/// Claim synchronisation
pub const PRIORITY_HIGH: u8 = 1;

/// Ordinary reads
pub const PRIORITY_NORMAL: u8 = 2;

/// Prefetch and other work nobody is waiting on
pub const PRIORITY_BACKGROUND: u8 = 3;

// ============================================================================
// RESPONSE CACHE
// ============================================================================

/// Maximum cached responses kept after a sweep
pub const DEFAULT_CACHE_CAPACITY: usize = 200;

/// Cache sweep interval in seconds
pub const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;

// ============================================================================
// CLAIMS
// ============================================================================

/// Claim expiry sweep interval in seconds
pub const DEFAULT_CLAIM_SWEEP_INTERVAL_SECS: u64 = 30;

/// Attack claim lifetime in seconds
pub const DEFAULT_HIT_TTL_SECS: u64 = 120;

/// Assist claim lifetime in seconds
pub const DEFAULT_ASSIST_TTL_SECS: u64 = 120;

/// Retaliation claim lifetime in seconds
pub const DEFAULT_RETAL_TTL_SECS: u64 = 60;

/// Med-deal lifetime in seconds (1 hour)
pub const DEFAULT_MED_TTL_SECS: u64 = 3_600;

/// Simultaneous active claims per actor in cooperative mode
pub const DEFAULT_COOPERATIVE_QUOTA: u32 = 2;

/// Simultaneous active claims per actor in coordinated mode
pub const DEFAULT_COORDINATED_QUOTA: u32 = 1;

// ============================================================================
// SYNC
// ============================================================================

/// Sync period while the user is active, in seconds
pub const DEFAULT_SYNC_ACTIVE_INTERVAL_SECS: u64 = 15;

/// Sync period once the user has gone idle, in seconds
pub const DEFAULT_SYNC_IDLE_INTERVAL_SECS: u64 = 60;

/// Inactivity after which the idle period applies, in seconds (5 minutes)
pub const DEFAULT_SYNC_IDLE_AFTER_SECS: u64 = 300;

// ============================================================================
// CHAIN
// ============================================================================

/// Chain poll interval in seconds
pub const DEFAULT_CHAIN_POLL_INTERVAL_SECS: u64 = 10;

/// Request key used to read the chain
pub const DEFAULT_CHAIN_REQUEST_KEY: &str = "faction/?selections=chain";

/// Bonus milestones, ascending
pub const DEFAULT_BONUS_MILESTONES: [u64; 13] = [
    10, 25, 50, 100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000,
];

/// Upcoming milestones reported on a chain snapshot
pub const UPCOMING_MILESTONE_COUNT: usize = 3;

/// Timeout at or below which the chain is about to break, in seconds
pub const DEFAULT_CRITICAL_TIMEOUT_SECS: u64 = 60;

/// Timeout at or below which the chain needs a hit soon, in seconds
pub const DEFAULT_WARNING_TIMEOUT_SECS: u64 = 120;

/// Chain length considered expensive to lose
pub const DEFAULT_HIGH_CHAIN_COUNT: u64 = 100;

/// Timeout considered short for the compound risk factors, in seconds
pub const DEFAULT_SHORT_TIMEOUT_SECS: u64 = 150;

/// Hits remaining to a milestone considered "close"
pub const DEFAULT_MILESTONE_PROXIMITY: u64 = 10;

// ============================================================================
// RISK WEIGHTS AND CUT POINTS
// ============================================================================

pub const RISK_WEIGHT_CRITICAL_TIMEOUT: u32 = 50;
pub const RISK_WEIGHT_WARNING_TIMEOUT: u32 = 30;
pub const RISK_WEIGHT_HIGH_CHAIN_SHORT_TIMEOUT: u32 = 15;
pub const RISK_WEIGHT_NEAR_MILESTONE: u32 = 20;

pub const RISK_CUT_CRITICAL: u32 = 50;
pub const RISK_CUT_WARNING: u32 = 30;
pub const RISK_CUT_ELEVATED: u32 = 15;

// ============================================================================
// REMOTE ENDPOINTS
// ============================================================================

/// Default base URL of the remote read API
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";

/// Default base URL of the claim authority
pub const DEFAULT_AUTHORITY_BASE_URL: &str = "http://localhost:8081";

/// HTTP request timeout in milliseconds
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Buffered events per subscriber before it lags
pub const DEFAULT_EVENT_CAPACITY: usize = 1_024;
