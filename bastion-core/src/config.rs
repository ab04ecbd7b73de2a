//! Configuration types
//!
//! Every section deserializes from TOML with `deny_unknown_fields`, falls back
//! to the constants in [`crate::constants`] for anything omitted, and can be
//! overlaid from `BASTION_*` environment variables. Durations are stored as
//! integer milliseconds or seconds and exposed as [`Duration`] accessors.

use crate::claim::ClaimKind;
use crate::constants::*;
use crate::error::ConfigError;
use crate::identity::Timestamp;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

fn env_or<T: FromStr>(key: &str, current: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(current)
}

fn require_positive(field: &str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::invalid(field, value, "must be > 0"));
    }
    Ok(())
}

fn require_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(field, value, "must not be empty"));
    }
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ConfigError::invalid(field, value, "must be an http(s) url"));
    }
    Ok(())
}

// ============================================================================
// REQUEST SCHEDULER
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SchedulerConfig {
    pub max_concurrency: usize,
    pub calls_per_minute: u32,
    pub window_ms: u64,
    pub max_attempts: u32,
    pub retry_base_ms: u64,
    pub quota_backoff_base_ms: u64,
    pub max_backoff_ms: u64,
    pub max_quota_waits: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            calls_per_minute: DEFAULT_CALLS_PER_MINUTE,
            window_ms: DEFAULT_CALL_WINDOW_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_base_ms: DEFAULT_RETRY_BASE_MS,
            quota_backoff_base_ms: DEFAULT_QUOTA_BACKOFF_BASE_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            max_quota_waits: DEFAULT_MAX_QUOTA_WAITS,
        }
    }
}

impl SchedulerConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    pub fn retry_base(&self) -> Duration {
        Duration::from_millis(self.retry_base_ms)
    }

    pub fn quota_backoff_base(&self) -> Duration {
        Duration::from_millis(self.quota_backoff_base_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    /// Overlay `BASTION_SCHEDULER_*` environment variables.
    ///
    /// # Environment Variables
    /// - `BASTION_SCHEDULER_MAX_CONCURRENCY` (default: 3)
    /// - `BASTION_SCHEDULER_CALLS_PER_MINUTE` (default: 100)
    /// - `BASTION_SCHEDULER_MAX_ATTEMPTS` (default: 3)
    /// - `BASTION_SCHEDULER_MAX_QUOTA_WAITS` (default: 5)
    pub fn apply_env(&mut self) {
        self.max_concurrency = env_or("BASTION_SCHEDULER_MAX_CONCURRENCY", self.max_concurrency);
        self.calls_per_minute = env_or("BASTION_SCHEDULER_CALLS_PER_MINUTE", self.calls_per_minute);
        self.max_attempts = env_or("BASTION_SCHEDULER_MAX_ATTEMPTS", self.max_attempts);
        self.max_quota_waits = env_or("BASTION_SCHEDULER_MAX_QUOTA_WAITS", self.max_quota_waits);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("scheduler.max_concurrency", self.max_concurrency as u64)?;
        require_positive("scheduler.calls_per_minute", u64::from(self.calls_per_minute))?;
        require_positive("scheduler.window_ms", self.window_ms)?;
        require_positive("scheduler.max_attempts", u64::from(self.max_attempts))?;
        if self.max_backoff_ms < self.retry_base_ms.max(self.quota_backoff_base_ms) {
            return Err(ConfigError::invalid(
                "scheduler.max_backoff_ms",
                self.max_backoff_ms,
                "must be >= the backoff bases",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// RESPONSE CACHE
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    pub capacity: usize,
    pub sweep_interval_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            sweep_interval_secs: DEFAULT_CACHE_SWEEP_INTERVAL_SECS,
        }
    }
}

impl CacheConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn apply_env(&mut self) {
        self.capacity = env_or("BASTION_CACHE_CAPACITY", self.capacity);
        self.sweep_interval_secs = env_or("BASTION_CACHE_SWEEP_INTERVAL_SECS", self.sweep_interval_secs);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("cache.capacity", self.capacity as u64)?;
        require_positive("cache.sweep_interval_secs", self.sweep_interval_secs)
    }
}

// ============================================================================
// CLAIM SWEEP
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClaimSweepConfig {
    pub interval_secs: u64,
}

impl Default for ClaimSweepConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_CLAIM_SWEEP_INTERVAL_SECS,
        }
    }
}

impl ClaimSweepConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("claims.interval_secs", self.interval_secs)
    }
}

// ============================================================================
// SYNC
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SyncConfig {
    pub active_interval_secs: u64,
    pub idle_interval_secs: u64,
    pub idle_after_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            active_interval_secs: DEFAULT_SYNC_ACTIVE_INTERVAL_SECS,
            idle_interval_secs: DEFAULT_SYNC_IDLE_INTERVAL_SECS,
            idle_after_secs: DEFAULT_SYNC_IDLE_AFTER_SECS,
        }
    }
}

impl SyncConfig {
    pub fn active_interval(&self) -> Duration {
        Duration::from_secs(self.active_interval_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_secs(self.idle_interval_secs)
    }

    pub fn idle_after(&self) -> Duration {
        Duration::from_secs(self.idle_after_secs)
    }

    pub fn apply_env(&mut self) {
        self.active_interval_secs = env_or("BASTION_SYNC_ACTIVE_INTERVAL_SECS", self.active_interval_secs);
        self.idle_interval_secs = env_or("BASTION_SYNC_IDLE_INTERVAL_SECS", self.idle_interval_secs);
        self.idle_after_secs = env_or("BASTION_SYNC_IDLE_AFTER_SECS", self.idle_after_secs);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("sync.active_interval_secs", self.active_interval_secs)?;
        require_positive("sync.idle_interval_secs", self.idle_interval_secs)?;
        if self.idle_interval_secs < self.active_interval_secs {
            return Err(ConfigError::invalid(
                "sync.idle_interval_secs",
                self.idle_interval_secs,
                "must be >= sync.active_interval_secs",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// CHAIN
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChainConfig {
    pub poll_interval_secs: u64,
    pub request_key: String,
    pub bonus_milestones: Vec<u64>,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: DEFAULT_CHAIN_POLL_INTERVAL_SECS,
            request_key: DEFAULT_CHAIN_REQUEST_KEY.to_string(),
            bonus_milestones: DEFAULT_BONUS_MILESTONES.to_vec(),
        }
    }
}

impl ChainConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn apply_env(&mut self) {
        self.poll_interval_secs = env_or("BASTION_CHAIN_POLL_INTERVAL_SECS", self.poll_interval_secs);
        if let Ok(key) = std::env::var("BASTION_CHAIN_REQUEST_KEY") {
            self.request_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_positive("chain.poll_interval_secs", self.poll_interval_secs)?;
        if self.request_key.trim().is_empty() {
            return Err(ConfigError::invalid("chain.request_key", "", "must not be empty"));
        }
        if self.bonus_milestones.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::invalid(
                "chain.bonus_milestones",
                format!("{:?}", self.bonus_milestones),
                "must be strictly ascending",
            ));
        }
        Ok(())
    }
}

// ============================================================================
// WAR CONFIG
// ============================================================================

/// How claims are arbitrated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarMode {
    /// Claims accepted, several per actor.
    Cooperative,
    /// Claims accepted, one active claim per actor.
    Coordinated,
    /// Everyone hits anything; claims are not accepted.
    FreeForAll,
    /// No war running.
    Off,
}

impl WarMode {
    /// Modes in which claims mean something.
    pub fn is_cooperative(&self) -> bool {
        matches!(self, WarMode::Cooperative | WarMode::Coordinated)
    }

    pub fn default_quota(&self) -> u32 {
        match self {
            WarMode::Cooperative => DEFAULT_COOPERATIVE_QUOTA,
            WarMode::Coordinated => DEFAULT_COORDINATED_QUOTA,
            WarMode::FreeForAll | WarMode::Off => 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WarMode::Cooperative => "cooperative",
            WarMode::Coordinated => "coordinated",
            WarMode::FreeForAll => "free_for_all",
            WarMode::Off => "off",
        }
    }
}

/// Claim lifetime per kind, in seconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct KindTtls {
    pub hit_secs: u64,
    pub med_secs: u64,
    pub assist_secs: u64,
    pub retal_secs: u64,
}

impl Default for KindTtls {
    fn default() -> Self {
        Self {
            hit_secs: DEFAULT_HIT_TTL_SECS,
            med_secs: DEFAULT_MED_TTL_SECS,
            assist_secs: DEFAULT_ASSIST_TTL_SECS,
            retal_secs: DEFAULT_RETAL_TTL_SECS,
        }
    }
}

impl KindTtls {
    pub fn uniform(secs: u64) -> Self {
        Self {
            hit_secs: secs,
            med_secs: secs,
            assist_secs: secs,
            retal_secs: secs,
        }
    }

    pub fn ttl_for(&self, kind: ClaimKind) -> Duration {
        Duration::from_secs(match kind {
            ClaimKind::Hit => self.hit_secs,
            ClaimKind::Med => self.med_secs,
            ClaimKind::Assist => self.assist_secs,
            ClaimKind::Retal => self.retal_secs,
        })
    }
}

/// Chain risk thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RiskThresholds {
    pub critical_timeout_secs: u64,
    pub warning_timeout_secs: u64,
    pub high_chain_count: u64,
    pub short_timeout_secs: u64,
    pub milestone_proximity: u64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            critical_timeout_secs: DEFAULT_CRITICAL_TIMEOUT_SECS,
            warning_timeout_secs: DEFAULT_WARNING_TIMEOUT_SECS,
            high_chain_count: DEFAULT_HIGH_CHAIN_COUNT,
            short_timeout_secs: DEFAULT_SHORT_TIMEOUT_SECS,
            milestone_proximity: DEFAULT_MILESTONE_PROXIMITY,
        }
    }
}

impl RiskThresholds {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.critical_timeout_secs >= self.warning_timeout_secs {
            return Err(ConfigError::invalid(
                "war.thresholds.critical_timeout_secs",
                self.critical_timeout_secs,
                "must be below warning_timeout_secs",
            ));
        }
        Ok(())
    }
}

/// Claim gating and alerting settings shared by the whole faction.
///
/// Mutated only through the claim arbiter's explicit update operation or a
/// sync pull; leaving the cooperative family clears every active claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WarConfig {
    pub mode: WarMode,
    pub kind_ttls: KindTtls,
    /// Overrides the mode's default simultaneous-claim quota.
    pub max_active_per_actor: Option<u32>,
    /// Overrides the mode's one-at-a-time rule.
    pub one_at_a_time: Option<bool>,
    /// Release claims when either party's status makes them meaningless.
    pub auto_release_on_status: bool,
    pub thresholds: RiskThresholds,
    pub updated_at: Option<Timestamp>,
}

impl Default for WarConfig {
    fn default() -> Self {
        Self {
            mode: WarMode::Cooperative,
            kind_ttls: KindTtls::default(),
            max_active_per_actor: None,
            one_at_a_time: None,
            auto_release_on_status: true,
            thresholds: RiskThresholds::default(),
            updated_at: None,
        }
    }
}

impl WarConfig {
    pub fn with_mode(mut self, mode: WarMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_kind_ttls(mut self, ttls: KindTtls) -> Self {
        self.kind_ttls = ttls;
        self
    }

    pub fn with_quota(mut self, quota: u32) -> Self {
        self.max_active_per_actor = Some(quota);
        self
    }

    pub fn with_one_at_a_time(mut self, enabled: bool) -> Self {
        self.one_at_a_time = Some(enabled);
        self
    }

    pub fn accepts_claims(&self) -> bool {
        self.mode.is_cooperative()
    }

    pub fn quota(&self) -> u32 {
        self.max_active_per_actor
            .unwrap_or_else(|| self.mode.default_quota())
    }

    pub fn enforces_one_at_a_time(&self) -> bool {
        self.one_at_a_time
            .unwrap_or(self.mode == WarMode::Coordinated)
    }

    pub fn ttl_for(&self, kind: ClaimKind) -> Duration {
        self.kind_ttls.ttl_for(kind)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for kind in ClaimKind::ALL {
            require_positive(
                &format!("war.kind_ttls.{}_secs", kind.as_db_str()),
                self.ttl_for(kind).as_secs(),
            )?;
        }
        if self.accepts_claims() && self.quota() == 0 {
            return Err(ConfigError::invalid(
                "war.max_active_per_actor",
                0,
                "must be > 0 while claims are accepted",
            ));
        }
        self.thresholds.validate()
    }
}

// ============================================================================
// REMOTE ENDPOINTS
// ============================================================================

/// Remote read API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ApiConfig {
    pub base_url: String,
    pub credential: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_BASE_URL.to_string(),
            credential: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("BASTION_API_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(key) = std::env::var("BASTION_API_KEY") {
            self.credential = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_url("api.base_url", &self.base_url)?;
        require_positive("api.request_timeout_ms", self.request_timeout_ms)
    }
}

/// Remote claim authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuthorityConfig {
    pub base_url: String,
    pub credential: Option<String>,
    pub request_timeout_ms: u64,
}

impl Default for AuthorityConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_AUTHORITY_BASE_URL.to_string(),
            credential: None,
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl AuthorityConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("BASTION_AUTHORITY_BASE_URL") {
            self.base_url = url;
        }
        if let Ok(key) = std::env::var("BASTION_AUTHORITY_KEY") {
            self.credential = Some(key);
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        require_url("authority.base_url", &self.base_url)?;
        require_positive("authority.request_timeout_ms", self.request_timeout_ms)
    }
}

// ============================================================================
// MASTER CONFIG
// ============================================================================

/// Master configuration struct.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BastionConfig {
    pub scheduler: SchedulerConfig,
    pub cache: CacheConfig,
    pub claims: ClaimSweepConfig,
    pub sync: SyncConfig,
    pub chain: ChainConfig,
    pub war: WarConfig,
    pub api: ApiConfig,
    pub authority: AuthorityConfig,
    pub event_capacity: usize,
}

impl Default for BastionConfig {
    fn default() -> Self {
        Self {
            scheduler: SchedulerConfig::default(),
            cache: CacheConfig::default(),
            claims: ClaimSweepConfig::default(),
            sync: SyncConfig::default(),
            chain: ChainConfig::default(),
            war: WarConfig::default(),
            api: ApiConfig::default(),
            authority: AuthorityConfig::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl BastionConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml_str(&contents)
    }

    /// Overlay every section's environment variables.
    pub fn apply_env(&mut self) {
        self.scheduler.apply_env();
        self.cache.apply_env();
        self.sync.apply_env();
        self.chain.apply_env();
        self.api.apply_env();
        self.authority.apply_env();
        self.claims.interval_secs = env_or("BASTION_CLAIM_SWEEP_INTERVAL_SECS", self.claims.interval_secs);
        self.event_capacity = env_or("BASTION_EVENT_CAPACITY", self.event_capacity);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scheduler.validate()?;
        self.cache.validate()?;
        self.claims.validate()?;
        self.sync.validate()?;
        self.chain.validate()?;
        self.war.validate()?;
        self.api.validate()?;
        self.authority.validate()?;
        require_positive("event_capacity", self.event_capacity as u64)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct EnvVarGuard {
        key: &'static str,
        original: Option<String>,
    }

    impl EnvVarGuard {
        fn set(key: &'static str, value: Option<&str>) -> Self {
            let original = std::env::var(key).ok();
            match value {
                Some(v) => std::env::set_var(key, v),
                None => std::env::remove_var(key),
            }
            Self { key, original }
        }
    }

    impl Drop for EnvVarGuard {
        fn drop(&mut self) {
            match self.original.as_deref() {
                Some(v) => std::env::set_var(self.key, v),
                None => std::env::remove_var(self.key),
            }
        }
    }

    #[test]
    fn test_defaults_validate() {
        let config = BastionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.max_concurrency, 3);
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(config.scheduler.window(), Duration::from_secs(60));
        assert_eq!(config.cache.capacity, 200);
        assert_eq!(config.claims.interval(), Duration::from_secs(30));
    }

    #[test]
    fn test_war_mode_quotas() {
        let coop = WarConfig::default();
        assert!(coop.accepts_claims());
        assert_eq!(coop.quota(), 2);
        assert!(!coop.enforces_one_at_a_time());

        let coordinated = WarConfig::default().with_mode(WarMode::Coordinated);
        assert_eq!(coordinated.quota(), 1);
        assert!(coordinated.enforces_one_at_a_time());

        let ffa = WarConfig::default().with_mode(WarMode::FreeForAll);
        assert!(!ffa.accepts_claims());
        assert!(ffa.validate().is_ok());

        let overridden = WarConfig::default().with_quota(5).with_one_at_a_time(true);
        assert_eq!(overridden.quota(), 5);
        assert!(overridden.enforces_one_at_a_time());
    }

    #[test]
    fn test_kind_ttls() {
        let ttls = KindTtls::default();
        assert_eq!(ttls.ttl_for(ClaimKind::Hit), Duration::from_secs(120));
        assert_eq!(ttls.ttl_for(ClaimKind::Med), Duration::from_secs(3600));
        assert_eq!(KindTtls::uniform(1).ttl_for(ClaimKind::Retal), Duration::from_secs(1));
    }

    #[test]
    fn test_toml_partial_sections_fill_defaults() {
        let config = BastionConfig::from_toml_str(
            r#"
            [scheduler]
            max_concurrency = 5

            [war]
            mode = "coordinated"

            [war.kind_ttls]
            hit_secs = 90
            "#,
        )
        .expect("config should parse");

        assert_eq!(config.scheduler.max_concurrency, 5);
        assert_eq!(config.scheduler.calls_per_minute, DEFAULT_CALLS_PER_MINUTE);
        assert_eq!(config.war.mode, WarMode::Coordinated);
        assert_eq!(config.war.ttl_for(ClaimKind::Hit), Duration::from_secs(90));
        assert_eq!(config.war.ttl_for(ClaimKind::Med), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_rejects_unknown_fields() {
        let err = BastionConfig::from_toml_str("[scheduler]\nturbo = true\n")
            .expect_err("unknown field should fail");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_from_path_reads_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bastion.toml");
        std::fs::write(&path, "[cache]\ncapacity = 10\n").expect("write config");
        let config = BastionConfig::from_path(&path).expect("config should load");
        assert_eq!(config.cache.capacity, 10);

        let missing = BastionConfig::from_path(&dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = BastionConfig::default();
        config.scheduler.max_concurrency = 0;
        let err = config.validate().expect_err("zero concurrency is invalid");
        assert!(format!("{}", err).contains("scheduler.max_concurrency"));
    }

    #[test]
    fn test_validate_rejects_unordered_milestones() {
        let mut config = ChainConfig::default();
        config.bonus_milestones = vec![10, 50, 25];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_thresholds() {
        let mut war = WarConfig::default();
        war.thresholds.critical_timeout_secs = 200;
        assert!(war.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let mut api = ApiConfig::default();
        api.base_url = "ftp://example".to_string();
        assert!(api.validate().is_err());
    }

    #[test]
    fn test_env_overlay() {
        let _concurrency = EnvVarGuard::set("BASTION_SCHEDULER_MAX_CONCURRENCY", Some("7"));
        let _quota = EnvVarGuard::set("BASTION_SCHEDULER_CALLS_PER_MINUTE", Some("not-a-number"));
        let mut config = SchedulerConfig::default();
        config.apply_env();
        assert_eq!(config.max_concurrency, 7);
        // Unparseable values keep the current setting.
        assert_eq!(config.calls_per_minute, DEFAULT_CALLS_PER_MINUTE);
    }
}
