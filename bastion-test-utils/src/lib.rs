//! Bastion Test Utilities
//!
//! Shared test infrastructure for the Bastion workspace:
//! - Scripted remotes standing in for the read API and the authority
//! - Proptest generators for the core types
//! - Fixtures for common scenarios
//! - Event bus helpers

pub use bastion_core::{
    ActorId, CacheConfig, ChainReading, Claim, ClaimKind, ClaimStatus, CreateClaim, KindTtls,
    ManualClock, RemoteError, SchedulerConfig, TargetId, TargetNote, Timestamp, WarConfig,
    WarMode,
};

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use bastion_claims::{ClaimArbiter, ClaimMutation};
use bastion_events::{BastionEvent, EventBus};
use bastion_net::{RemoteApi, RequestScheduler};
use bastion_storage::ResponseCache;
use bastion_sync::{Bundle, RemoteAuthority, SinceMarks};
use serde_json::{json, Value as JsonValue};
use tokio::sync::broadcast;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// SCRIPTED REMOTE API
// ============================================================================

/// A [`RemoteApi`] answering from per-key scripts.
///
/// Each key plays its queued responses in order; once a script runs dry the
/// fallback answers (by default `{"key": <key>}`). Every call is recorded.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    scripts: Mutex<HashMap<String, VecDeque<Result<JsonValue, RemoteError>>>>,
    fallback: Mutex<Option<Result<JsonValue, RemoteError>>>,
    calls: Mutex<Vec<String>>,
    latency: Mutex<Duration>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `response` for the next call to `key`.
    pub fn script(&self, key: impl Into<String>, response: Result<JsonValue, RemoteError>) {
        lock(&self.scripts)
            .entry(key.into())
            .or_default()
            .push_back(response);
    }

    /// Answer for any key without a pending script.
    pub fn set_fallback(&self, response: Result<JsonValue, RemoteError>) {
        *lock(&self.fallback) = Some(response);
    }

    /// Sleep this long inside every call.
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.latency) = latency;
    }

    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    pub fn calls_for(&self, key: &str) -> usize {
        lock(&self.calls).iter().filter(|k| k.as_str() == key).count()
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn get(&self, key: &str) -> Result<JsonValue, RemoteError> {
        lock(&self.calls).push(key.to_string());
        let latency = *lock(&self.latency);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        let scripted = lock(&self.scripts).get_mut(key).and_then(VecDeque::pop_front);
        match scripted {
            Some(response) => response,
            None => lock(&self.fallback)
                .clone()
                .unwrap_or_else(|| Ok(json!({ "key": key }))),
        }
    }
}

// ============================================================================
// SCRIPTED AUTHORITY
// ============================================================================

/// A [`RemoteAuthority`] replaying queued replies and recording traffic.
///
/// With nothing queued a pull answers "unchanged since your marks" and a
/// push answers an empty bundle.
#[derive(Debug, Default)]
pub struct ScriptedAuthority {
    pulls: Mutex<VecDeque<Result<Bundle, RemoteError>>>,
    pushes: Mutex<VecDeque<Result<Bundle, RemoteError>>>,
    seen_marks: Mutex<Vec<SinceMarks>>,
    pushed: Mutex<Vec<Vec<ClaimMutation>>>,
}

impl ScriptedAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_pull(&self, reply: Result<Bundle, RemoteError>) {
        lock(&self.pulls).push_back(reply);
    }

    pub fn queue_push(&self, reply: Result<Bundle, RemoteError>) {
        lock(&self.pushes).push_back(reply);
    }

    /// The marks sent with each pull, oldest first.
    pub fn seen_marks(&self) -> Vec<SinceMarks> {
        lock(&self.seen_marks).clone()
    }

    /// Every batch the authority accepted or refused, oldest first.
    pub fn pushed(&self) -> Vec<Vec<ClaimMutation>> {
        lock(&self.pushed).clone()
    }

    pub fn pull_count(&self) -> usize {
        lock(&self.seen_marks).len()
    }
}

#[async_trait]
impl RemoteAuthority for ScriptedAuthority {
    async fn pull(&self, since: &SinceMarks) -> Result<Bundle, RemoteError> {
        lock(&self.seen_marks).push(*since);
        lock(&self.pulls)
            .pop_front()
            .unwrap_or_else(|| Ok(Bundle::unchanged(*since)))
    }

    async fn push(&self, batch: &[ClaimMutation]) -> Result<Bundle, RemoteError> {
        lock(&self.pushed).push(batch.to_vec());
        lock(&self.pushes)
            .pop_front()
            .unwrap_or_else(|| Ok(Bundle::default()))
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Bastion core types.

    use super::*;
    use proptest::prelude::*;

    /// A small pool of target ids so generated claims collide.
    pub fn arb_target_id() -> impl Strategy<Value = TargetId> {
        (1u64..6).prop_map(TargetId::from)
    }

    pub fn arb_actor_id() -> impl Strategy<Value = ActorId> {
        (100u64..104).prop_map(ActorId::from)
    }

    pub fn arb_claim_kind() -> impl Strategy<Value = ClaimKind> {
        prop_oneof![
            Just(ClaimKind::Hit),
            Just(ClaimKind::Med),
            Just(ClaimKind::Assist),
            Just(ClaimKind::Retal),
        ]
    }

    pub fn arb_war_mode() -> impl Strategy<Value = WarMode> {
        prop_oneof![
            Just(WarMode::Cooperative),
            Just(WarMode::Coordinated),
            Just(WarMode::FreeForAll),
            Just(WarMode::Off),
        ]
    }

    pub fn arb_create_claim() -> impl Strategy<Value = CreateClaim> {
        (arb_target_id(), arb_actor_id(), arb_claim_kind())
            .prop_map(|(target, actor, kind)| CreateClaim::new(target, actor, kind))
    }

    pub fn arb_chain_reading() -> impl Strategy<Value = ChainReading> {
        (0u64..120_000, 0u64..300, 0u64..600).prop_map(|(current, timeout_secs, cooldown_secs)| {
            ChainReading {
                current,
                max: current.max(10),
                timeout_secs,
                cooldown_secs,
            }
        })
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-01-01 .. 2030-01-01
        (1_577_836_800i64..1_893_456_000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_else(chrono::Utc::now)
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    /// A cooperative war with a five minute hit TTL.
    pub fn cooperative_war() -> WarConfig {
        WarConfig::default()
            .with_mode(WarMode::Cooperative)
            .with_kind_ttls(KindTtls::uniform(300))
    }

    /// A scheduler with the default config over `remote` and an empty cache.
    pub fn scheduler_over(
        remote: Arc<dyn RemoteApi>,
        clock: &ManualClock,
        events: &EventBus,
    ) -> RequestScheduler {
        let cache = Arc::new(
            ResponseCache::new(CacheConfig::default(), Arc::new(clock.clone()))
                .with_events(events.clone()),
        );
        RequestScheduler::new(SchedulerConfig::default(), remote, cache, events.clone())
    }

    /// An arbiter over `clock` running [`cooperative_war`].
    pub fn arbiter(clock: &ManualClock, events: &EventBus) -> Arc<ClaimArbiter> {
        Arc::new(ClaimArbiter::new(
            cooperative_war(),
            Arc::new(clock.clone()),
            events.clone(),
        ))
    }

    pub fn hit(target: u64, actor: u64) -> CreateClaim {
        CreateClaim::new(target, actor, ClaimKind::Hit).with_actor_name(format!("actor-{actor}"))
    }

    /// An active claim as the authority would report it.
    pub fn authority_claim(target: u64, actor: u64, now: Timestamp) -> Claim {
        Claim::open(&hit(target, actor), now, Duration::from_secs(300))
    }
}

// ============================================================================
// EVENT HELPERS
// ============================================================================

/// Everything currently buffered on `rx`, skipping over lag.
pub fn drain_events(rx: &mut broadcast::Receiver<BastionEvent>) -> Vec<BastionEvent> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}

/// Names of the buffered events, in publish order.
pub fn drain_event_names(rx: &mut broadcast::Receiver<BastionEvent>) -> Vec<&'static str> {
    drain_events(rx).iter().map(BastionEvent::event_type).collect()
}
