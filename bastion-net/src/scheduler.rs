//! The priority request scheduler.

use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bastion_core::constants::PRIORITY_NORMAL;
use bastion_core::{FetchError, RemoteError, SchedulerConfig};
use bastion_events::{BastionEvent, EventBus};
use bastion_storage::ResponseCache;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::credential::CredentialGate;
use crate::remote::RemoteApi;
use crate::retry::RetryPolicy;
use crate::task::{Completion, Task, TaskHandle};
use crate::window::CallWindow;

// ============================================================================
// QUEUE
// ============================================================================

struct Pending {
    seq: u64,
    task: Task,
}

impl Pending {
    fn rank(&self) -> (u8, u64) {
        (self.task.priority, self.seq)
    }
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.rank() == other.rank()
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // BinaryHeap is a max-heap: the lowest (priority, seq) must compare greatest.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        other.rank().cmp(&self.rank())
    }
}

#[derive(Default)]
struct QueueState {
    pending: BinaryHeap<Pending>,
    in_flight: usize,
    next_seq: u64,
    /// Everyone waiting on a key that is pending or in flight.
    waiters: HashMap<String, Vec<Completion>>,
}

// ============================================================================
// STATS
// ============================================================================

/// Point-in-time scheduler statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub queued: usize,
    pub in_flight: usize,
    /// Calls dispatched in the current trailing window.
    pub window_calls: usize,
    pub dispatched: u64,
    pub retries: u64,
    pub cache_short_circuits: u64,
    pub deduplicated: u64,
    pub quota_stuck: u64,
    pub credential_invalid: bool,
}

#[derive(Debug, Default)]
struct Counters {
    dispatched: AtomicU64,
    retries: AtomicU64,
    cache_short_circuits: AtomicU64,
    deduplicated: AtomicU64,
    quota_stuck: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

// ============================================================================
// SCHEDULER
// ============================================================================

struct Inner {
    config: SchedulerConfig,
    remote: Arc<dyn RemoteApi>,
    cache: Arc<ResponseCache>,
    events: EventBus,
    credential: CredentialGate,
    retry: RetryPolicy,
    quota_backoff: RetryPolicy,
    window: Mutex<CallWindow>,
    state: Mutex<QueueState>,
    counters: Counters,
}

/// Priority scheduler over remote reads.
///
/// Cheap to clone; clones share the queue, the call window and the
/// credential gate.
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<Inner>,
}

impl RequestScheduler {
    pub fn new(
        config: SchedulerConfig,
        remote: Arc<dyn RemoteApi>,
        cache: Arc<ResponseCache>,
        events: EventBus,
    ) -> Self {
        let window = CallWindow::new(config.calls_per_minute as usize, config.window());
        let retry = RetryPolicy::new(config.retry_base(), config.max_backoff());
        let quota_backoff = RetryPolicy::new(config.quota_backoff_base(), config.max_backoff());
        Self {
            inner: Arc::new(Inner {
                config,
                remote,
                cache,
                events,
                credential: CredentialGate::new(),
                retry,
                quota_backoff,
                window: Mutex::new(window),
                state: Mutex::new(QueueState::default()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn cache(&self) -> &Arc<ResponseCache> {
        &self.inner.cache
    }

    /// Enqueue `task` and return a handle to its result.
    ///
    /// Enqueueing is synchronous, so a caller can submit many tasks before
    /// awaiting any of them. Must be called from within a Tokio runtime.
    pub fn submit(&self, task: Task) -> TaskHandle {
        let inner = &self.inner;

        if task.credential_gated && inner.credential.is_invalid() {
            return TaskHandle::ready(Err(FetchError::CredentialInvalid {
                reason: inner.credential.reason().unwrap_or_default(),
            }));
        }

        if !task.cache_ttl.is_zero() {
            if let Some(value) = inner.cache.get(&task.key) {
                bump(&inner.counters.cache_short_circuits);
                debug!(key = %task.key, "Served from cache");
                return TaskHandle::ready(Ok(value));
            }
        }

        let (tx, handle) = TaskHandle::channel();
        {
            let mut state = inner.lock_state();
            if let Some(waiting) = state.waiters.get_mut(&task.key) {
                waiting.push(tx);
                bump(&inner.counters.deduplicated);
                debug!(key = %task.key, "Joined pending request");
                return handle;
            }
            state.waiters.insert(task.key.clone(), vec![tx]);
            let seq = state.next_seq;
            state.next_seq += 1;
            debug!(key = %task.key, priority = task.priority, seq, "Request queued");
            state.pending.push(Pending { seq, task });
        }
        Inner::pump(inner);
        handle
    }

    /// Read `key` through the injected [`RemoteApi`].
    pub async fn fetch(
        &self,
        key: &str,
        cache_ttl: Duration,
        max_attempts: u32,
    ) -> Result<JsonValue, FetchError> {
        self.fetch_with_priority(key, cache_ttl, max_attempts, PRIORITY_NORMAL)
            .await
    }

    pub async fn fetch_with_priority(
        &self,
        key: &str,
        cache_ttl: Duration,
        max_attempts: u32,
        priority: u8,
    ) -> Result<JsonValue, FetchError> {
        let remote = Arc::clone(&self.inner.remote);
        let request_key = key.to_string();
        let task = Task::new(key, move || {
            let remote = Arc::clone(&remote);
            let request_key = request_key.clone();
            async move { remote.get(&request_key).await }
        })
        .with_priority(priority)
        .with_cache_ttl(cache_ttl)
        .with_max_attempts(max_attempts);
        self.submit(task).await
    }

    /// Clear the credential-invalid flag once a new credential is in place.
    pub fn reauthorize(&self) {
        if self.inner.credential.is_invalid() {
            info!("Credential re-authorized, resuming remote calls");
        }
        self.inner.credential.reset();
    }

    pub fn is_credential_invalid(&self) -> bool {
        self.inner.credential.is_invalid()
    }

    pub fn stats(&self) -> SchedulerStats {
        let inner = &self.inner;
        let (queued, in_flight) = {
            let state = inner.lock_state();
            (state.pending.len(), state.in_flight)
        };
        let window_calls = inner.lock_window().in_window(Instant::now());
        SchedulerStats {
            queued,
            in_flight,
            window_calls,
            dispatched: inner.counters.dispatched.load(Ordering::Relaxed),
            retries: inner.counters.retries.load(Ordering::Relaxed),
            cache_short_circuits: inner.counters.cache_short_circuits.load(Ordering::Relaxed),
            deduplicated: inner.counters.deduplicated.load(Ordering::Relaxed),
            quota_stuck: inner.counters.quota_stuck.load(Ordering::Relaxed),
            credential_invalid: inner.credential.is_invalid(),
        }
    }
}

impl std::fmt::Debug for RequestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("config", &self.inner.config)
            .field("stats", &self.stats())
            .finish()
    }
}

/// A concurrency slot held by one running key.
///
/// Dropping it unreleased (the run was cancelled or unwound) frees the slot,
/// drops the key's waiters, which then resolve to [`FetchError::Dropped`],
/// and starts the next queued task.
struct Slot {
    inner: Arc<Inner>,
    key: String,
    held: bool,
}

impl Slot {
    fn release(&mut self) -> Vec<Completion> {
        self.held = false;
        let mut state = self.inner.lock_state();
        state.in_flight = state.in_flight.saturating_sub(1);
        state.waiters.remove(&self.key).unwrap_or_default()
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        if self.held {
            warn!(key = %self.key, "Request run ended early, releasing its slot");
            drop(self.release());
            if tokio::runtime::Handle::try_current().is_ok() {
                Inner::pump(&self.inner);
            }
        }
    }
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_window(&self) -> MutexGuard<'_, CallWindow> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start queued tasks while concurrency slots are free.
    fn pump(this: &Arc<Self>) {
        loop {
            let task = {
                let mut state = this.lock_state();
                if state.in_flight >= this.config.max_concurrency {
                    return;
                }
                let Some(next) = state.pending.pop() else {
                    return;
                };
                state.in_flight += 1;
                next.task
            };
            tokio::spawn(Arc::clone(this).run(task));
        }
    }

    async fn run(self: Arc<Self>, task: Task) {
        let mut slot = Slot {
            inner: Arc::clone(&self),
            key: task.key.clone(),
            held: true,
        };
        let result = self.execute(&task).await;

        if let Ok(value) = &result {
            if !task.cache_ttl.is_zero() {
                self.cache.put(&task.key, value.clone(), task.cache_ttl).await;
            }
        }

        for waiter in slot.release() {
            let _ = waiter.send(result.clone());
        }

        Self::pump(&self);
    }

    /// Run one attempt on its own task so a panic becomes an error.
    async fn attempt(task: &Task) -> Result<Result<JsonValue, RemoteError>, FetchError> {
        tokio::spawn(task.attempt()).await.map_err(|e| {
            let reason = if e.is_panic() {
                "request panicked".to_string()
            } else {
                e.to_string()
            };
            warn!(key = %task.key, reason = %reason, "Request attempt aborted");
            FetchError::Aborted {
                key: task.key.clone(),
                reason,
            }
        })
    }

    async fn execute(&self, task: &Task) -> Result<JsonValue, FetchError> {
        let max_attempts = task.max_attempts.unwrap_or(self.config.max_attempts).max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            if task.credential_gated && self.credential.is_invalid() {
                return Err(FetchError::CredentialInvalid {
                    reason: self.credential.reason().unwrap_or_default(),
                });
            }
            self.admit(&task.key).await?;
            bump(&self.counters.dispatched);
            debug!(key = %task.key, attempt, "Dispatching request");

            let error = match Self::attempt(task).await? {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if task.credential_gated && error.is_credential_failure() {
                let reason = error.to_string();
                if self.credential.invalidate(reason.clone()) {
                    warn!(key = %task.key, reason = %reason, "Credential rejected, failing fast until re-authorized");
                    self.events.publish(BastionEvent::CredentialInvalid {
                        reason: reason.clone(),
                    });
                }
                return Err(FetchError::CredentialInvalid { reason });
            }

            if !error.is_transient() {
                warn!(key = %task.key, error = %error, "Request failed");
                return Err(FetchError::Remote {
                    key: task.key.clone(),
                    source: error,
                });
            }

            if attempt >= max_attempts {
                warn!(key = %task.key, attempts = attempt, error = %error, "Retries exhausted");
                return Err(FetchError::RetriesExhausted {
                    key: task.key.clone(),
                    attempts: attempt,
                    last: error,
                });
            }

            let delay = self.retry.delay(attempt - 1);
            bump(&self.counters.retries);
            debug!(key = %task.key, attempt, delay_ms = delay.as_millis() as u64, error = %error, "Transient failure, retrying");
            tokio::time::sleep(delay).await;
        }
    }

    /// Wait for the call window to admit one call.
    async fn admit(&self, key: &str) -> Result<(), FetchError> {
        let mut waits = 0;
        loop {
            if self.lock_window().try_acquire(Instant::now()) {
                return Ok(());
            }
            if waits >= self.config.max_quota_waits {
                bump(&self.counters.quota_stuck);
                warn!(key = %key, waits, "Call quota saturated, giving up");
                self.events.publish(BastionEvent::QuotaStuck {
                    key: key.to_string(),
                    waits,
                });
                return Err(FetchError::QuotaStuck {
                    key: key.to_string(),
                    waits,
                });
            }
            let delay = self.quota_backoff.delay(waits);
            waits += 1;
            debug!(key = %key, waits, delay_ms = delay.as_millis() as u64, "Call quota saturated, delaying admission");
            tokio::time::sleep(delay).await;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
