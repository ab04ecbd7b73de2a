//! The sync bridge.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bastion_claims::{ClaimArbiter, ClaimMutation};
use bastion_core::constants::PRIORITY_HIGH;
use bastion_core::{RemoteError, StorageError, SyncConfig, SyncError};
use bastion_events::{BastionEvent, EventBus};
use bastion_net::{RequestScheduler, Task};
use bastion_storage::records::SYNC_MARKS_KEY;
use bastion_storage::{load_record, save_record, DurableStore};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::activity::ActivityTracker;
use crate::authority::RemoteAuthority;
use crate::bundle::{Bundle, SinceMarks};

/// What one applied bundle changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Mutations pushed before the pull.
    pub pushed: usize,
    /// Claims held after replacement, when the collection was present.
    pub claims: Option<usize>,
    pub notes: Option<usize>,
    pub config_changed: bool,
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub ticks: AtomicU64,
    pub pulls: AtomicU64,
    pub pushes: AtomicU64,
    pub failures: AtomicU64,
}

impl SyncMetrics {
    pub fn snapshot(&self) -> SyncSnapshot {
        SyncSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            pulls: self.pulls.load(Ordering::Relaxed),
            pushes: self.pushes.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSnapshot {
    pub ticks: u64,
    pub pulls: u64,
    pub pushes: u64,
    pub failures: u64,
}

// ============================================================================
// BRIDGE
// ============================================================================

/// Pushes local claim mutations and pulls authoritative state.
pub struct SyncBridge {
    config: SyncConfig,
    scheduler: RequestScheduler,
    authority: Arc<dyn RemoteAuthority>,
    arbiter: Arc<ClaimArbiter>,
    events: EventBus,
    store: Option<Arc<dyn DurableStore>>,
    marks: Mutex<SinceMarks>,
    activity: ActivityTracker,
    push_seq: AtomicU64,
    metrics: Arc<SyncMetrics>,
}

fn encode<T: Serialize>(value: &T) -> Result<JsonValue, RemoteError> {
    serde_json::to_value(value).map_err(|e| RemoteError::Decode {
        reason: e.to_string(),
    })
}

fn decode<T: DeserializeOwned>(value: JsonValue) -> Result<T, SyncError> {
    serde_json::from_value(value).map_err(|e| SyncError::Decode {
        reason: e.to_string(),
    })
}

impl SyncBridge {
    pub fn new(
        config: SyncConfig,
        scheduler: RequestScheduler,
        authority: Arc<dyn RemoteAuthority>,
        arbiter: Arc<ClaimArbiter>,
        events: EventBus,
    ) -> Self {
        let activity = ActivityTracker::new(&config);
        Self {
            config,
            scheduler,
            authority,
            arbiter,
            events,
            store: None,
            marks: Mutex::new(SinceMarks::default()),
            activity,
            push_seq: AtomicU64::new(0),
            metrics: Arc::new(SyncMetrics::default()),
        }
    }

    /// Persist the board and marks after every applied pull.
    pub fn with_store(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.store = Some(store);
        self
    }

    fn lock_marks(&self) -> MutexGuard<'_, SinceMarks> {
        self.marks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn marks(&self) -> SinceMarks {
        *self.lock_marks()
    }

    pub fn metrics(&self) -> Arc<SyncMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Called by the host on user input.
    pub fn record_activity(&self) {
        self.activity.record();
    }

    pub fn current_interval(&self) -> Duration {
        self.activity.interval()
    }

    pub async fn restore_marks(&self) -> Result<(), StorageError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(marks) = load_record::<SinceMarks>(store.as_ref(), SYNC_MARKS_KEY).await? {
            *self.lock_marks() = marks;
        }
        Ok(())
    }

    // ========================================================================
    // REMOTE CALLS
    //
    // The authority has its own credential, so its calls share the queue and
    // call window but not the world API's credential gate.
    // ========================================================================

    /// Pull collections changed since the current marks.
    pub async fn pull(&self) -> Result<Bundle, SyncError> {
        let since = self.marks();
        self.pull_since(since).await
    }

    pub async fn pull_since(&self, since: SinceMarks) -> Result<Bundle, SyncError> {
        let authority = Arc::clone(&self.authority);
        let task = Task::new("sync/pull", move || {
            let authority = Arc::clone(&authority);
            async move { encode(&authority.pull(&since).await?) }
        })
        .with_priority(PRIORITY_HIGH)
        .bypass_credential_gate();
        let value = self.scheduler.submit(task).await?;
        self.metrics.pulls.fetch_add(1, Ordering::Relaxed);
        decode(value)
    }

    pub async fn push(&self, batch: Vec<ClaimMutation>) -> Result<Bundle, SyncError> {
        let seq = self.push_seq.fetch_add(1, Ordering::Relaxed);
        let authority = Arc::clone(&self.authority);
        let batch = Arc::new(batch);
        let task = Task::new(format!("sync/push/{}", seq), move || {
            let authority = Arc::clone(&authority);
            let batch = Arc::clone(&batch);
            async move { encode(&authority.push(&batch).await?) }
        })
        .with_priority(PRIORITY_HIGH)
        .bypass_credential_gate();
        let value = self.scheduler.submit(task).await?;
        self.metrics.pushes.fetch_add(1, Ordering::Relaxed);
        decode(value)
    }

    // ========================================================================
    // RECONCILIATION
    // ========================================================================

    /// Replace every collection present in `bundle` and advance the marks.
    pub fn apply(&self, bundle: Bundle) -> SyncReport {
        // Config first so a closed mode also clears the incoming claims.
        let config_changed = bundle
            .war_config
            .map(|config| self.arbiter.apply_authoritative_config(config))
            .unwrap_or(false);
        let claims = bundle
            .claims
            .map(|claims| self.arbiter.apply_authoritative_claims(claims));
        let notes = bundle
            .notes
            .map(|notes| self.arbiter.apply_authoritative_notes(notes.into_values().collect()));
        self.lock_marks().advance(&bundle.marks);

        let report = SyncReport {
            pushed: 0,
            claims,
            notes,
            config_changed,
        };
        if claims.is_some() || notes.is_some() || config_changed {
            debug!(?claims, ?notes, config_changed, "Authoritative state applied");
            self.events.publish(BastionEvent::SyncApplied {
                claims: claims.unwrap_or(0),
                notes: notes.unwrap_or(0),
                config_changed,
            });
        }
        report
    }

    /// Push the outbox. A failed push goes back to the front of the outbox.
    pub async fn push_pending(&self) -> Result<usize, SyncError> {
        let batch = self.arbiter.drain_outbox();
        if batch.is_empty() {
            return Ok(0);
        }
        let count = batch.len();
        match self.push(batch.clone()).await {
            Ok(reply) => {
                debug!(count, "Pushed local mutations");
                self.apply(reply);
                Ok(count)
            }
            Err(e) => {
                warn!(count, error = %e, "Push failed, mutations re-queued");
                self.arbiter.requeue_front(batch);
                Err(e)
            }
        }
    }

    /// One sync round: push, pull, apply, persist.
    ///
    /// When the push fails the pull is skipped, so a stale snapshot cannot
    /// overwrite mutations the authority has not seen yet.
    pub async fn tick(&self) -> Result<SyncReport, SyncError> {
        self.metrics.ticks.fetch_add(1, Ordering::Relaxed);
        let pushed = self.push_pending().await?;
        let bundle = self.pull().await?;
        let mut report = self.apply(bundle);
        report.pushed = pushed;
        self.persist().await;
        Ok(report)
    }

    async fn persist(&self) {
        let Some(store) = &self.store else {
            return;
        };
        if let Err(e) = self.arbiter.save_board(store.as_ref()).await {
            warn!(error = %e, "Failed to persist claim board");
        }
        if let Err(e) = save_record(store.as_ref(), SYNC_MARKS_KEY, &self.marks()).await {
            warn!(error = %e, "Failed to persist sync marks");
        }
    }

    /// Tick until shutdown, waiting the activity-dependent period between
    /// ticks. Local mutations are pushed as soon as the arbiter queues them;
    /// a failed push stays in the outbox for the next tick. Failures are
    /// logged and the loop carries on.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) -> Arc<SyncMetrics> {
        info!(
            active_interval_secs = self.config.active_interval_secs,
            idle_interval_secs = self.config.idle_interval_secs,
            "Sync loop started"
        );
        let mut next_tick = Instant::now();
        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = self.arbiter.outbox_ready() => {
                    if let Err(e) = self.push_pending().await {
                        self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                        debug!(error = %e, "Immediate push deferred to the next tick");
                    }
                }
                _ = tokio::time::sleep_until(next_tick) => {
                    match self.tick().await {
                        Ok(report) => debug!(
                            pushed = report.pushed,
                            claims = ?report.claims,
                            notes = ?report.notes,
                            config_changed = report.config_changed,
                            "Sync tick"
                        ),
                        Err(e) => {
                            self.metrics.failures.fetch_add(1, Ordering::Relaxed);
                            warn!(error = %e, "Sync tick failed");
                        }
                    }
                    next_tick = Instant::now() + self.current_interval();
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        info!(
            ticks = snapshot.ticks,
            pulls = snapshot.pulls,
            pushes = snapshot.pushes,
            failures = snapshot.failures,
            "Sync loop stopped"
        );
        Arc::clone(&self.metrics)
    }
}

impl std::fmt::Debug for SyncBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncBridge")
            .field("marks", &self.marks())
            .field("interval", &self.current_interval())
            .finish()
    }
}
