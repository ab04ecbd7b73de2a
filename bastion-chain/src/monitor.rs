//! The chain monitor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use bastion_core::constants::PRIORITY_CRITICAL;
use bastion_core::{
    ChainConfig, ChainReading, ChainState, Clock, RiskAssessment, RiskThresholds, StorageError,
};
use bastion_events::EventBus;
use bastion_net::RequestScheduler;
use bastion_storage::records::CHAIN_STATE_KEY;
use bastion_storage::{load_record, save_record, DurableStore};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::poll::chain_poll_task;
use crate::tracker::RiskTracker;

struct Poller {
    shutdown_tx: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Inner {
    config: ChainConfig,
    scheduler: RequestScheduler,
    clock: Arc<dyn Clock>,
    store: Option<Arc<dyn DurableStore>>,
    thresholds: RwLock<RiskThresholds>,
    state: Mutex<ChainState>,
    tracker: RiskTracker,
    poller: Mutex<Option<Poller>>,
}

/// Owns the single [`ChainState`] and keeps its risk assessment current.
///
/// Cheap to clone; clones share the same state. With a store, the snapshot
/// is saved after every update.
#[derive(Clone)]
pub struct ChainMonitor {
    inner: Arc<Inner>,
}

impl ChainMonitor {
    pub fn new(
        config: ChainConfig,
        thresholds: RiskThresholds,
        scheduler: RequestScheduler,
        clock: Arc<dyn Clock>,
        events: EventBus,
        store: Option<Arc<dyn DurableStore>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                scheduler,
                clock,
                store,
                thresholds: RwLock::new(thresholds),
                state: Mutex::new(ChainState::default()),
                tracker: RiskTracker::new(events),
                poller: Mutex::new(None),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ChainState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_poller(&self) -> MutexGuard<'_, Option<Poller>> {
        self.inner.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn config(&self) -> &ChainConfig {
        &self.inner.config
    }

    pub fn get_state(&self) -> ChainState {
        self.lock_state().clone()
    }

    pub fn get_risk(&self) -> RiskAssessment {
        self.inner.tracker.current()
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.inner
            .thresholds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Swap thresholds (after a war config change) and rescore the current
    /// state.
    pub fn set_thresholds(&self, thresholds: RiskThresholds) -> RiskAssessment {
        *self
            .inner
            .thresholds
            .write()
            .unwrap_or_else(PoisonError::into_inner) = thresholds.clone();
        let state = self.get_state();
        self.inner.tracker.update(&state, &thresholds)
    }

    pub fn clear_permission_error(&self) {
        self.lock_state().permission_error = false;
    }

    // ========================================================================
    // POLLING
    // ========================================================================

    /// Poll once now. On failure the previous numbers are kept and only the
    /// error fields move. Either way the risk is recomputed.
    pub async fn refresh_now(&self) -> ChainState {
        let inner = &self.inner;
        let result = inner
            .scheduler
            .fetch_with_priority(
                &inner.config.request_key,
                Duration::ZERO,
                inner.scheduler.config().max_attempts,
                PRIORITY_CRITICAL,
            )
            .await;

        let reading = match result {
            Ok(value) => ChainReading::from_json(&value).map_err(|e| (false, e.to_string())),
            Err(e) => Err((e.is_permission_failure(), e.to_string())),
        };

        let state = {
            let mut state = self.lock_state();
            match reading {
                Ok(reading) => {
                    *state = ChainState::from_reading(
                        reading,
                        &inner.config.bonus_milestones,
                        inner.clock.now(),
                    );
                    debug!(current = state.current, timeout_secs = state.timeout_secs, "Chain polled");
                }
                Err((permission, message)) => {
                    warn!(permission, error = %message, "Chain poll failed");
                    state.record_failure(message, permission);
                }
            }
            state.clone()
        };

        let thresholds = self.thresholds();
        inner.tracker.update(&state, &thresholds);
        self.persist(&state).await;
        state
    }

    /// Poll every `every` until [`stop_polling`](Self::stop_polling).
    /// Restarting replaces a running poller.
    pub fn start_polling(&self, every: Duration) {
        self.stop_polling();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = self.clone();
        let handle = tokio::spawn(async move {
            chain_poll_task(monitor, every, shutdown_rx).await;
        });
        *self.lock_poller() = Some(Poller {
            shutdown_tx,
            handle,
        });
        info!(interval_ms = every.as_millis() as u64, "Chain polling started");
    }

    /// Returns whether a poller was running.
    pub fn stop_polling(&self) -> bool {
        match self.lock_poller().take() {
            Some(poller) => {
                if poller.shutdown_tx.send(true).is_err() {
                    poller.handle.abort();
                }
                true
            }
            None => false,
        }
    }

    pub fn is_polling(&self) -> bool {
        self.lock_poller()
            .as_ref()
            .is_some_and(|poller| !poller.handle.is_finished())
    }

    // ========================================================================
    // PERSISTENCE
    // ========================================================================

    async fn persist(&self, state: &ChainState) {
        let Some(store) = &self.inner.store else {
            return;
        };
        if let Err(e) = save_record(store.as_ref(), CHAIN_STATE_KEY, state).await {
            warn!(error = %e, "Failed to persist chain state");
        }
    }

    /// Save the current snapshot, e.g. on shutdown.
    pub async fn save(&self) -> Result<(), StorageError> {
        match &self.inner.store {
            Some(store) => save_record(store.as_ref(), CHAIN_STATE_KEY, &self.get_state()).await,
            None => Ok(()),
        }
    }

    /// Load the saved snapshot and rescore it without publishing events.
    pub async fn restore(&self) -> Result<bool, StorageError> {
        let Some(store) = &self.inner.store else {
            return Ok(false);
        };
        let Some(state) = load_record::<ChainState>(store.as_ref(), CHAIN_STATE_KEY).await? else {
            return Ok(false);
        };
        *self.lock_state() = state.clone();
        self.inner.tracker.prime(&state, &self.thresholds());
        Ok(true)
    }
}

impl std::fmt::Debug for ChainMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainMonitor")
            .field("request_key", &self.inner.config.request_key)
            .field("state", &self.get_state())
            .field("polling", &self.is_polling())
            .finish()
    }
}
