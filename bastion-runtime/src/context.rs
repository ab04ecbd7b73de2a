//! The per-process context.
//!
//! Every component is constructed exactly once here and handed its
//! collaborators explicitly. Nothing in the workspace keeps module-level
//! state.

use std::sync::Arc;

use bastion_chain::{chain_poll_task, ChainMonitor, ChainPollMetrics};
use bastion_claims::{claim_sweep_task, ClaimArbiter, ClaimSweepMetrics};
use bastion_core::{BastionConfig, Clock, ConfigError, StorageError, SystemClock};
use bastion_events::EventBus;
use bastion_net::{RemoteApi, RequestScheduler};
use bastion_storage::{DurableStore, ResponseCache};
use bastion_sync::{RemoteAuthority, SyncBridge, SyncMetrics};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::{RuntimeError, RuntimeResult};
use crate::jobs::{cache_sweep_task, event_relay_task, CacheSweepMetrics, EventRelayMetrics};

/// Shared handles for one running client instance.
pub struct BastionContext {
    pub config: BastionConfig,
    pub events: EventBus,
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn DurableStore>,
    pub cache: Arc<ResponseCache>,
    pub scheduler: RequestScheduler,
    pub claims: Arc<ClaimArbiter>,
    pub sync: Arc<SyncBridge>,
    pub chain: ChainMonitor,
}

/// What [`BastionContext::restore`] found in the durable store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub cache_entries: usize,
    pub board: bool,
    pub chain: bool,
}

impl BastionContext {
    pub fn build(
        config: BastionConfig,
        store: Arc<dyn DurableStore>,
        remote: Arc<dyn RemoteApi>,
        authority: Arc<dyn RemoteAuthority>,
    ) -> Result<Self, ConfigError> {
        Self::build_with_clock(config, store, remote, authority, Arc::new(SystemClock))
    }

    pub fn build_with_clock(
        config: BastionConfig,
        store: Arc<dyn DurableStore>,
        remote: Arc<dyn RemoteApi>,
        authority: Arc<dyn RemoteAuthority>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let events = EventBus::new(config.event_capacity);

        let cache = Arc::new(
            ResponseCache::new(config.cache.clone(), Arc::clone(&clock))
                .with_store(Arc::clone(&store))
                .with_events(events.clone()),
        );
        let scheduler = RequestScheduler::new(
            config.scheduler.clone(),
            remote,
            Arc::clone(&cache),
            events.clone(),
        );
        let claims = Arc::new(ClaimArbiter::new(
            config.war.clone(),
            Arc::clone(&clock),
            events.clone(),
        ));
        let sync = Arc::new(
            SyncBridge::new(
                config.sync.clone(),
                scheduler.clone(),
                authority,
                Arc::clone(&claims),
                events.clone(),
            )
            .with_store(Arc::clone(&store)),
        );
        let chain = ChainMonitor::new(
            config.chain.clone(),
            config.war.thresholds.clone(),
            scheduler.clone(),
            Arc::clone(&clock),
            events.clone(),
            Some(Arc::clone(&store)),
        );

        Ok(Self {
            config,
            events,
            clock,
            store,
            cache,
            scheduler,
            claims,
            sync,
            chain,
        })
    }

    /// Reload cache entries, the claim board, sync marks and the chain
    /// snapshot from the durable store.
    pub async fn restore(&self) -> Result<RestoreReport, StorageError> {
        let cache_entries = self.cache.restore().await?;
        let board = self.claims.load_board(self.store.as_ref()).await?;
        self.sync.restore_marks().await?;

        let thresholds = self.claims.war_config().thresholds;
        if thresholds != self.chain.thresholds() {
            self.chain.set_thresholds(thresholds);
        }
        let chain = self.chain.restore().await?;

        let report = RestoreReport {
            cache_entries,
            board,
            chain,
        };
        info!(?report, "State restored");
        Ok(report)
    }

    /// Save the claim board and chain snapshot.
    pub async fn persist(&self) -> Result<(), StorageError> {
        self.claims.save_board(self.store.as_ref()).await?;
        self.chain.save().await
    }

    /// Start every background job. They all stop when `shutdown_rx` sees
    /// `true`.
    pub fn spawn_jobs(&self, shutdown_rx: watch::Receiver<bool>) -> JobHandles {
        let relay_rx = self.events.subscribe();
        let handles = JobHandles {
            event_relay: tokio::spawn(event_relay_task(
                relay_rx,
                self.chain.clone(),
                shutdown_rx.clone(),
            )),
            cache_sweep: tokio::spawn(cache_sweep_task(
                Arc::clone(&self.cache),
                self.config.cache.sweep_interval(),
                shutdown_rx.clone(),
            )),
            claim_sweep: tokio::spawn(claim_sweep_task(
                Arc::clone(&self.claims),
                self.config.claims.interval(),
                shutdown_rx.clone(),
            )),
            sync: tokio::spawn(Arc::clone(&self.sync).run(shutdown_rx.clone())),
            chain_poll: tokio::spawn(chain_poll_task(
                self.chain.clone(),
                self.config.chain.poll_interval(),
                shutdown_rx,
            )),
        };
        info!("Background jobs started");
        handles
    }
}

impl std::fmt::Debug for BastionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BastionContext")
            .field("scheduler", &self.scheduler.stats())
            .field("cache_entries", &self.cache.len())
            .field("active_claims", &self.claims.active_claims().len())
            .field("chain", &self.chain)
            .finish()
    }
}

/// Join handles for the jobs started by [`BastionContext::spawn_jobs`].
pub struct JobHandles {
    pub event_relay: JoinHandle<Arc<EventRelayMetrics>>,
    pub cache_sweep: JoinHandle<Arc<CacheSweepMetrics>>,
    pub claim_sweep: JoinHandle<Arc<ClaimSweepMetrics>>,
    pub sync: JoinHandle<Arc<SyncMetrics>>,
    pub chain_poll: JoinHandle<Arc<ChainPollMetrics>>,
}

/// Final counters of every job.
#[derive(Debug)]
pub struct JobMetrics {
    pub event_relay: Arc<EventRelayMetrics>,
    pub cache_sweep: Arc<CacheSweepMetrics>,
    pub claim_sweep: Arc<ClaimSweepMetrics>,
    pub sync: Arc<SyncMetrics>,
    pub chain_poll: Arc<ChainPollMetrics>,
}

async fn join<T>(job: &'static str, handle: JoinHandle<T>) -> RuntimeResult<T> {
    handle.await.map_err(|e| {
        warn!(job, error = %e, "Background job ended abnormally");
        RuntimeError::Join {
            job,
            reason: e.to_string(),
        }
    })
}

impl JobHandles {
    /// Wait for every job to finish after shutdown was signalled.
    pub async fn join(self) -> RuntimeResult<JobMetrics> {
        Ok(JobMetrics {
            event_relay: join("event_relay", self.event_relay).await?,
            cache_sweep: join("cache_sweep", self.cache_sweep).await?,
            claim_sweep: join("claim_sweep", self.claim_sweep).await?,
            sync: join("sync", self.sync).await?,
            chain_poll: join("chain_poll", self.chain_poll).await?,
        })
    }
}
