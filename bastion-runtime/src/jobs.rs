//! Background Jobs
//!
//! Runtime-owned periodic tasks. The claim sweep, sync loop and chain poll
//! live in their own crates; the jobs here cover what belongs to no single
//! component:
//!
//! - `cache_sweep_task`: expires and trims the response cache
//! - `event_relay_task`: logs every event and feeds war config thresholds to
//!   the chain monitor
//!
//! Both follow the same shape: a `watch` shutdown channel, a skip-on-miss
//! interval (or a channel receive), and counters returned on exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bastion_chain::ChainMonitor;
use bastion_events::BastionEvent;
use bastion_storage::ResponseCache;
use tokio::sync::{broadcast, watch};
use tokio::time::{interval, MissedTickBehavior};

// ============================================================================
// CACHE SWEEP
// ============================================================================

#[derive(Debug, Default)]
pub struct CacheSweepMetrics {
    pub sweeps: AtomicU64,
    pub expired: AtomicU64,
    pub evicted: AtomicU64,
}

impl CacheSweepMetrics {
    pub fn snapshot(&self) -> CacheSweepSnapshot {
        CacheSweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
            evicted: self.evicted.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSweepSnapshot {
    pub sweeps: u64,
    pub expired: u64,
    pub evicted: u64,
}

pub async fn cache_sweep_task(
    cache: Arc<ResponseCache>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<CacheSweepMetrics> {
    let metrics = Arc::new(CacheSweepMetrics::default());

    let mut sweep_interval = interval(every);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs(), "Cache sweep task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Cache sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                let report = cache.sweep().await;
                metrics.sweeps.fetch_add(1, Ordering::Relaxed);
                metrics.expired.fetch_add(report.expired as u64, Ordering::Relaxed);
                metrics.evicted.fetch_add(report.evicted as u64, Ordering::Relaxed);
                tracing::trace!(
                    expired = report.expired,
                    evicted = report.evicted,
                    remaining = report.remaining,
                    "Cache sweep pass"
                );
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        expired = snapshot.expired,
        evicted = snapshot.evicted,
        "Cache sweep task completed"
    );

    metrics
}

// ============================================================================
// EVENT RELAY
// ============================================================================

#[derive(Debug, Default)]
pub struct EventRelayMetrics {
    pub relayed: AtomicU64,
    /// Events dropped because the relay fell behind the bus
    pub lagged: AtomicU64,
}

impl EventRelayMetrics {
    pub fn snapshot(&self) -> EventRelaySnapshot {
        EventRelaySnapshot {
            relayed: self.relayed.load(Ordering::Relaxed),
            lagged: self.lagged.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRelaySnapshot {
    pub relayed: u64,
    pub lagged: u64,
}

fn log_event(event: &BastionEvent) {
    let event_type = event.event_type();
    match event {
        BastionEvent::ChainTick { state } => {
            tracing::trace!(event_type, current = state.current, timeout_secs = state.timeout_secs);
        }
        BastionEvent::RiskLevelChanged { previous, assessment } => tracing::info!(
            event_type,
            previous = previous.as_str(),
            level = assessment.level.as_str(),
            score = assessment.score
        ),
        BastionEvent::RiskWarning { assessment } => tracing::warn!(
            event_type,
            level = assessment.level.as_str(),
            recommendation = assessment.recommendation.as_deref().unwrap_or_default()
        ),
        BastionEvent::QuotaStuck { key, waits } => {
            tracing::warn!(event_type, key = %key, waits, "Call quota saturated, wait and retry");
        }
        BastionEvent::CredentialInvalid { reason } => {
            tracing::warn!(event_type, reason = %reason, "Credential needs re-authorization");
        }
        BastionEvent::StorageDegraded { message } => {
            tracing::warn!(event_type, message = %message, "Storage degraded");
        }
        BastionEvent::SyncApplied { claims, notes, config_changed } => {
            tracing::debug!(event_type, claims, notes, config_changed);
        }
        BastionEvent::WarConfigUpdated { config, previous_mode } => tracing::info!(
            event_type,
            previous_mode = previous_mode.as_str(),
            mode = config.mode.as_str()
        ),
        BastionEvent::NoteUpdated { note } => {
            tracing::debug!(event_type, target_id = %note.target_id, author_id = %note.author_id);
        }
        other => {
            if let Some(claim) = other.claim() {
                tracing::info!(
                    event_type,
                    claim_id = %claim.claim_id,
                    target_id = %claim.target_id,
                    actor_id = %claim.actor_id,
                    kind = claim.kind.as_db_str()
                );
            }
        }
    }
}

/// Log every event from `rx` and push war config thresholds into `chain`.
///
/// Takes an already-subscribed receiver so nothing published between
/// spawning and the first poll is missed.
pub async fn event_relay_task(
    mut rx: broadcast::Receiver<BastionEvent>,
    chain: ChainMonitor,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<EventRelayMetrics> {
    let metrics = Arc::new(EventRelayMetrics::default());

    tracing::info!("Event relay task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Event relay task shutting down");
                    break;
                }
            }

            received = rx.recv() => match received {
                Ok(event) => {
                    metrics.relayed.fetch_add(1, Ordering::Relaxed);
                    log_event(&event);
                    if let BastionEvent::WarConfigUpdated { config, .. } = event {
                        if config.thresholds != chain.thresholds() {
                            chain.set_thresholds(config.thresholds);
                        }
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    metrics.lagged.fetch_add(skipped, Ordering::Relaxed);
                    tracing::warn!(skipped, "Event relay lagged behind the bus");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        relayed = snapshot.relayed,
        lagged = snapshot.lagged,
        "Event relay task completed"
    );

    metrics
}
