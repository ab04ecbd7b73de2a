//! Claim Expiry Sweep
//!
//! Background task that expires active claims past their `expires_at` on a
//! fixed interval. Mutating operations also expire due claims on the way in,
//! so the sweep only bounds how long an abandoned claim can linger.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::service::ClaimArbiter;

// ============================================================================
// METRICS
// ============================================================================

/// Counters for the expiry sweep.
#[derive(Debug, Default)]
pub struct ClaimSweepMetrics {
    /// Sweep passes completed
    pub sweeps: AtomicU64,

    /// Claims transitioned to `expired`
    pub expired: AtomicU64,
}

impl ClaimSweepMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ClaimSweepSnapshot {
        ClaimSweepSnapshot {
            sweeps: self.sweeps.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimSweepSnapshot {
    pub sweeps: u64,
    pub expired: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Run [`ClaimArbiter::expire_sweep`] every `every` until shutdown.
pub async fn claim_sweep_task(
    arbiter: Arc<ClaimArbiter>,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ClaimSweepMetrics> {
    let metrics = Arc::new(ClaimSweepMetrics::new());

    let mut sweep_interval = interval(every);
    sweep_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs(), "Claim sweep task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Claim sweep task shutting down");
                    break;
                }
            }

            _ = sweep_interval.tick() => {
                let expired = arbiter.expire_sweep();
                metrics.sweeps.fetch_add(1, Ordering::Relaxed);
                metrics.expired.fetch_add(expired.len() as u64, Ordering::Relaxed);
                tracing::trace!(expired = expired.len(), "Claim sweep pass");
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        sweeps = snapshot.sweeps,
        expired = snapshot.expired,
        "Claim sweep task completed"
    );

    metrics
}

#[cfg(test)]
mod tests {
    use super::*;
    use bastion_core::{ClaimKind, ClaimStatus, CreateClaim, KindTtls, ManualClock, WarConfig};
    use bastion_events::EventBus;

    #[tokio::test(start_paused = true)]
    async fn test_sweep_task_expires_and_stops() {
        let clock = ManualClock::starting_now();
        let arbiter = Arc::new(ClaimArbiter::new(
            WarConfig::default().with_kind_ttls(KindTtls::uniform(5)),
            Arc::new(clock.clone()),
            EventBus::new(16),
        ));
        let outcome = arbiter
            .create_claim(CreateClaim::new("42", "A", ClaimKind::Hit))
            .expect("valid request");
        let id = outcome.claim.expect("claim").claim_id;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(claim_sweep_task(
            Arc::clone(&arbiter),
            Duration::from_secs(30),
            shutdown_rx,
        ));

        clock.advance(Duration::from_secs(10));
        tokio::time::sleep(Duration::from_secs(31)).await;
        assert_eq!(
            arbiter.claim(&id).expect("claim kept").status,
            ClaimStatus::Expired
        );

        shutdown_tx.send(true).expect("task alive");
        let metrics = handle.await.expect("task joins");
        let snapshot = metrics.snapshot();
        assert!(snapshot.sweeps >= 2);
        assert_eq!(snapshot.expired, 1);
    }
}
