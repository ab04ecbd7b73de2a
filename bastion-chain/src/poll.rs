//! Chain Poll Task
//!
//! Background task that calls [`ChainMonitor::refresh_now`] on a fixed
//! interval. A failed poll is recorded on the state and never ends the loop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::monitor::ChainMonitor;

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
pub struct ChainPollMetrics {
    /// Polls attempted
    pub polls: AtomicU64,

    /// Polls that left an error on the state
    pub failures: AtomicU64,
}

impl ChainPollMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ChainPollSnapshot {
        ChainPollSnapshot {
            polls: self.polls.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPollSnapshot {
    pub polls: u64,
    pub failures: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

pub async fn chain_poll_task(
    monitor: ChainMonitor,
    every: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<ChainPollMetrics> {
    let metrics = Arc::new(ChainPollMetrics::new());

    let mut poll_interval = interval(every);
    poll_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(interval_secs = every.as_secs(), "Chain poll task started");

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("Chain poll task shutting down");
                    break;
                }
            }

            _ = poll_interval.tick() => {
                let state = monitor.refresh_now().await;
                metrics.polls.fetch_add(1, Ordering::Relaxed);
                if state.last_error_message.is_some() {
                    metrics.failures.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        polls = snapshot.polls,
        failures = snapshot.failures,
        "Chain poll task completed"
    );

    metrics
}
