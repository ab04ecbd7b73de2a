//! User activity tracking for the adaptive sync period.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use bastion_core::SyncConfig;
use tokio::time::Instant;

/// Picks the sync period from how recently the user was active.
#[derive(Debug)]
pub struct ActivityTracker {
    last_active: Mutex<Instant>,
    active_interval: Duration,
    idle_interval: Duration,
    idle_after: Duration,
}

impl ActivityTracker {
    /// Starts out active.
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            last_active: Mutex::new(Instant::now()),
            active_interval: config.active_interval(),
            idle_interval: config.idle_interval(),
            idle_after: config.idle_after(),
        }
    }

    pub fn record(&self) {
        *self.last_active.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    pub fn is_active(&self) -> bool {
        let last = *self.last_active.lock().unwrap_or_else(PoisonError::into_inner);
        last.elapsed() < self.idle_after
    }

    pub fn interval(&self) -> Duration {
        if self.is_active() {
            self.active_interval
        } else {
            self.idle_interval
        }
    }
}
