//! Sliding-window call governor.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Dispatch instants within the trailing window.
///
/// A call is admitted only while fewer than `limit` calls were dispatched in
/// the last `window`, so no trailing window ever holds more than `limit`.
#[derive(Debug, Clone)]
pub struct CallWindow {
    limit: usize,
    window: Duration,
    calls: VecDeque<Instant>,
}

impl CallWindow {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            limit,
            window,
            calls: VecDeque::with_capacity(limit),
        }
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&oldest) = self.calls.front() {
            if oldest + self.window <= now {
                self.calls.pop_front();
            } else {
                break;
            }
        }
    }

    /// Record a dispatch at `now` if the window has room.
    pub fn try_acquire(&mut self, now: Instant) -> bool {
        self.prune(now);
        if self.calls.len() >= self.limit {
            return false;
        }
        self.calls.push_back(now);
        true
    }

    /// Calls counted in the window ending at `now`.
    pub fn in_window(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.calls.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_up_to_limit() {
        let start = Instant::now();
        let mut window = CallWindow::new(3, Duration::from_secs(60));
        assert!(window.try_acquire(start));
        assert!(window.try_acquire(start));
        assert!(window.try_acquire(start + Duration::from_secs(10)));
        assert!(!window.try_acquire(start + Duration::from_secs(20)));
        assert_eq!(window.in_window(start + Duration::from_secs(20)), 3);
        assert!(window.try_acquire(start + Duration::from_secs(60)));
    }

    #[test]
    fn test_slots_free_as_calls_age_out() {
        let start = Instant::now();
        let mut window = CallWindow::new(2, Duration::from_secs(60));
        assert!(window.try_acquire(start));
        assert!(window.try_acquire(start + Duration::from_secs(30)));
        assert!(!window.try_acquire(start + Duration::from_secs(59)));
        assert!(window.try_acquire(start + Duration::from_secs(60)));
        assert_eq!(window.in_window(start + Duration::from_secs(60)), 2);
    }
}
