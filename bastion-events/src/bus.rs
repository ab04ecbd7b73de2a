//! Broadcast event bus.

use crate::BastionEvent;
use bastion_core::constants::DEFAULT_EVENT_CAPACITY;
use tokio::sync::broadcast;
use tracing::debug;

/// Process-wide publish/subscribe channel. Cheap to clone; clones share the
/// same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<BastionEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber. Never blocks; with no
    /// subscribers the event is dropped.
    pub fn publish(&self, event: BastionEvent) {
        let event_type = event.event_type();
        match self.tx.send(event) {
            Ok(receivers) => {
                debug!(event_type, receivers, "Published event");
            }
            Err(_) => {
                debug!(event_type, "No subscribers for event");
            }
        }
    }

    /// Receive every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BastionEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
