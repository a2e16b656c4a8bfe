//! Event bus for publishing and subscribing to search events
//!
//! One bus per request. Workers publish concurrently; the broadcast
//! channel serializes sends, so the single subscriber observes a totally
//! ordered event history.

use tokio::sync::broadcast;

use super::errors::EventBusError;
use super::metrics::EventBusMetrics;
use super::types::SearchEvent;

/// Default channel capacity; progressive snapshots can be large, so the
/// buffer stays modest and subscribers are expected to keep draining.
const DEFAULT_CAPACITY: usize = 256;

/// Broadcast-backed event bus for one search request.
#[derive(Debug)]
pub struct SearchEventBus {
    sender: broadcast::Sender<SearchEvent>,
    metrics: EventBusMetrics,
}

impl SearchEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a bus with a specific buffer capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            metrics: EventBusMetrics::new(),
        }
    }

    /// Subscribe to all subsequent events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SearchEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to the subscriber.
    ///
    /// Publishing without a subscriber is not an error for the caller: the
    /// event is counted as dropped and the request proceeds. Workers never
    /// stall on the event path.
    pub fn publish(&self, event: SearchEvent) -> Result<usize, EventBusError> {
        log::debug!("Publishing event: {}", event.kind());
        match self.sender.send(event) {
            Ok(subscriber_count) => {
                self.metrics.increment_published();
                self.metrics.update_subscriber_count(subscriber_count);
                Ok(subscriber_count)
            }
            Err(_) => {
                self.metrics.increment_dropped();
                Err(EventBusError::NoSubscribers)
            }
        }
    }

    /// Current metrics counters.
    #[must_use]
    pub fn metrics(&self) -> &EventBusMetrics {
        &self.metrics
    }
}

impl Default for SearchEventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_events_in_order() {
        let bus = SearchEventBus::new();
        let mut rx = bus.subscribe();

        bus.publish(SearchEvent::combinations_generated(3))
            .expect("publish succeeds");
        bus.publish(SearchEvent::loading("warming up"))
            .expect("publish succeeds");

        let first = rx.recv().await.expect("first event");
        let second = rx.recv().await.expect("second event");
        assert_eq!(first.kind(), "combinations_generated");
        assert_eq!(second.kind(), "loading");
    }

    #[tokio::test]
    async fn publish_without_subscriber_counts_dropped() {
        let bus = SearchEventBus::new();
        assert!(bus.publish(SearchEvent::loading("nobody home")).is_err());
        let snapshot = bus.metrics().snapshot();
        assert_eq!(snapshot.events_dropped, 1);
        assert_eq!(snapshot.events_published, 0);
    }
}
