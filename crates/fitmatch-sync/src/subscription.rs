//! # Subscription Registry
//!
//! Fan-out of decoded protocol events to any number of subscribers.
//!
//! The registry replaces the single-callback-slot pattern: each event kind
//! has an ordered list of subscribers, each with its own channel, and a
//! bounded replay buffer for events that arrive before anyone subscribes.
//! A LIKE that lands while the phone UI is still wiring itself up is held
//! and handed to the first subscriber instead of vanishing.
//!
//! Replay semantics: events published while a kind has zero subscribers are
//! buffered (up to the configured capacity, oldest dropped first) and
//! flushed to the first subscriber of that kind. Once at least one
//! subscriber exists, events are delivered live and nothing is buffered.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use fitmatch_core::{ActionEvent, DeliveryEvent, Node, Product};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Default capacity of each per-kind replay buffer.
pub const DEFAULT_REPLAY_CAPACITY: usize = 16;

// =============================================================================
// Events
// =============================================================================

/// A decoded protocol event, as surfaced to subscribers.
#[derive(Debug, Clone)]
pub enum WearEvent {
    /// The peer pushed a product to the discovery feed.
    ProductPushed {
        product: Product,
        timestamp_ms: i64,
    },

    /// The peer sent a LIKE, PASS, or REQUEST_NEXT.
    Action(ActionEvent),

    /// The peer sent a delivery-tracking event.
    Delivery(DeliveryEvent),

    /// The companion device connected.
    PeerConnected { node: Node },

    /// The companion device disconnected.
    PeerDisconnected,
}

/// Subscription routing key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Pushed products.
    Product,
    /// Like/pass/request actions.
    Action,
    /// Delivery-tracking events.
    Delivery,
    /// Peer connectivity changes.
    Peer,
}

impl WearEvent {
    /// Returns the routing key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            WearEvent::ProductPushed { .. } => EventKind::Product,
            WearEvent::Action(_) => EventKind::Action,
            WearEvent::Delivery(_) => EventKind::Delivery,
            WearEvent::PeerConnected { .. } | WearEvent::PeerDisconnected => EventKind::Peer,
        }
    }
}

// =============================================================================
// Registry
// =============================================================================

struct Inner {
    subscribers: HashMap<EventKind, Vec<mpsc::UnboundedSender<WearEvent>>>,
    replay: HashMap<EventKind, VecDeque<WearEvent>>,
    replay_capacity: usize,
}

/// Multi-subscriber event registry with bounded replay.
pub struct SubscriptionRegistry {
    inner: Mutex<Inner>,
}

impl SubscriptionRegistry {
    /// Creates a registry with the given per-kind replay capacity.
    pub fn new(replay_capacity: usize) -> Self {
        SubscriptionRegistry {
            inner: Mutex::new(Inner {
                subscribers: HashMap::new(),
                replay: HashMap::new(),
                replay_capacity,
            }),
        }
    }

    /// Subscribes to one event kind.
    ///
    /// If events of this kind were published before any subscriber existed,
    /// they are delivered first, in publish order.
    pub fn subscribe(&self, kind: EventKind) -> mpsc::UnboundedReceiver<WearEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        if let Some(buffered) = inner.replay.remove(&kind) {
            debug!(?kind, count = buffered.len(), "replaying buffered events");
            for event in buffered {
                // The receiver was created a moment ago; it cannot be closed.
                let _ = tx.send(event);
            }
        }

        inner.subscribers.entry(kind).or_default().push(tx);
        rx
    }

    /// Publishes an event to all subscribers of its kind.
    ///
    /// Closed subscribers are pruned. With zero live subscribers the event
    /// goes to the replay buffer instead.
    pub fn publish(&self, event: WearEvent) {
        let kind = event.kind();
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);

        let delivered = match inner.subscribers.get_mut(&kind) {
            Some(senders) => {
                senders.retain(|tx| tx.send(event.clone()).is_ok());
                !senders.is_empty()
            }
            None => false,
        };

        if !delivered {
            let capacity = inner.replay_capacity;
            let buffer = inner.replay.entry(kind).or_default();
            if buffer.len() == capacity {
                warn!(?kind, capacity, "replay buffer full, dropping oldest event");
                buffer.pop_front();
            }
            buffer.push_back(event);
            debug!(?kind, buffered = buffer.len(), "event buffered for late subscriber");
        }
    }

    /// Returns the number of live subscribers for a kind (diagnostics).
    pub fn subscriber_count(&self, kind: EventKind) -> usize {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        match inner.subscribers.get_mut(&kind) {
            Some(senders) => {
                senders.retain(|tx| !tx.is_closed());
                senders.len()
            }
            None => 0,
        }
    }
}

impl Default for SubscriptionRegistry {
    fn default() -> Self {
        SubscriptionRegistry::new(DEFAULT_REPLAY_CAPACITY)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn action(ts: i64) -> WearEvent {
        WearEvent::Action(ActionEvent::like("sku-1", ts))
    }

    #[test]
    fn test_live_delivery_to_multiple_subscribers() {
        let registry = SubscriptionRegistry::default();
        let mut first = registry.subscribe(EventKind::Action);
        let mut second = registry.subscribe(EventKind::Action);

        registry.publish(action(1));

        assert!(matches!(first.try_recv(), Ok(WearEvent::Action(_))));
        assert!(matches!(second.try_recv(), Ok(WearEvent::Action(_))));
    }

    #[test]
    fn test_late_subscriber_receives_buffered_events() {
        let registry = SubscriptionRegistry::default();

        registry.publish(action(1));
        registry.publish(action(2));

        let mut rx = registry.subscribe(EventKind::Action);
        match rx.try_recv() {
            Ok(WearEvent::Action(event)) => assert_eq!(event.timestamp_ms, 1),
            other => panic!("expected buffered action, got {:?}", other),
        }
        match rx.try_recv() {
            Ok(WearEvent::Action(event)) => assert_eq!(event.timestamp_ms, 2),
            other => panic!("expected buffered action, got {:?}", other),
        }
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_replay_buffer_is_bounded() {
        let registry = SubscriptionRegistry::new(2);

        registry.publish(action(1));
        registry.publish(action(2));
        registry.publish(action(3)); // evicts the oldest

        let mut rx = registry.subscribe(EventKind::Action);
        match rx.try_recv() {
            Ok(WearEvent::Action(event)) => assert_eq!(event.timestamp_ms, 2),
            other => panic!("expected action(2), got {:?}", other),
        }
        match rx.try_recv() {
            Ok(WearEvent::Action(event)) => assert_eq!(event.timestamp_ms, 3),
            other => panic!("expected action(3), got {:?}", other),
        }
    }

    #[test]
    fn test_kinds_are_isolated() {
        let registry = SubscriptionRegistry::default();
        let mut products = registry.subscribe(EventKind::Product);

        registry.publish(action(1));
        assert!(products.try_recv().is_err());
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let registry = SubscriptionRegistry::default();
        let rx = registry.subscribe(EventKind::Action);
        assert_eq!(registry.subscriber_count(EventKind::Action), 1);

        drop(rx);
        registry.publish(action(1));
        assert_eq!(registry.subscriber_count(EventKind::Action), 0);

        // With the only subscriber gone, the event was buffered instead.
        let mut rx = registry.subscribe(EventKind::Action);
        assert!(matches!(rx.try_recv(), Ok(WearEvent::Action(_))));
    }
}
