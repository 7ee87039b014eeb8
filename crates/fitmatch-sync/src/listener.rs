//! # Listener Service
//!
//! The per-device demultiplexer: consumes raw channel traffic, inspects the
//! path, decodes the typed payload, and publishes a [`WearEvent`] to the
//! subscription registry.
//!
//! ## Dispatch Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Listener Dispatch                                  │
//! │                                                                         │
//! │  ChannelEvent                    WearEvent                              │
//! │  ────────────                    ─────────                              │
//! │  ItemChanged /fitmatch/product ─► decode payload ─► ProductPushed      │
//! │  Message /fitmatch/action/like ─► ActionPayload  ─► Action(LIKE)       │
//! │  Message /fitmatch/action/pass ─► ActionPayload  ─► Action(PASS)       │
//! │  Message /fitmatch/request/next─► (marker)       ─► Action(REQUEST)    │
//! │  Message /fitmatch/event/*     ─► EventPayload   ─► Delivery(...)      │
//! │  PeerConnected/Disconnected    ─► (as is)        ─► Peer events        │
//! │                                                                         │
//! │  Malformed payloads are logged and skipped; the loop never dies on     │
//! │  bad input from the peer.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use fitmatch_core::{ActionEvent, ActionKind, DeliveryEvent};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::channel::ChannelEvent;
use crate::codec::decode_product;
use crate::config::DeviceRole;
use crate::error::{SyncError, SyncResult};
use crate::paths::SyncPath;
use crate::protocol::{ActionPayload, EventPayload, ProductPayload};
use crate::subscription::{SubscriptionRegistry, WearEvent};

// =============================================================================
// Listener Service
// =============================================================================

/// Handle for controlling a running listener service.
#[derive(Clone)]
pub struct ListenerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl ListenerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("listener task stopped".into()))
    }
}

/// The per-device dispatch loop.
pub struct ListenerService {
    role: DeviceRole,
    events_rx: mpsc::Receiver<ChannelEvent>,
    registry: Arc<SubscriptionRegistry>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl ListenerService {
    /// Spawns the listener over a channel's event stream.
    pub fn spawn(
        role: DeviceRole,
        events_rx: mpsc::Receiver<ChannelEvent>,
        registry: Arc<SubscriptionRegistry>,
    ) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let service = ListenerService {
            role,
            events_rx,
            registry,
            shutdown_rx,
        };

        tokio::spawn(service.run());

        ListenerHandle { shutdown_tx }
    }

    /// Main dispatch loop.
    async fn run(mut self) {
        info!(role = %self.role, "Listener service starting");

        loop {
            tokio::select! {
                Some(event) = self.events_rx.recv() => {
                    self.dispatch(event);
                }

                _ = self.shutdown_rx.recv() => {
                    info!(role = %self.role, "Listener service shutting down");
                    break;
                }

                else => break,
            }
        }

        info!(role = %self.role, "Listener service stopped");
    }

    /// Routes one raw channel event to its typed form.
    fn dispatch(&self, event: ChannelEvent) {
        match event {
            ChannelEvent::ItemChanged {
                path: SyncPath::Product,
                payload,
                timestamp,
            } => match Self::decode_product_item(payload) {
                Ok(product) => {
                    debug!(role = %self.role, product = %product.id, "product pushed");
                    self.registry.publish(WearEvent::ProductPushed {
                        product,
                        timestamp_ms: timestamp,
                    });
                }
                Err(e) => {
                    warn!(role = %self.role, error = %e, "undecodable product item, skipping");
                }
            },

            ChannelEvent::ItemChanged { path, .. } => {
                debug!(role = %self.role, path = %path, "item write on a message path, ignoring");
            }

            ChannelEvent::MessageReceived {
                path,
                payload,
                timestamp,
            } => self.dispatch_message(path, payload, timestamp),

            ChannelEvent::PeerConnected { node } => {
                self.registry.publish(WearEvent::PeerConnected { node });
            }

            ChannelEvent::PeerDisconnected => {
                self.registry.publish(WearEvent::PeerDisconnected);
            }
        }
    }

    fn dispatch_message(&self, path: SyncPath, payload: serde_json::Value, timestamp: i64) {
        if let Some(kind) = path.action_kind() {
            let action = match kind {
                ActionKind::RequestNext => ActionEvent::request_next(timestamp),
                ActionKind::Like | ActionKind::Pass => {
                    match serde_json::from_value::<ActionPayload>(payload) {
                        Ok(action) if kind == ActionKind::Like => {
                            ActionEvent::like(action.product_id, timestamp)
                        }
                        Ok(action) => ActionEvent::pass(action.product_id, timestamp),
                        Err(e) => {
                            warn!(role = %self.role, path = %path, error = %e,
                                  "undecodable action payload, skipping");
                            return;
                        }
                    }
                }
            };

            debug!(role = %self.role, kind = %action.kind, "action received");
            self.registry.publish(WearEvent::Action(action));
            return;
        }

        if let Some(kind) = path.event_kind() {
            match serde_json::from_value::<EventPayload>(payload) {
                Ok(event) => {
                    debug!(role = %self.role, kind = %kind, "delivery event received");
                    self.registry.publish(WearEvent::Delivery(DeliveryEvent::new(
                        kind,
                        event.detail,
                        timestamp,
                    )));
                }
                Err(e) => {
                    warn!(role = %self.role, path = %path, error = %e,
                          "undecodable delivery event, skipping");
                }
            }
            return;
        }

        debug!(role = %self.role, path = %path, "message on an item path, ignoring");
    }

    /// Unwraps and decodes the product item payload.
    fn decode_product_item(payload: serde_json::Value) -> SyncResult<fitmatch_core::Product> {
        let envelope: ProductPayload = serde_json::from_value(payload)?;
        Ok(decode_product(&envelope.product)?)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encode_product;
    use crate::subscription::EventKind;
    use fitmatch_core::{DeliveryEventKind, Money, Product};
    use serde_json::json;

    fn sample_product() -> Product {
        Product::new(
            "sku-123",
            "Denim Jacket",
            "Acme",
            Money::from_minor_units(7999),
            "https://img.example.com/sku-123.jpg",
            "jackets",
            "blue",
        )
    }

    async fn rig(
        role: DeviceRole,
    ) -> (
        mpsc::Sender<ChannelEvent>,
        Arc<SubscriptionRegistry>,
        ListenerHandle,
    ) {
        let registry = Arc::new(SubscriptionRegistry::default());
        let (events_tx, events_rx) = mpsc::channel(16);
        let listener = ListenerService::spawn(role, events_rx, registry.clone());
        (events_tx, registry, listener)
    }

    #[tokio::test]
    async fn test_product_item_is_decoded_and_published() {
        let (events_tx, registry, _listener) = rig(DeviceRole::Watch).await;
        let mut products = registry.subscribe(EventKind::Product);

        let encoded = encode_product(&sample_product()).unwrap();
        events_tx
            .send(ChannelEvent::ItemChanged {
                path: SyncPath::Product,
                payload: json!({"product": encoded}),
                timestamp: 42,
            })
            .await
            .unwrap();

        match products.recv().await {
            Some(WearEvent::ProductPushed {
                product,
                timestamp_ms,
            }) => {
                assert_eq!(product, sample_product());
                assert_eq!(timestamp_ms, 42);
            }
            other => panic!("expected ProductPushed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_product_is_skipped() {
        let (events_tx, registry, _listener) = rig(DeviceRole::Watch).await;
        let mut products = registry.subscribe(EventKind::Product);

        events_tx
            .send(ChannelEvent::ItemChanged {
                path: SyncPath::Product,
                payload: json!({"product": "not json"}),
                timestamp: 1,
            })
            .await
            .unwrap();

        // A good item after the bad one still gets through.
        let encoded = encode_product(&sample_product()).unwrap();
        events_tx
            .send(ChannelEvent::ItemChanged {
                path: SyncPath::Product,
                payload: json!({"product": encoded}),
                timestamp: 2,
            })
            .await
            .unwrap();

        match products.recv().await {
            Some(WearEvent::ProductPushed { timestamp_ms, .. }) => assert_eq!(timestamp_ms, 2),
            other => panic!("expected ProductPushed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_actions_are_decoded() {
        let (events_tx, registry, _listener) = rig(DeviceRole::Phone).await;
        let mut actions = registry.subscribe(EventKind::Action);

        events_tx
            .send(ChannelEvent::MessageReceived {
                path: SyncPath::ActionLike,
                payload: json!({"productId": "sku-123"}),
                timestamp: 7,
            })
            .await
            .unwrap();

        events_tx
            .send(ChannelEvent::MessageReceived {
                path: SyncPath::RequestNext,
                payload: json!({}),
                timestamp: 8,
            })
            .await
            .unwrap();

        match actions.recv().await {
            Some(WearEvent::Action(event)) => {
                assert_eq!(event.kind, ActionKind::Like);
                assert_eq!(event.product_id.as_deref(), Some("sku-123"));
                assert_eq!(event.timestamp_ms, 7);
            }
            other => panic!("expected LIKE, got {:?}", other),
        }

        match actions.recv().await {
            Some(WearEvent::Action(event)) => {
                assert_eq!(event.kind, ActionKind::RequestNext);
                assert!(event.product_id.is_none());
            }
            other => panic!("expected REQUEST_NEXT, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_delivery_events_are_decoded() {
        let (events_tx, registry, _listener) = rig(DeviceRole::Watch).await;
        let mut delivery = registry.subscribe(EventKind::Delivery);

        events_tx
            .send(ChannelEvent::MessageReceived {
                path: SyncPath::EventNavigation,
                payload: json!({"detail": "turn left on 5th"}),
                timestamp: 9,
            })
            .await
            .unwrap();

        match delivery.recv().await {
            Some(WearEvent::Delivery(event)) => {
                assert_eq!(event.kind, DeliveryEventKind::Navigation);
                assert_eq!(event.detail.as_deref(), Some("turn left on 5th"));
            }
            other => panic!("expected Delivery, got {:?}", other),
        }
    }
}
