//! # Watch-Side Synchronization Manager
//!
//! Owns the watch's half of the protocol: requesting the next product and
//! sending LIKE / PASS actions for the card on screen. The watch UI above
//! this manager renders the product subscription and calls the action
//! methods from its buttons.
//!
//! All outbound watch traffic rides the addressed message channel: it is
//! delivered now or fails now. Two quick LIKEs are two messages; an
//! unreachable phone is an error the button handler sees immediately.

use std::sync::Arc;

use fitmatch_core::{DeliveryEventKind, Node};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channel::{ChannelHandle, ChannelSettings, Delivery, DeviceChannel};
use crate::config::{DeviceRole, ProtocolSettings, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::link::LinkEndpoint;
use crate::listener::{ListenerHandle, ListenerService};
use crate::paths::SyncPath;
use crate::protocol::EventPayload;
use crate::subscription::{EventKind, SubscriptionRegistry, WearEvent};
use crate::transport::{DialerConfig, DialerHandle, WsDialer};

// =============================================================================
// Watch Sync Manager
// =============================================================================

/// The watch's protocol surface.
pub struct WatchSyncManager {
    channel: ChannelHandle,
    registry: Arc<SubscriptionRegistry>,
    listener: ListenerHandle,
    dialer: Option<DialerHandle>,
}

impl WatchSyncManager {
    /// Starts the full watch stack: dialer, device channel, listener.
    pub async fn start(config: &SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        if config.role() != DeviceRole::Watch {
            return Err(SyncError::InvalidConfig(
                "watch manager requires the watch role".into(),
            ));
        }

        // validate() guarantees the watch role carries a peer URL.
        let url = config
            .peer_url()
            .ok_or_else(|| SyncError::InvalidConfig("peer_url is required".into()))?
            .to_string();

        let identity = config.node();
        info!(device = %identity, url = %url, "Starting watch sync manager");

        let (endpoint, dialer) = WsDialer::spawn(
            DialerConfig::from_settings(&config.link, url),
            identity.clone(),
        );

        Ok(Self::assemble(
            identity,
            endpoint,
            Some(dialer),
            &config.protocol,
        ))
    }

    /// Assembles the manager over an already-built link endpoint.
    ///
    /// Used by tests and local rigs that pair two managers in process.
    pub fn over_link(
        identity: Node,
        endpoint: LinkEndpoint,
        protocol: &ProtocolSettings,
    ) -> Self {
        Self::assemble(identity, endpoint, None, protocol)
    }

    fn assemble(
        identity: Node,
        endpoint: LinkEndpoint,
        dialer: Option<DialerHandle>,
        protocol: &ProtocolSettings,
    ) -> Self {
        let registry = Arc::new(SubscriptionRegistry::new(protocol.replay_capacity));

        let (channel, events) = DeviceChannel::spawn(
            identity,
            endpoint,
            ChannelSettings {
                op_timeout: protocol.op_timeout(),
            },
        );

        let listener = ListenerService::spawn(DeviceRole::Watch, events, registry.clone());

        WatchSyncManager {
            channel,
            registry,
            listener,
            dialer,
        }
    }

    // =========================================================================
    // Protocol Operations
    // =========================================================================

    /// Asks the phone to push the next product.
    pub async fn request_next_product(&self) -> SyncResult<Delivery> {
        let node = self.phone_node().await?;
        debug!("requesting next product");

        self.channel
            .send_message(&node.id, SyncPath::RequestNext, json!({}))
            .await
    }

    /// Sends a LIKE for the given product.
    pub async fn send_like(&self, product_id: &str) -> SyncResult<Delivery> {
        self.send_action(SyncPath::ActionLike, product_id).await
    }

    /// Sends a PASS for the given product.
    pub async fn send_pass(&self, product_id: &str) -> SyncResult<Delivery> {
        self.send_action(SyncPath::ActionPass, product_id).await
    }

    /// Sends a delivery-tracking event to the phone.
    pub async fn send_delivery_event(
        &self,
        kind: DeliveryEventKind,
        detail: Option<&str>,
    ) -> SyncResult<Delivery> {
        let node = self.phone_node().await?;
        let payload = serde_json::to_value(EventPayload {
            detail: detail.map(String::from),
        })?;

        self.channel
            .send_message(&node.id, SyncPath::for_event(kind), payload)
            .await
    }

    async fn send_action(&self, path: SyncPath, product_id: &str) -> SyncResult<Delivery> {
        fitmatch_core::validation::validate_product_id(product_id)?;

        let node = self.phone_node().await?;
        debug!(path = %path, product = %product_id, "sending action");

        self.channel
            .send_message(&node.id, path, json!({ "productId": product_id }))
            .await
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribes to products pushed by the phone.
    pub fn products(&self) -> mpsc::UnboundedReceiver<WearEvent> {
        self.registry.subscribe(EventKind::Product)
    }

    /// Subscribes to delivery-tracking events from the phone.
    pub fn delivery_events(&self) -> mpsc::UnboundedReceiver<WearEvent> {
        self.registry.subscribe(EventKind::Delivery)
    }

    /// Subscribes to phone connect/disconnect events.
    pub fn peer_events(&self) -> mpsc::UnboundedReceiver<WearEvent> {
        self.registry.subscribe(EventKind::Peer)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Shuts down the watch stack.
    pub async fn shutdown(&self) -> SyncResult<()> {
        info!("Shutting down watch sync manager");
        let _ = self.listener.shutdown().await;
        let _ = self.channel.shutdown().await;
        if let Some(ref dialer) = self.dialer {
            let _ = dialer.shutdown().await;
        }
        Ok(())
    }

    /// Resolves the phone node from a fresh discovery snapshot.
    ///
    /// The snapshot is used once and discarded, never cached.
    async fn phone_node(&self) -> SyncResult<Node> {
        self.channel
            .list_connected_nodes()
            .await?
            .into_iter()
            .next()
            .ok_or(SyncError::NotConnected)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::{LinkControl, MemoryLink};
    use crate::phone::PhoneSyncManager;
    use fitmatch_core::{ActionKind, Money, Product};
    use std::time::Duration;

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

    /// Builds a fully wired phone+watch pair over an in-memory link.
    fn rig() -> (PhoneSyncManager, WatchSyncManager, LinkControl) {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();

        let phone_node = Node::new("node-p", "Phone");
        let watch_node = Node::new("node-w", "Pixel Watch");
        let (a, b, control) = MemoryLink::pair(phone_node.clone(), watch_node.clone());

        let protocol = ProtocolSettings::default();
        let phone = PhoneSyncManager::over_link(phone_node, a, &protocol);
        let watch = WatchSyncManager::over_link(watch_node, b, &protocol);

        (phone, watch, control)
    }

    #[tokio::test]
    async fn test_request_then_push_round_trip() {
        let (phone, watch, _control) = rig();
        let mut phone_actions = phone.actions();
        let mut watch_products = watch.products();

        // Watch asks for the next product.
        let delivery = watch.request_next_product().await.unwrap();
        assert!(matches!(delivery, Delivery::Sent { node } if node.id == "node-p"));

        // Phone observes the request, with no payload beyond the timestamp.
        match phone_actions.recv().await {
            Some(WearEvent::Action(event)) => {
                assert_eq!(event.kind, ActionKind::RequestNext);
                assert!(event.product_id.is_none());
                assert!(event.timestamp_ms > 0);
            }
            other => panic!("expected REQUEST_NEXT, got {:?}", other),
        }

        // Phone answers with a product; the watch decodes it correctly.
        phone.push_product(&sample_product()).await.unwrap();
        match watch_products.recv().await {
            Some(WearEvent::ProductPushed { product, .. }) => {
                assert_eq!(product, sample_product());
            }
            other => panic!("expected ProductPushed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_like_and_pass_arrive_in_order() {
        let (phone, watch, _control) = rig();
        let mut actions = phone.actions();

        watch.send_like("sku-123").await.unwrap();
        watch.send_pass("sku-456").await.unwrap();

        match actions.recv().await {
            Some(WearEvent::Action(event)) => {
                assert_eq!(event.kind, ActionKind::Like);
                assert_eq!(event.product_id.as_deref(), Some("sku-123"));
            }
            other => panic!("expected LIKE, got {:?}", other),
        }

        match actions.recv().await {
            Some(WearEvent::Action(event)) => {
                assert_eq!(event.kind, ActionKind::Pass);
                assert_eq!(event.product_id.as_deref(), Some("sku-456"));
            }
            other => panic!("expected PASS, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_like_fails_when_phone_unreachable() {
        let (_phone, watch, control) = rig();

        control.sever();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Airplane mode: the call fails with a transport error and leaves
        // nothing queued behind it.
        let result = watch.send_like("sku-123").await;
        match result {
            Err(e) => assert!(e.is_retryable(), "expected a transport error, got {}", e),
            Ok(d) => panic!("expected failure, got {:?}", d),
        }
    }

    #[tokio::test]
    async fn test_every_like_is_forwarded_as_a_new_event() {
        let (phone, watch, _control) = rig();
        let mut actions = phone.actions();

        // Two LIKEs for the same product are two events, never deduplicated.
        watch.send_like("sku-123").await.unwrap();
        watch.send_like("sku-123").await.unwrap();

        for _ in 0..2 {
            match actions.recv().await {
                Some(WearEvent::Action(event)) => {
                    assert_eq!(event.kind, ActionKind::Like);
                    assert_eq!(event.product_id.as_deref(), Some("sku-123"));
                }
                other => panic!("expected LIKE, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_invalid_product_id_is_rejected_before_send() {
        let (_phone, watch, _control) = rig();

        let result = watch.send_like("").await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test]
    async fn test_watch_delivery_event_reaches_phone() {
        let (phone, watch, _control) = rig();
        let mut delivery = phone.delivery_events();

        watch
            .send_delivery_event(DeliveryEventKind::Chat, Some("On my way"))
            .await
            .unwrap();

        match delivery.recv().await {
            Some(WearEvent::Delivery(event)) => {
                assert_eq!(event.kind, DeliveryEventKind::Chat);
                assert_eq!(event.detail.as_deref(), Some("On my way"));
            }
            other => panic!("expected Delivery, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_peer_events_track_connectivity() {
        let (_phone, watch, control) = rig();
        let mut peers = watch.peer_events();

        // The initial connect is buffered for this late subscriber.
        match peers.recv().await {
            Some(WearEvent::PeerConnected { node }) => assert_eq!(node.id, "node-p"),
            other => panic!("expected PeerConnected, got {:?}", other),
        }

        control.sever();
        match peers.recv().await {
            Some(WearEvent::PeerDisconnected) => {}
            other => panic!("expected PeerDisconnected, got {:?}", other),
        }
    }
}
