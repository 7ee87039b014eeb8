//! # Phone-Side Synchronization Manager
//!
//! Owns the phone's half of the protocol: pushing the current discovery
//! product, discovering the paired watch, and exchanging delivery-tracking
//! events. The catalog/view-model above this manager supplies the products
//! and consumes the action subscriptions.
//!
//! A product push is fire-and-forget with respect to watch receipt: success
//! means the local data layer accepted the write, nothing more.

use std::sync::Arc;

use fitmatch_core::{DeliveryEventKind, Node, Product};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::channel::{ChannelHandle, ChannelSettings, Delivery, DeviceChannel};
use crate::codec::encode_product;
use crate::config::{DeviceRole, ProtocolSettings, SyncConfig};
use crate::error::{SyncError, SyncResult};
use crate::host::{HostConfig, HostHandle, LinkHost};
use crate::link::LinkEndpoint;
use crate::listener::{ListenerHandle, ListenerService};
use crate::paths::SyncPath;
use crate::protocol::EventPayload;
use crate::subscription::{EventKind, SubscriptionRegistry, WearEvent};

// =============================================================================
// Phone Sync Manager
// =============================================================================

/// The phone's protocol surface.
pub struct PhoneSyncManager {
    channel: ChannelHandle,
    registry: Arc<SubscriptionRegistry>,
    listener: ListenerHandle,
    host: Option<HostHandle>,
}

impl PhoneSyncManager {
    /// Starts the full phone stack: link host, device channel, listener.
    pub async fn start(config: &SyncConfig) -> SyncResult<Self> {
        config.validate()?;
        if config.role() != DeviceRole::Phone {
            return Err(SyncError::InvalidConfig(
                "phone manager requires the phone role".into(),
            ));
        }

        let identity = config.node();
        info!(device = %identity, "Starting phone sync manager");

        let (endpoint, host) =
            LinkHost::start(HostConfig::from_settings(&config.link), identity.clone()).await?;

        Ok(Self::assemble(
            identity,
            endpoint,
            Some(host),
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
        host: Option<HostHandle>,
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

        let listener = ListenerService::spawn(DeviceRole::Phone, events, registry.clone());

        PhoneSyncManager {
            channel,
            registry,
            listener,
            host,
        }
    }

    // =========================================================================
    // Protocol Operations
    // =========================================================================

    /// Pushes a product to the watch's discovery feed.
    ///
    /// The product is validated, encoded, and written to the product path
    /// with a fresh timestamp. Any watch listening on that path receives an
    /// item-changed event; no receipt comes back.
    pub async fn push_product(&self, product: &Product) -> SyncResult<Delivery> {
        fitmatch_core::validation::validate_product(product)?;

        let encoded = encode_product(product)?;
        debug!(product = %product.id, "pushing product");

        self.channel
            .put_item(SyncPath::Product, json!({ "product": encoded }))
            .await
    }

    /// Returns a point-in-time snapshot of connected watch nodes.
    ///
    /// `Ok(vec![])` means verified-none; a failed discovery is an error.
    pub async fn list_connected_nodes(&self) -> SyncResult<Vec<Node>> {
        self.channel.list_connected_nodes().await
    }

    /// Sends a delivery-tracking event to the connected watch.
    pub async fn send_delivery_event(
        &self,
        kind: DeliveryEventKind,
        detail: Option<&str>,
    ) -> SyncResult<Delivery> {
        let node = self.companion().await?;
        let payload = serde_json::to_value(EventPayload {
            detail: detail.map(String::from),
        })?;

        self.channel
            .send_message(&node.id, SyncPath::for_event(kind), payload)
            .await
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribes to LIKE / PASS / REQUEST_NEXT actions from the watch.
    pub fn actions(&self) -> mpsc::UnboundedReceiver<WearEvent> {
        self.registry.subscribe(EventKind::Action)
    }

    /// Subscribes to delivery-tracking events from the watch.
    pub fn delivery_events(&self) -> mpsc::UnboundedReceiver<WearEvent> {
        self.registry.subscribe(EventKind::Delivery)
    }

    /// Subscribes to watch connect/disconnect events.
    pub fn peer_events(&self) -> mpsc::UnboundedReceiver<WearEvent> {
        self.registry.subscribe(EventKind::Peer)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Shuts down the phone stack.
    pub async fn shutdown(&self) -> SyncResult<()> {
        info!("Shutting down phone sync manager");
        let _ = self.listener.shutdown().await;
        let _ = self.channel.shutdown().await;
        if let Some(ref host) = self.host {
            let _ = host.shutdown().await;
        }
        Ok(())
    }

    /// Resolves the single connected companion node.
    async fn companion(&self) -> SyncResult<Node> {
        self.list_connected_nodes()
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
    use crate::watch::WatchSyncManager;
    use fitmatch_core::Money;
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
        .with_size("M")
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
    async fn test_push_product_reaches_watch_decoded() {
        let (phone, watch, _control) = rig();
        let mut products = watch.products();

        let delivery = phone.push_product(&sample_product()).await.unwrap();
        assert_eq!(delivery, Delivery::Local);

        match products.recv().await {
            Some(WearEvent::ProductPushed { product, .. }) => {
                assert_eq!(product, sample_product());
            }
            other => panic!("expected ProductPushed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_pushing_twice_never_corrupts() {
        let (phone, watch, _control) = rig();
        let mut products = watch.products();

        phone.push_product(&sample_product()).await.unwrap();
        phone.push_product(&sample_product()).await.unwrap();

        // The watch observes the product at most twice, each instance whole.
        let mut seen = 0;
        while seen < 2 {
            match tokio::time::timeout(Duration::from_secs(1), products.recv()).await {
                Ok(Some(WearEvent::ProductPushed { product, .. })) => {
                    assert_eq!(product, sample_product());
                    seen += 1;
                }
                Ok(other) => panic!("expected ProductPushed, got {:?}", other),
                Err(_) => break, // second write may coalesce; once is fine
            }
        }
        assert!(seen >= 1);
    }

    #[tokio::test]
    async fn test_invalid_product_is_rejected_before_send() {
        let (phone, _watch, _control) = rig();

        let mut bad = sample_product();
        bad.image_url = "not-a-url".to_string();

        let result = phone.push_product(&bad).await;
        assert!(matches!(result, Err(SyncError::Validation(_))));
    }

    #[tokio::test]
    async fn test_list_nodes_empty_without_watch() {
        let (phone, _watch, control) = rig();

        // Connected first.
        let nodes = phone.list_connected_nodes().await.unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].id, "node-w");

        // No paired watch: an empty snapshot, not an error.
        control.sever();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let nodes = phone.list_connected_nodes().await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn test_delivery_event_reaches_watch() {
        let (phone, watch, _control) = rig();
        let mut delivery = watch.delivery_events();

        phone
            .send_delivery_event(DeliveryEventKind::Call, Some("Courier: Sam"))
            .await
            .unwrap();

        match delivery.recv().await {
            Some(WearEvent::Delivery(event)) => {
                assert_eq!(event.kind, DeliveryEventKind::Call);
                assert_eq!(event.detail.as_deref(), Some("Courier: Sam"));
            }
            other => panic!("expected Delivery, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_late_action_subscriber_gets_replay() {
        let (phone, watch, _control) = rig();

        // The watch acts before the phone UI has subscribed.
        watch.send_like("sku-123").await.unwrap();

        // Give the action time to land in the replay buffer.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut actions = phone.actions();
        match actions.recv().await {
            Some(WearEvent::Action(event)) => {
                assert_eq!(event.product_id.as_deref(), Some("sku-123"));
            }
            other => panic!("expected replayed action, got {:?}", other),
        }
    }
}
