//! # Device Channel
//!
//! The per-device data-layer primitive: a path-addressed item table synced
//! opportunistically to the peer, plus an addressed message channel that
//! fails fast when the peer is unreachable.
//!
//! ## Channel Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        DeviceChannel Task                               │
//! │                                                                         │
//! │   ChannelHandle ──commands──► ┌─────────────────────────────┐          │
//! │   (managers)                  │  select loop                │          │
//! │                               │                             │          │
//! │   put_item ──────────────────►│  item table (per-path LWW)  │          │
//! │   send_message ──────────────►│  direct send or NotConnected│          │
//! │   list_connected_nodes ──────►│  link-state snapshot        │          │
//! │                               │                             │          │
//! │   LinkEndpoint ◄──frames─────►│  SetItem / Message          │          │
//! │   (memory or WebSocket)       │                             │          │
//! │                               │  on reconnect: re-sync the  │          │
//! │   ChannelEvent ◄──events──────│  whole item table           │          │
//! │   (listener service)          └─────────────────────────────┘          │
//! │                                                                         │
//! │  GUARANTEES                                                            │
//! │  ──────────                                                            │
//! │  • put_item: accepted locally, synced to the peer when reachable       │
//! │  • send_message: delivered now or failed now, never queued             │
//! │  • timestamps: monotonically non-decreasing per device                 │
//! │  • stale item writes (older timestamp) are discarded on receipt        │
//! │  • every operation is bounded by the configured per-call timeout       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use fitmatch_core::Node;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::link::{LinkEndpoint, LinkState};
use crate::paths::SyncPath;
use crate::protocol::{ItemRecord, LinkFrame, MessageRecord};

// =============================================================================
// Delivery Outcome
// =============================================================================

/// How far an outbound write got.
///
/// `Local` is the terminal success for item writes: the payload is in the
/// local table and will reach the peer whenever the link allows. There is
/// deliberately no "peer received" outcome; the data layer gives no receipt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Accepted by the local data layer; sync to the peer is opportunistic.
    Local,

    /// Handed to the live link for the given node.
    Sent { node: Node },
}

// =============================================================================
// Channel Events
// =============================================================================

/// Raw traffic surfaced to the listener service, in arrival order.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    /// An item write from the peer changed the local table.
    ItemChanged {
        path: SyncPath,
        payload: Value,
        timestamp: i64,
    },

    /// A direct message arrived from the peer.
    MessageReceived {
        path: SyncPath,
        payload: Value,
        timestamp: i64,
    },

    /// The link came up; the peer identity is known.
    PeerConnected { node: Node },

    /// The link went down.
    PeerDisconnected,
}

// =============================================================================
// Timestamp Source
// =============================================================================

/// Monotonically non-decreasing wall-clock source.
///
/// If the system clock steps backwards between two writes, the previous
/// timestamp is reissued so per-path last-write-wins never inverts.
#[derive(Debug, Default)]
pub(crate) struct TimestampSource {
    last: i64,
}

impl TimestampSource {
    /// Returns a timestamp no smaller than any previously returned one.
    pub(crate) fn next(&mut self, now_ms: i64) -> i64 {
        let ts = now_ms.max(self.last);
        self.last = ts;
        ts
    }
}

// =============================================================================
// Channel Settings
// =============================================================================

/// Runtime settings for a device channel.
#[derive(Debug, Clone)]
pub struct ChannelSettings {
    /// Per-call timeout for every public operation.
    pub op_timeout: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        ChannelSettings {
            op_timeout: Duration::from_secs(5),
        }
    }
}

// =============================================================================
// Commands & Handle
// =============================================================================

/// Internal command protocol between handle and task.
enum Command {
    PutItem {
        path: SyncPath,
        payload: Value,
        reply: oneshot::Sender<SyncResult<Delivery>>,
    },
    SendMessage {
        node_id: String,
        path: SyncPath,
        payload: Value,
        reply: oneshot::Sender<SyncResult<Delivery>>,
    },
    ListNodes {
        reply: oneshot::Sender<Vec<Node>>,
    },
}

/// Handle for issuing data-layer operations from other components.
#[derive(Clone)]
pub struct ChannelHandle {
    command_tx: mpsc::Sender<Command>,
    shutdown_tx: mpsc::Sender<()>,
    op_timeout: Duration,
}

impl ChannelHandle {
    /// Writes a payload to a path on the item channel.
    ///
    /// Succeeds once the local table accepts the write; delivery to the
    /// peer is opportunistic (store-and-forward).
    pub async fn put_item(&self, path: SyncPath, payload: Value) -> SyncResult<Delivery> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::PutItem { path, payload, reply }, rx)
            .await?
    }

    /// Sends a direct message to one connected node.
    ///
    /// Fails with [`SyncError::NotConnected`] when the node is not
    /// currently reachable. Never queues.
    pub async fn send_message(
        &self,
        node_id: &str,
        path: SyncPath,
        payload: Value,
    ) -> SyncResult<Delivery> {
        let (reply, rx) = oneshot::channel();
        self.submit(
            Command::SendMessage {
                node_id: node_id.to_string(),
                path,
                payload,
                reply,
            },
            rx,
        )
        .await?
    }

    /// Returns a point-in-time snapshot of connected nodes.
    ///
    /// `Ok(vec![])` means a verified-empty snapshot; a dead channel or a
    /// timed-out call is an error, never an empty list.
    pub async fn list_connected_nodes(&self) -> SyncResult<Vec<Node>> {
        let (reply, rx) = oneshot::channel();
        self.submit(Command::ListNodes { reply }, rx).await
    }

    /// Triggers graceful shutdown of the channel task.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("device channel task stopped".into()))
    }

    /// Sends a command and awaits its reply under the per-call timeout.
    async fn submit<T>(&self, command: Command, rx: oneshot::Receiver<T>) -> SyncResult<T> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SyncError::ChannelClosed("device channel task stopped".into()))?;

        match timeout(self.op_timeout, rx).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(SyncError::ChannelClosed("reply dropped".into())),
            Err(_) => Err(SyncError::Timeout(self.op_timeout.as_millis() as u64)),
        }
    }
}

// =============================================================================
// Device Channel
// =============================================================================

/// The stored value at one path.
#[derive(Debug, Clone)]
struct StoredItem {
    payload: Value,
    timestamp: i64,
}

/// The per-device data-layer task.
pub struct DeviceChannel {
    identity: Node,
    link: LinkEndpoint,
    items: HashMap<SyncPath, StoredItem>,
    clock: TimestampSource,
    command_rx: mpsc::Receiver<Command>,
    event_tx: mpsc::Sender<ChannelEvent>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl DeviceChannel {
    /// Spawns the channel task over the given link.
    ///
    /// Returns the operation handle and the raw event stream consumed by
    /// the listener service.
    pub fn spawn(
        identity: Node,
        link: LinkEndpoint,
        settings: ChannelSettings,
    ) -> (ChannelHandle, mpsc::Receiver<ChannelEvent>) {
        let (command_tx, command_rx) = mpsc::channel(64);
        let (event_tx, event_rx) = mpsc::channel(256);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let channel = DeviceChannel {
            identity,
            link,
            items: HashMap::new(),
            clock: TimestampSource::default(),
            command_rx,
            event_tx,
            shutdown_rx,
        };

        tokio::spawn(channel.run());

        let handle = ChannelHandle {
            command_tx,
            shutdown_tx,
            op_timeout: settings.op_timeout,
        };

        (handle, event_rx)
    }

    /// Main channel loop.
    async fn run(mut self) {
        info!(node = %self.identity.id, "Device channel starting");

        // The link may already be up (in-memory pairs start connected).
        let initial = self.link.state.borrow_and_update().clone();
        if let LinkState::Up(peer) = initial {
            self.on_peer_connected(peer.node).await;
        }

        loop {
            tokio::select! {
                Some(command) = self.command_rx.recv() => {
                    self.handle_command(command).await;
                }

                Some(frame) = self.link.incoming.recv() => {
                    self.handle_frame(frame).await;
                }

                Ok(()) = self.link.state.changed() => {
                    self.handle_state_change().await;
                }

                _ = self.shutdown_rx.recv() => {
                    info!(node = %self.identity.id, "Device channel shutting down");
                    break;
                }

                else => break,
            }
        }

        info!(node = %self.identity.id, "Device channel stopped");
    }

    // =========================================================================
    // Command Handling
    // =========================================================================

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::PutItem {
                path,
                payload,
                reply,
            } => {
                let timestamp = self.clock.next(Utc::now().timestamp_millis());
                self.items.insert(
                    path,
                    StoredItem {
                        payload: payload.clone(),
                        timestamp,
                    },
                );
                debug!(path = %path, timestamp, "item stored locally");

                let connected = self.connected_peer().is_some();
                if connected {
                    let record = ItemRecord {
                        path: path.as_str().to_string(),
                        payload,
                        timestamp,
                    };
                    if self.link.outgoing.send(LinkFrame::SetItem(record)).await.is_err() {
                        warn!(path = %path, "link layer gone, item will sync on reconnect");
                    }
                }

                let _ = reply.send(Ok(Delivery::Local));
            }

            Command::SendMessage {
                node_id,
                path,
                payload,
                reply,
            } => {
                let result = self.send_direct(&node_id, path, payload).await;
                let _ = reply.send(result);
            }

            Command::ListNodes { reply } => {
                let nodes = self
                    .connected_peer()
                    .map(|node| vec![node])
                    .unwrap_or_default();
                let _ = reply.send(nodes);
            }
        }
    }

    async fn send_direct(
        &mut self,
        node_id: &str,
        path: SyncPath,
        payload: Value,
    ) -> SyncResult<Delivery> {
        let Some(node) = self.connected_peer() else {
            debug!(path = %path, "message refused, no peer connected");
            return Err(SyncError::NotConnected);
        };

        if node.id != node_id {
            debug!(path = %path, addressed = node_id, connected = %node.id,
                   "message refused, addressed node is not connected");
            return Err(SyncError::NotConnected);
        }

        let timestamp = self.clock.next(Utc::now().timestamp_millis());
        let record = MessageRecord {
            path: path.as_str().to_string(),
            payload,
            timestamp,
        };

        match self.link.outgoing.send(LinkFrame::Message(record)).await {
            Ok(()) => {
                debug!(path = %path, node = %node.id, "message sent");
                Ok(Delivery::Sent { node })
            }
            Err(_) => Err(SyncError::LinkClosed),
        }
    }

    // =========================================================================
    // Frame Handling
    // =========================================================================

    async fn handle_frame(&mut self, frame: LinkFrame) {
        match frame {
            LinkFrame::SetItem(record) => {
                let Some(path) = SyncPath::parse(&record.path) else {
                    warn!(path = %record.path, "item on unknown path, ignoring");
                    return;
                };

                if let Some(existing) = self.items.get(&path) {
                    if existing.timestamp > record.timestamp {
                        debug!(path = %path, stored = existing.timestamp,
                               incoming = record.timestamp, "stale item write discarded");
                        return;
                    }
                }

                self.items.insert(
                    path,
                    StoredItem {
                        payload: record.payload.clone(),
                        timestamp: record.timestamp,
                    },
                );

                self.emit(ChannelEvent::ItemChanged {
                    path,
                    payload: record.payload,
                    timestamp: record.timestamp,
                })
                .await;
            }

            LinkFrame::Message(record) => {
                let Some(path) = SyncPath::parse(&record.path) else {
                    warn!(path = %record.path, "message on unknown path, ignoring");
                    return;
                };

                self.emit(ChannelEvent::MessageReceived {
                    path,
                    payload: record.payload,
                    timestamp: record.timestamp,
                })
                .await;
            }

            LinkFrame::Hello(_) | LinkFrame::Welcome(_) => {
                debug!("handshake frame outside link layer, ignoring");
            }

            LinkFrame::Error { code, message } => {
                warn!(code = %code, message = %message, "peer reported error");
            }
        }
    }

    // =========================================================================
    // Link State
    // =========================================================================

    async fn handle_state_change(&mut self) {
        let state = self.link.state.borrow_and_update().clone();
        match state {
            LinkState::Up(peer) => self.on_peer_connected(peer.node).await,
            LinkState::Down => {
                info!(node = %self.identity.id, "peer disconnected");
                self.emit(ChannelEvent::PeerDisconnected).await;
            }
            LinkState::Connecting => {}
        }
    }

    async fn on_peer_connected(&mut self, peer: Node) {
        info!(node = %self.identity.id, peer = %peer, "peer connected");
        self.emit(ChannelEvent::PeerConnected { node: peer }).await;
        self.flush_items().await;
    }

    /// Re-syncs the whole item table to the peer.
    ///
    /// The table is small (one entry per well-known item path), so a full
    /// flush on every reconnect is cheaper than tracking per-item dirt.
    async fn flush_items(&mut self) {
        for (path, item) in &self.items {
            let record = ItemRecord {
                path: path.as_str().to_string(),
                payload: item.payload.clone(),
                timestamp: item.timestamp,
            };
            if self.link.outgoing.send(LinkFrame::SetItem(record)).await.is_err() {
                warn!("link layer gone during item flush");
                return;
            }
        }
        if !self.items.is_empty() {
            debug!(count = self.items.len(), "item table re-synced");
        }
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    fn connected_peer(&self) -> Option<Node> {
        self.link.state.borrow().peer().map(|p| p.node.clone())
    }

    async fn emit(&self, event: ChannelEvent) {
        if self.event_tx.send(event).await.is_err() {
            debug!("channel event receiver dropped");
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryLink;
    use serde_json::json;

    fn nodes() -> (Node, Node) {
        (
            Node::new("node-p", "Phone"),
            Node::new("node-w", "Pixel Watch"),
        )
    }

    #[test]
    fn test_timestamp_source_is_non_decreasing() {
        let mut clock = TimestampSource::default();
        assert_eq!(clock.next(100), 100);
        assert_eq!(clock.next(250), 250);
        // Wall clock stepped backwards; the previous timestamp is reissued.
        assert_eq!(clock.next(200), 250);
        assert_eq!(clock.next(251), 251);
    }

    #[tokio::test]
    async fn test_put_item_reaches_the_peer() {
        let (phone, watch_node) = nodes();
        let (a, mut b, _control) = MemoryLink::pair(phone.clone(), watch_node);
        let (handle, _events) = DeviceChannel::spawn(phone, a, ChannelSettings::default());

        let delivery = handle
            .put_item(SyncPath::Product, json!({"product": "{}"}))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Local);

        let frame = b.incoming.recv().await.unwrap();
        match frame {
            LinkFrame::SetItem(record) => {
                assert_eq!(record.path, crate::paths::PRODUCT);
                assert!(record.timestamp > 0);
            }
            other => panic!("expected SetItem, got {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_stale_item_write_is_discarded() {
        let (phone, watch_node) = nodes();
        let (a, b, _control) = MemoryLink::pair(phone.clone(), watch_node.clone());
        let (_handle, mut events) = DeviceChannel::spawn(phone, a, ChannelSettings::default());

        // Drain the initial peer-connected event.
        assert!(matches!(
            events.recv().await,
            Some(ChannelEvent::PeerConnected { .. })
        ));

        let fresh = LinkFrame::SetItem(ItemRecord {
            path: crate::paths::PRODUCT.to_string(),
            payload: json!({"product": "new"}),
            timestamp: 200,
        });
        b.outgoing.send(fresh).await.unwrap();

        match events.recv().await {
            Some(ChannelEvent::ItemChanged { timestamp, .. }) => assert_eq!(timestamp, 200),
            other => panic!("expected ItemChanged, got {:?}", other),
        }

        // An older write for the same path must not surface.
        let stale = LinkFrame::SetItem(ItemRecord {
            path: crate::paths::PRODUCT.to_string(),
            payload: json!({"product": "old"}),
            timestamp: 100,
        });
        b.outgoing.send(stale).await.unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_message_fails_without_peer() {
        let (phone, watch_node) = nodes();
        let (_a, b, control) = MemoryLink::pair(phone, watch_node.clone());
        let (handle, _events) = DeviceChannel::spawn(watch_node, b, ChannelSettings::default());

        control.sever();
        // Let the state change propagate.
        tokio::time::sleep(Duration::from_millis(10)).await;

        let result = handle
            .send_message("node-p", SyncPath::ActionLike, json!({"productId": "sku-1"}))
            .await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[tokio::test]
    async fn test_send_message_to_unknown_node_fails() {
        let (phone, watch_node) = nodes();
        let (_a, b, _control) = MemoryLink::pair(phone, watch_node.clone());
        let (handle, _events) = DeviceChannel::spawn(watch_node, b, ChannelSettings::default());

        let result = handle
            .send_message("node-elsewhere", SyncPath::ActionLike, json!({"productId": "x"}))
            .await;
        assert!(matches!(result, Err(SyncError::NotConnected)));
    }

    #[tokio::test]
    async fn test_list_nodes_distinguishes_empty_from_error() {
        let (phone, watch_node) = nodes();
        let (a, _b, control) = MemoryLink::pair(phone.clone(), watch_node.clone());
        let (handle, _events) = DeviceChannel::spawn(phone, a, ChannelSettings::default());

        // Connected: exactly the paired watch.
        let nodes = handle.list_connected_nodes().await.unwrap();
        assert_eq!(nodes, vec![watch_node]);

        // Disconnected: a verified-empty snapshot, not an error.
        control.sever();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let nodes = handle.list_connected_nodes().await.unwrap();
        assert!(nodes.is_empty());
    }

    #[tokio::test]
    async fn test_items_resync_after_reconnect() {
        let (phone, watch_node) = nodes();
        let (a, mut b, control) = MemoryLink::pair(phone.clone(), watch_node);
        let (handle, _events) = DeviceChannel::spawn(phone, a, ChannelSettings::default());

        control.sever();
        tokio::time::sleep(Duration::from_millis(10)).await;

        // Written while unreachable: accepted locally, nothing on the wire.
        let delivery = handle
            .put_item(SyncPath::Product, json!({"product": "queued"}))
            .await
            .unwrap();
        assert_eq!(delivery, Delivery::Local);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(b.incoming.try_recv().is_err());

        // Reconnect triggers a full table flush.
        control.restore();
        let frame = b.incoming.recv().await.unwrap();
        match frame {
            LinkFrame::SetItem(record) => {
                assert_eq!(record.payload, json!({"product": "queued"}));
            }
            other => panic!("expected SetItem, got {}", other.type_name()),
        }
    }
}
