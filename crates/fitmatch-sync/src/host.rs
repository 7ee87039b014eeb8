//! # Link Host
//!
//! The phone side of the device link: a WebSocket endpoint the watch dials.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Link Host (Axum)                                │
//! │                                                                         │
//! │  /link endpoint ──▶ WebSocket upgrade                                  │
//! │                          │                                              │
//! │                          ▼                                              │
//! │                 ┌─────────────────┐                                     │
//! │                 │ Hello/Welcome   │  version checked here; a mismatch   │
//! │                 │ handshake       │  gets an Error frame and a close    │
//! │                 └────────┬────────┘                                     │
//! │                          │                                              │
//! │                          ▼                                              │
//! │                 ┌─────────────────┐      ┌──────────────────────────┐   │
//! │                 │ connection slot │ ◄──── forwarder: frames from    │   │
//! │                 │ (one watch at a │      │ the device channel go to │   │
//! │                 │  time; a new    │      │ whichever socket holds   │   │
//! │                 │  dial replaces  │      │ the slot                 │   │
//! │                 │  the old one)   │      └──────────────────────────┘   │
//! │                 └─────────────────┘                                     │
//! │                                                                         │
//! │  The pairing is exactly one phone and one watch. A second dial is      │
//! │  treated as the same watch reconnecting and takes over the slot.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{interval, timeout};
use tracing::{debug, error, info, warn};

use fitmatch_core::Node;

use crate::config::LinkSettings;
use crate::error::{SyncError, SyncResult};
use crate::link::{LinkEndpoint, LinkState, PeerInfo};
use crate::protocol::{HelloPayload, LinkFrame, WelcomePayload, CODE_VERSION_MISMATCH};

/// Keepalive ping interval.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Maximum frame size (1MB).
const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Frame buffer size for each direction.
const FRAME_BUFFER: usize = 64;

// =============================================================================
// Host Configuration
// =============================================================================

/// Configuration for the link host.
#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Bind address (default: 0.0.0.0).
    pub bind_addr: String,

    /// Port to listen on.
    pub port: u16,

    /// Handshake timeout (Hello awaited after upgrade).
    pub handshake_timeout: Duration,
}

impl Default for HostConfig {
    fn default() -> Self {
        HostConfig {
            bind_addr: "0.0.0.0".to_string(),
            port: 9180,
            handshake_timeout: Duration::from_secs(5),
        }
    }
}

impl HostConfig {
    /// Returns the full bind address.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }

    /// Builds a host config from link settings.
    pub fn from_settings(settings: &LinkSettings) -> Self {
        HostConfig {
            bind_addr: settings.listen_addr.clone(),
            port: settings.listen_port,
            handshake_timeout: Duration::from_secs(settings.handshake_timeout_secs),
        }
    }
}

// =============================================================================
// Host State
// =============================================================================

/// Shared state for the link host.
struct HostState {
    /// This device's identity, sent in Welcome.
    identity: Node,

    /// Handshake timeout.
    handshake_timeout: Duration,

    /// Frames surfaced to the device channel.
    incoming_tx: mpsc::Sender<LinkFrame>,

    /// Observable link state.
    state_tx: watch::Sender<LinkState>,

    /// The live connection, if any: (connection id, its outgoing sender).
    conn_slot: Mutex<Option<(u64, mpsc::Sender<Message>)>>,

    /// Connection id source.
    conn_counter: AtomicU64,
}

// =============================================================================
// Host Handle
// =============================================================================

/// Handle for controlling a running link host.
#[derive(Clone)]
pub struct HostHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl HostHandle {
    /// Shuts down the host.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("host task stopped".into()))
    }
}

// =============================================================================
// Link Host
// =============================================================================

/// The phone-side WebSocket host.
pub struct LinkHost;

impl LinkHost {
    /// Binds the listener and spawns the host.
    ///
    /// Returns the link endpoint for the device channel and a control
    /// handle.
    pub async fn start(
        config: HostConfig,
        identity: Node,
    ) -> SyncResult<(LinkEndpoint, HostHandle)> {
        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<LinkFrame>(FRAME_BUFFER);
        let (incoming_tx, incoming_rx) = mpsc::channel::<LinkFrame>(FRAME_BUFFER);
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let (state_tx, state_rx) = watch::channel(LinkState::Down);

        let state = Arc::new(HostState {
            identity,
            handshake_timeout: config.handshake_timeout,
            incoming_tx,
            state_tx,
            conn_slot: Mutex::new(None),
            conn_counter: AtomicU64::new(0),
        });

        let app = Router::new()
            .route("/link", get(ws_handler))
            .route("/health", get(health_handler))
            .with_state(state.clone());

        let bind_addr = config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await.map_err(|e| {
            SyncError::ConnectionFailed(format!("Failed to bind to {}: {}", bind_addr, e))
        })?;

        info!(addr = %bind_addr, "Link host started");

        // Serve in the background.
        tokio::spawn(async move {
            axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move {
                shutdown_rx.recv().await;
                info!("Link host shutting down");
            })
            .await
            .ok();
        });

        // Forward channel frames to whichever socket holds the slot.
        let forward_state = state.clone();
        tokio::spawn(async move {
            while let Some(frame) = outgoing_rx.recv().await {
                let conn = forward_state.conn_slot.lock().await.clone();
                match conn {
                    Some((_, conn_tx)) => {
                        let json = match frame.to_json() {
                            Ok(json) => json,
                            Err(e) => {
                                error!(?e, "Failed to serialize outgoing frame");
                                continue;
                            }
                        };
                        if conn_tx.send(Message::Text(json.into())).await.is_err() {
                            debug!("Connection gone, frame dropped");
                        }
                    }
                    None => {
                        debug!(frame = frame.type_name(), "No watch connected, frame dropped");
                    }
                }
            }
        });

        let endpoint = LinkEndpoint {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            state: state_rx,
        };
        let handle = HostHandle { shutdown_tx };

        Ok((endpoint, handle))
    }
}

// =============================================================================
// WebSocket Handlers
// =============================================================================

/// Health check endpoint.
async fn health_handler() -> impl IntoResponse {
    "OK"
}

/// WebSocket upgrade handler.
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<HostState>>,
    axum::extract::ConnectInfo(addr): axum::extract::ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    info!(addr = %addr, "New link connection");
    ws.max_message_size(MAX_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state, addr))
}

/// Handles one watch connection.
async fn handle_socket(socket: WebSocket, state: Arc<HostState>, addr: SocketAddr) {
    let (mut sender, mut receiver) = socket.split();

    // Wait for Hello.
    let hello = match receive_hello(&mut receiver, state.handshake_timeout).await {
        Ok(hello) => hello,
        Err(e) => {
            warn!(addr = %addr, ?e, "Failed to receive Hello - closing connection");
            return;
        }
    };

    // Version gate before anything else touches the link.
    if let Err(e) = crate::protocol::check_version(hello.protocol_version) {
        error!(peer = %hello.node_id, %e, "Refusing link");
        let refusal = LinkFrame::error(CODE_VERSION_MISMATCH, &e.to_string());
        if let Ok(json) = refusal.to_json() {
            let _ = sender.send(Message::Text(json.into())).await;
        }
        return;
    }

    let peer = Node::new(&hello.node_id, &hello.node_name);
    info!(peer = %peer, addr = %addr, "Watch connected");

    // Take over the connection slot; a previous connection is superseded.
    let conn_id = state.conn_counter.fetch_add(1, Ordering::SeqCst);
    let (conn_tx, mut conn_rx) = mpsc::channel::<Message>(FRAME_BUFFER);
    {
        let mut slot = state.conn_slot.lock().await;
        if slot.is_some() {
            info!(peer = %peer, "Replacing previous watch connection");
        }
        *slot = Some((conn_id, conn_tx.clone()));
    }

    // Send Welcome.
    let welcome = LinkFrame::Welcome(WelcomePayload {
        node_id: state.identity.id.clone(),
        node_name: state.identity.name.clone(),
        server_time_ms: Utc::now().timestamp_millis(),
    });
    match welcome.to_json() {
        Ok(json) => {
            if sender.send(Message::Text(json.into())).await.is_err() {
                warn!(peer = %peer, "Failed to send Welcome");
                release_slot(&state, conn_id).await;
                return;
            }
        }
        Err(e) => {
            error!(?e, "Failed to serialize Welcome");
            release_slot(&state, conn_id).await;
            return;
        }
    }

    let _ = state
        .state_tx
        .send(LinkState::Up(PeerInfo { node: peer.clone() }));

    // Outgoing pump: slot frames and pings go to the socket.
    let pump_handle = tokio::spawn(async move {
        while let Some(msg) = conn_rx.recv().await {
            if sender.send(msg).await.is_err() {
                break;
            }
        }
    });

    // Keepalive pings.
    let ping_tx = conn_tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_interval = interval(PING_INTERVAL);
        ping_interval.reset();
        loop {
            ping_interval.tick().await;
            if ping_tx
                .send(Message::Ping(axum::body::Bytes::new()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    // Main receive loop.
    loop {
        match receiver.next().await {
            Some(Ok(Message::Text(text))) => match LinkFrame::from_json(&text) {
                Ok(frame) => {
                    debug!(peer = %peer, frame = %frame.type_name(), "Received frame");
                    if state.incoming_tx.send(frame).await.is_err() {
                        warn!("Incoming frame receiver dropped");
                        break;
                    }
                }
                Err(e) => {
                    debug!(peer = %peer, ?e, "Invalid frame format");
                }
            },
            Some(Ok(Message::Ping(data))) => {
                let _ = conn_tx.send(Message::Pong(data)).await;
            }
            Some(Ok(Message::Pong(_))) => {
                // Connection is alive
            }
            Some(Ok(Message::Binary(_))) => {
                debug!(peer = %peer, "Unexpected binary frame");
            }
            Some(Ok(Message::Close(_))) => {
                info!(peer = %peer, "Watch requested close");
                break;
            }
            Some(Err(e)) => {
                warn!(peer = %peer, ?e, "WebSocket error");
                break;
            }
            None => break,
        }
    }

    pump_handle.abort();
    ping_handle.abort();
    release_slot(&state, conn_id).await;
    info!(peer = %peer, "Watch disconnected");
}

/// Clears the connection slot if this connection still owns it.
async fn release_slot(state: &Arc<HostState>, conn_id: u64) {
    let mut slot = state.conn_slot.lock().await;
    if matches!(*slot, Some((id, _)) if id == conn_id) {
        *slot = None;
        let _ = state.state_tx.send(LinkState::Down);
    }
}

/// Awaits the Hello frame that must open every connection.
async fn receive_hello(
    receiver: &mut futures_util::stream::SplitStream<WebSocket>,
    handshake_timeout: Duration,
) -> SyncResult<HelloPayload> {
    let wait = timeout(handshake_timeout, async {
        loop {
            match receiver.next().await {
                Some(Ok(Message::Text(text))) => match LinkFrame::from_json(&text) {
                    Ok(LinkFrame::Hello(hello)) => return Ok(hello),
                    Ok(other) => {
                        debug!(frame = other.type_name(), "Expected Hello, got other frame");
                    }
                    Err(e) => {
                        debug!(?e, "Undecodable frame while waiting for Hello");
                    }
                },
                Some(Ok(Message::Close(_))) | None => return Err(SyncError::LinkClosed),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    return Err(SyncError::ConnectionFailed(e.to_string()));
                }
            }
        }
    })
    .await;

    match wait {
        Ok(result) => result,
        Err(_) => Err(SyncError::Timeout(handshake_timeout.as_millis() as u64)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_config_bind_address() {
        let config = HostConfig::default();
        assert_eq!(config.bind_address(), "0.0.0.0:9180");
    }

    #[test]
    fn test_host_config_from_settings() {
        let settings = LinkSettings {
            listen_addr: "127.0.0.1".to_string(),
            listen_port: 9999,
            handshake_timeout_secs: 2,
            ..Default::default()
        };
        let config = HostConfig::from_settings(&settings);
        assert_eq!(config.bind_address(), "127.0.0.1:9999");
        assert_eq!(config.handshake_timeout, Duration::from_secs(2));
    }
}
