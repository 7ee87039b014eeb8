//! # WebSocket Dialer
//!
//! The watch side of the device link: dials the phone's host endpoint with
//! automatic reconnection and backoff. This layer stands in for the
//! platform transport service; reconnect policy lives here and nowhere
//! above it, so protocol operations stay retry-free.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Dialer Connection States                           │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐                         │
//! │  │    Down    │ ──────────────► │ Connecting │                         │
//! │  └────────────┘                 └─────┬──────┘                         │
//! │        ▲                              │                                 │
//! │        │                   handshake  │   failure                       │
//! │        │                        ┌─────┴─────┐                          │
//! │        │                        ▼           ▼                           │
//! │        │              ┌────────────┐  ┌────────────┐                   │
//! │        │              │ Up (peer)  │  │  Backoff   │                   │
//! │        │              └─────┬──────┘  └─────┬──────┘                   │
//! │        │                    │               │                           │
//! │        │              disconnect/error      │  timer expired            │
//! │        └────────────────────┴───────────────┘                          │
//! │                                                                         │
//! │  BACKOFF STRATEGY (Exponential)                                        │
//! │  ──────────────────────────────                                        │
//! │  Attempt 1: 500ms ... doubling ... Max: 60s                            │
//! │                                                                         │
//! │  A VERSION_MISMATCH refusal is terminal: the dialer stops instead of   │
//! │  hammering a host that will never accept it.                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use fitmatch_core::Node;

use crate::config::LinkSettings;
use crate::error::{SyncError, SyncResult};
use crate::link::{LinkEndpoint, LinkState, PeerInfo};
use crate::protocol::{HelloPayload, LinkFrame};

/// Keepalive ping interval on an established connection.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Frame buffer size for each direction.
const FRAME_BUFFER: usize = 64;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// =============================================================================
// Dialer Configuration
// =============================================================================

/// Configuration for the WebSocket dialer.
#[derive(Debug, Clone)]
pub struct DialerConfig {
    /// WebSocket URL of the phone host.
    pub url: String,

    /// Connection timeout.
    pub connect_timeout: Duration,

    /// Handshake timeout (Hello sent, Welcome awaited).
    pub handshake_timeout: Duration,

    /// Initial backoff duration.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,

    /// Maximum reconnection attempts (0 = infinite).
    pub max_retries: u32,
}

impl Default for DialerConfig {
    fn default() -> Self {
        DialerConfig {
            url: String::new(),
            connect_timeout: Duration::from_secs(10),
            handshake_timeout: Duration::from_secs(5),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            max_retries: 0, // Infinite
        }
    }
}

impl DialerConfig {
    /// Builds a dialer config from link settings and the resolved peer URL.
    pub fn from_settings(settings: &LinkSettings, url: String) -> Self {
        DialerConfig {
            url,
            connect_timeout: Duration::from_secs(settings.connect_timeout_secs),
            handshake_timeout: Duration::from_secs(settings.handshake_timeout_secs),
            initial_backoff: Duration::from_millis(settings.initial_backoff_ms),
            max_backoff: Duration::from_secs(settings.max_backoff_secs),
            max_retries: settings.max_retries,
        }
    }
}

// =============================================================================
// Dialer Handle
// =============================================================================

/// Handle for controlling a running dialer.
#[derive(Clone)]
pub struct DialerHandle {
    shutdown_tx: mpsc::Sender<()>,
}

impl DialerHandle {
    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> SyncResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| SyncError::ChannelClosed("dialer task stopped".into()))
    }
}

// =============================================================================
// WebSocket Dialer
// =============================================================================

/// WebSocket dialer with automatic reconnection.
///
/// ## Usage
/// ```rust,ignore
/// let config = DialerConfig {
///     url: "ws://192.168.1.20:9180/link".into(),
///     ..Default::default()
/// };
///
/// let (endpoint, handle) = WsDialer::spawn(config, my_node);
/// let (channel, events) = DeviceChannel::spawn(my_node, endpoint, settings);
/// ```
pub struct WsDialer {
    config: DialerConfig,
    identity: Node,
    outgoing_rx: mpsc::Receiver<LinkFrame>,
    incoming_tx: mpsc::Sender<LinkFrame>,
    state_tx: watch::Sender<LinkState>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl WsDialer {
    /// Creates the dialer and spawns its background task.
    ///
    /// Returns the link endpoint for the device channel and a control
    /// handle.
    pub fn spawn(config: DialerConfig, identity: Node) -> (LinkEndpoint, DialerHandle) {
        let (outgoing_tx, outgoing_rx) = mpsc::channel::<LinkFrame>(FRAME_BUFFER);
        let (incoming_tx, incoming_rx) = mpsc::channel::<LinkFrame>(FRAME_BUFFER);
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>(1);
        let (state_tx, state_rx) = watch::channel(LinkState::Down);

        let dialer = WsDialer {
            config,
            identity,
            outgoing_rx,
            incoming_tx,
            state_tx,
            shutdown_rx,
        };

        tokio::spawn(dialer.run());

        let endpoint = LinkEndpoint {
            outgoing: outgoing_tx,
            incoming: incoming_rx,
            state: state_rx,
        };
        let handle = DialerHandle { shutdown_tx };

        (endpoint, handle)
    }

    /// Main dialer loop.
    async fn run(mut self) {
        info!(url = %self.config.url, "Dialer starting");

        let mut backoff = self.create_backoff();
        let mut retry_count = 0u32;

        loop {
            if self.shutdown_rx.try_recv().is_ok() {
                info!("Dialer received shutdown signal");
                break;
            }

            let _ = self.state_tx.send(LinkState::Connecting);

            match self.connect_with_timeout().await {
                Ok(mut ws_stream) => match self.handshake(&mut ws_stream).await {
                    Ok(peer) => {
                        info!(peer = %peer.node, "Link established");
                        let _ = self.state_tx.send(LinkState::Up(peer));

                        backoff.reset();
                        retry_count = 0;

                        if let Err(e) = self.connection_loop(ws_stream).await {
                            warn!(?e, "Connection loop ended");
                        }
                    }
                    Err(e @ SyncError::HandshakeRefused { .. }) => {
                        error!(%e, "Host refused handshake, giving up");
                        break;
                    }
                    Err(e) => {
                        error!(?e, "Handshake failed");
                    }
                },
                Err(e) => {
                    error!(?e, "Failed to connect");
                }
            }

            // Connection lost or failed - enter backoff
            let _ = self.state_tx.send(LinkState::Down);

            if self.config.max_retries > 0 {
                retry_count += 1;
                if retry_count >= self.config.max_retries {
                    error!(
                        max_retries = self.config.max_retries,
                        "Max reconnection attempts reached"
                    );
                    break;
                }
            }

            if let Some(duration) = backoff.next_backoff() {
                debug!(?duration, attempt = retry_count, "Waiting before reconnect");

                tokio::select! {
                    _ = tokio::time::sleep(duration) => {}
                    _ = self.shutdown_rx.recv() => {
                        info!("Shutdown during backoff");
                        break;
                    }
                }
            } else {
                error!("Backoff exhausted");
                break;
            }
        }

        let _ = self.state_tx.send(LinkState::Down);
        info!("Dialer stopped");
    }

    /// Connects with timeout.
    async fn connect_with_timeout(&self) -> SyncResult<WsStream> {
        let connect_future = connect_async(&self.config.url);

        match timeout(self.config.connect_timeout, connect_future).await {
            Ok(Ok((ws_stream, response))) => {
                debug!(status = ?response.status(), "WebSocket handshake complete");
                Ok(ws_stream)
            }
            Ok(Err(e)) => Err(SyncError::from(e)),
            Err(_) => Err(SyncError::Timeout(
                self.config.connect_timeout.as_millis() as u64
            )),
        }
    }

    /// Sends Hello and awaits Welcome.
    async fn handshake(&mut self, ws_stream: &mut WsStream) -> SyncResult<PeerInfo> {
        let hello = LinkFrame::Hello(HelloPayload::new(&self.identity.id, &self.identity.name));
        ws_stream.send(WsMessage::Text(hello.to_json()?.into())).await?;

        let deadline = timeout(self.config.handshake_timeout, async {
            loop {
                match ws_stream.next().await {
                    Some(Ok(WsMessage::Text(text))) => match LinkFrame::from_json(&text) {
                        Ok(LinkFrame::Welcome(welcome)) => {
                            return Ok(PeerInfo {
                                node: Node::new(&welcome.node_id, &welcome.node_name),
                            });
                        }
                        Ok(LinkFrame::Error { code, message }) => {
                            return Err(SyncError::HandshakeRefused { code, message });
                        }
                        Ok(other) => {
                            debug!(frame = other.type_name(), "Unexpected frame during handshake");
                        }
                        Err(e) => {
                            warn!(?e, "Undecodable frame during handshake");
                        }
                    },
                    Some(Ok(WsMessage::Ping(data))) => {
                        ws_stream.send(WsMessage::Pong(data)).await?;
                    }
                    Some(Ok(WsMessage::Close(_))) | None => {
                        return Err(SyncError::LinkClosed);
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(SyncError::from(e)),
                }
            }
        })
        .await;

        match deadline {
            Ok(result) => result,
            Err(_) => Err(SyncError::Timeout(
                self.config.handshake_timeout.as_millis() as u64,
            )),
        }
    }

    /// Main connection loop - bridges frames in both directions.
    async fn connection_loop(&mut self, ws_stream: WsStream) -> SyncResult<()> {
        let (mut write, mut read) = ws_stream.split();

        let mut ping_interval = tokio::time::interval(PING_INTERVAL);
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping_interval.reset();

        loop {
            tokio::select! {
                // Outgoing frames from the device channel
                Some(frame) = self.outgoing_rx.recv() => {
                    let json = frame.to_json()?;
                    debug!(frame = %frame.type_name(), "Sending frame");
                    write.send(WsMessage::Text(json.into())).await?;
                }

                // Incoming frames from the host
                Some(result) = read.next() => {
                    match result {
                        Ok(WsMessage::Text(text)) => {
                            match LinkFrame::from_json(&text) {
                                Ok(frame) => {
                                    debug!(frame = %frame.type_name(), "Received frame");
                                    if self.incoming_tx.send(frame).await.is_err() {
                                        warn!("Incoming frame receiver dropped");
                                        return Err(SyncError::ChannelClosed("receiver dropped".into()));
                                    }
                                }
                                Err(e) => {
                                    warn!(?e, "Failed to parse frame");
                                }
                            }
                        }
                        Ok(WsMessage::Ping(data)) => {
                            write.send(WsMessage::Pong(data)).await?;
                        }
                        Ok(WsMessage::Pong(_)) => {
                            debug!("Received pong");
                        }
                        Ok(WsMessage::Close(frame)) => {
                            info!(?frame, "Received close frame");
                            return Ok(());
                        }
                        Ok(WsMessage::Binary(_)) => {
                            warn!("Received unexpected binary frame");
                        }
                        Ok(WsMessage::Frame(_)) => {
                            // Raw frame, ignore
                        }
                        Err(e) => {
                            error!(?e, "WebSocket error");
                            return Err(SyncError::from(e));
                        }
                    }
                }

                // Keepalive pings
                _ = ping_interval.tick() => {
                    write.send(WsMessage::Ping(vec![].into())).await?;
                    debug!("Sent ping");
                }

                // Shutdown
                _ = self.shutdown_rx.recv() => {
                    info!("Shutdown signal received, closing connection");
                    let _ = write.send(WsMessage::Close(None)).await;
                    return Ok(());
                }
            }
        }
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // No limit on total time
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LinkSettings;
    use crate::protocol::CODE_VERSION_MISMATCH;

    #[test]
    fn test_dialer_config_default() {
        let config = DialerConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.max_retries, 0); // Infinite
    }

    #[test]
    fn test_dialer_config_from_settings() {
        let settings = LinkSettings {
            connect_timeout_secs: 3,
            initial_backoff_ms: 250,
            max_backoff_secs: 30,
            max_retries: 5,
            ..Default::default()
        };
        let config =
            DialerConfig::from_settings(&settings, "ws://192.168.1.20:9180/link".to_string());
        assert_eq!(config.url, "ws://192.168.1.20:9180/link");
        assert_eq!(config.connect_timeout, Duration::from_secs(3));
        assert_eq!(config.initial_backoff, Duration::from_millis(250));
        assert_eq!(config.max_retries, 5);
    }

    #[test]
    fn test_version_mismatch_error_code_is_stable() {
        // The dialer keys its give-up decision off this code.
        assert_eq!(CODE_VERSION_MISMATCH, "VERSION_MISMATCH");
    }
}
