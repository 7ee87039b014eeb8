//! # fitmatch-sync: Phone↔Watch Data Layer for FitMatch
//!
//! This crate provides the synchronization layer between the FitMatch phone
//! app and its companion watch: the phone pushes discovery products, the
//! watch sends back like/pass/request actions, and both exchange
//! delivery-tracking events.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Data Layer Architecture                          │
//! │                                                                         │
//! │   PHONE                                        WATCH                    │
//! │   ┌──────────────────────┐                     ┌──────────────────────┐ │
//! │   │  PhoneSyncManager    │                     │  WatchSyncManager    │ │
//! │   │  push_product        │                     │  request_next_product│ │
//! │   │  list_connected_nodes│                     │  send_like/send_pass │ │
//! │   │  send_delivery_event │                     │  send_delivery_event │ │
//! │   └──────────┬───────────┘                     └──────────┬───────────┘ │
//! │              │                                            │             │
//! │   ┌──────────▼───────────┐                     ┌──────────▼───────────┐ │
//! │   │  DeviceChannel       │                     │  DeviceChannel       │ │
//! │   │  item table (LWW)    │                     │  item table (LWW)    │ │
//! │   │  direct messages     │                     │  direct messages     │ │
//! │   └──────────┬───────────┘                     └──────────┬───────────┘ │
//! │              │                                            │             │
//! │   ┌──────────▼───────────┐    WebSocket        ┌──────────▼───────────┐ │
//! │   │  LinkHost (axum)     │◄═══════════════════►│  WsDialer (reconnect │ │
//! │   │  /link endpoint      │   Hello/Welcome     │  with backoff)       │ │
//! │   └──────────────────────┘   then frames       └──────────────────────┘ │
//! │                                                                         │
//! │   Incoming traffic on each side flows through the ListenerService,     │
//! │   which demultiplexes by path and publishes typed WearEvents to the    │
//! │   SubscriptionRegistry (multi-subscriber, bounded replay).             │
//! │                                                                         │
//! │   MESSAGE FLOW (discovery feed)                                        │
//! │   ─────────────────────────────                                        │
//! │   1. Watch: request_next_product ──► /fitmatch/request/next            │
//! │   2. Phone: listener surfaces REQUEST_NEXT to the catalog view-model   │
//! │   3. Phone: push_product(P) ──► item at /fitmatch/product              │
//! │   4. Watch: listener decodes P, renders the card                       │
//! │   5. Watch: send_like(P.id) ──► /fitmatch/action/like                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Protocol Core
//! - [`codec`] - Product payload codec (JSON, forward-compatible)
//! - [`paths`] - Well-known path table and typed routing
//! - [`protocol`] - Link frames, handshake, payload shapes
//! - [`error`] - Categorized error types
//!
//! ### Device Stack
//! - [`channel`] - The per-device data-layer primitive
//! - [`listener`] - Path demultiplexer publishing typed events
//! - [`subscription`] - Multi-subscriber registry with bounded replay
//! - [`phone`] / [`watch`] - The two protocol surfaces
//!
//! ### Link Layer
//! - [`link`] - Link abstraction + in-memory pair for tests
//! - [`transport`] - Watch-side WebSocket dialer with backoff reconnect
//! - [`host`] - Phone-side WebSocket host
//! - [`config`] - Layered TOML + environment configuration
//!
//! ## Usage
//!
//! ```rust,ignore
//! use fitmatch_sync::{PhoneSyncManager, SyncConfig};
//!
//! let config = SyncConfig::load_or_default(None);
//! let phone = PhoneSyncManager::start(&config).await?;
//!
//! // Push the first product and listen for watch actions.
//! phone.push_product(&product).await?;
//! let mut actions = phone.actions();
//! while let Some(event) = actions.recv().await {
//!     println!("watch says: {:?}", event);
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Protocol core
pub mod codec;
pub mod error;
pub mod paths;
pub mod protocol;

// Device stack
pub mod channel;
pub mod listener;
pub mod phone;
pub mod subscription;
pub mod watch;

// Link layer
pub mod config;
pub mod host;
pub mod link;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

// Protocol core
pub use codec::{decode_product, encode_product, CodecError};
pub use error::{SyncError, SyncResult};
pub use paths::SyncPath;
pub use protocol::PROTOCOL_VERSION;

// Device stack
pub use channel::{ChannelHandle, ChannelSettings, Delivery, DeviceChannel};
pub use listener::{ListenerHandle, ListenerService};
pub use phone::PhoneSyncManager;
pub use subscription::{EventKind, SubscriptionRegistry, WearEvent};
pub use watch::WatchSyncManager;

// Link layer
pub use config::{DeviceRole, ProtocolSettings, SyncConfig};
pub use host::{HostConfig, HostHandle, LinkHost};
pub use link::{LinkControl, LinkEndpoint, LinkState, MemoryLink, PeerInfo};
pub use transport::{DialerConfig, DialerHandle, WsDialer};
