//! # Device Link Abstraction
//!
//! The framed, bidirectional pipe between the two paired devices. The real
//! deployments are WebSocket-backed ([`crate::transport`] dials,
//! [`crate::host`] listens); tests and local rigs use the in-memory pair
//! below. The device channel only ever sees a [`LinkEndpoint`], so it is
//! agnostic to which one it is running over.
//!
//! A link endpoint is three halves:
//! - `outgoing`: frames the channel hands to the link for the peer
//! - `incoming`: frames the link surfaces from the peer
//! - `state`: a watch of link connectivity, carrying the peer identity
//!   once the handshake has completed
//!
//! Frames sent while the link is down are dropped by the link layer; the
//! device channel re-syncs its item table on every reconnect, and direct
//! messages are never sent on a down link in the first place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fitmatch_core::Node;
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::protocol::LinkFrame;

/// Frame buffer size for each direction of a link.
const LINK_BUFFER: usize = 64;

// =============================================================================
// Link State
// =============================================================================

/// Identity of the device on the far side of an established link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerInfo {
    /// The peer node.
    pub node: Node,
}

/// Connectivity of the device link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// No connection to the peer.
    Down,
    /// A connection attempt or handshake is in progress.
    Connecting,
    /// Connected and handshaken; the peer identity is known.
    Up(PeerInfo),
}

impl LinkState {
    /// Returns the connected peer, if any.
    pub fn peer(&self) -> Option<&PeerInfo> {
        match self {
            LinkState::Up(peer) => Some(peer),
            _ => None,
        }
    }
}

impl std::fmt::Display for LinkState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkState::Down => write!(f, "down"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Up(peer) => write!(f, "up ({})", peer.node.id),
        }
    }
}

// =============================================================================
// Link Endpoint
// =============================================================================

/// One device's end of the link.
pub struct LinkEndpoint {
    /// Frames to hand to the link for delivery to the peer.
    pub outgoing: mpsc::Sender<LinkFrame>,

    /// Frames the link surfaced from the peer.
    pub incoming: mpsc::Receiver<LinkFrame>,

    /// Observable link connectivity.
    pub state: watch::Receiver<LinkState>,
}

// =============================================================================
// In-Memory Link
// =============================================================================

/// An in-process link pair for tests and local rigs.
///
/// Both endpoints start connected. [`LinkControl::sever`] simulates losing
/// the peer (frames in flight are dropped); [`LinkControl::restore`] brings
/// the link back, which prompts both channels to re-sync their item tables.
pub struct MemoryLink;

/// Test-side control over an in-memory link pair.
pub struct LinkControl {
    severed: Arc<AtomicBool>,
    a_state: watch::Sender<LinkState>,
    b_state: watch::Sender<LinkState>,
    a_peer: PeerInfo,
    b_peer: PeerInfo,
}

impl LinkControl {
    /// Simulates losing the connection between the two devices.
    pub fn sever(&self) {
        self.severed.store(true, Ordering::SeqCst);
        let _ = self.a_state.send(LinkState::Down);
        let _ = self.b_state.send(LinkState::Down);
        debug!("memory link severed");
    }

    /// Restores the connection.
    pub fn restore(&self) {
        self.severed.store(false, Ordering::SeqCst);
        let _ = self.a_state.send(LinkState::Up(self.a_peer.clone()));
        let _ = self.b_state.send(LinkState::Up(self.b_peer.clone()));
        debug!("memory link restored");
    }
}

impl MemoryLink {
    /// Creates a connected endpoint pair.
    ///
    /// `a_node` and `b_node` are the identities of the two devices; each
    /// endpoint's state reports the *other* device as its peer.
    pub fn pair(a_node: Node, b_node: Node) -> (LinkEndpoint, LinkEndpoint, LinkControl) {
        let (a_out_tx, a_out_rx) = mpsc::channel::<LinkFrame>(LINK_BUFFER);
        let (a_in_tx, a_in_rx) = mpsc::channel::<LinkFrame>(LINK_BUFFER);
        let (b_out_tx, b_out_rx) = mpsc::channel::<LinkFrame>(LINK_BUFFER);
        let (b_in_tx, b_in_rx) = mpsc::channel::<LinkFrame>(LINK_BUFFER);

        let a_peer = PeerInfo { node: b_node };
        let b_peer = PeerInfo { node: a_node };

        let (a_state_tx, a_state_rx) = watch::channel(LinkState::Up(a_peer.clone()));
        let (b_state_tx, b_state_rx) = watch::channel(LinkState::Up(b_peer.clone()));

        let severed = Arc::new(AtomicBool::new(false));

        // a → b forwarder
        tokio::spawn(Self::forward(a_out_rx, b_in_tx, severed.clone()));
        // b → a forwarder
        tokio::spawn(Self::forward(b_out_rx, a_in_tx, severed.clone()));

        let a_endpoint = LinkEndpoint {
            outgoing: a_out_tx,
            incoming: a_in_rx,
            state: a_state_rx,
        };
        let b_endpoint = LinkEndpoint {
            outgoing: b_out_tx,
            incoming: b_in_rx,
            state: b_state_rx,
        };
        let control = LinkControl {
            severed,
            a_state: a_state_tx,
            b_state: b_state_tx,
            a_peer,
            b_peer,
        };

        (a_endpoint, b_endpoint, control)
    }

    /// Forwards frames from one side to the other, dropping while severed.
    async fn forward(
        mut from: mpsc::Receiver<LinkFrame>,
        to: mpsc::Sender<LinkFrame>,
        severed: Arc<AtomicBool>,
    ) {
        while let Some(frame) = from.recv().await {
            if severed.load(Ordering::SeqCst) {
                debug!(frame = frame.type_name(), "dropping frame on severed link");
                continue;
            }
            if to.send(frame).await.is_err() {
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{HelloPayload, LinkFrame};

    fn nodes() -> (Node, Node) {
        (
            Node::new("node-p", "Phone"),
            Node::new("node-w", "Pixel Watch"),
        )
    }

    #[tokio::test]
    async fn test_pair_reports_opposite_peers() {
        let (phone, watch_node) = nodes();
        let (a, b, _control) = MemoryLink::pair(phone.clone(), watch_node.clone());

        assert_eq!(
            a.state.borrow().peer().map(|p| p.node.clone()),
            Some(watch_node)
        );
        assert_eq!(b.state.borrow().peer().map(|p| p.node.clone()), Some(phone));
    }

    #[tokio::test]
    async fn test_frames_cross_the_pair() {
        let (phone, watch_node) = nodes();
        let (a, mut b, _control) = MemoryLink::pair(phone, watch_node);

        let frame = LinkFrame::Hello(HelloPayload::new("node-p", "Phone"));
        a.outgoing.send(frame).await.unwrap();

        let received = b.incoming.recv().await.unwrap();
        assert_eq!(received.type_name(), "Hello");
    }

    #[tokio::test]
    async fn test_severed_link_drops_frames_and_reports_down() {
        let (phone, watch_node) = nodes();
        let (a, mut b, control) = MemoryLink::pair(phone, watch_node);

        control.sever();
        assert_eq!(*a.state.borrow(), LinkState::Down);

        a.outgoing
            .send(LinkFrame::error("TEST", "dropped"))
            .await
            .unwrap();

        // Nothing arrives while severed.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(b.incoming.try_recv().is_err());

        control.restore();
        assert!(matches!(&*a.state.borrow(), LinkState::Up(_)));
    }
}
