//! # Wire Protocol
//!
//! Frame and payload types for the device link.
//!
//! ## Protocol Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Data Layer Frames                                 │
//! │                                                                         │
//! │  HANDSHAKE FLOW                                                        │
//! │  ──────────────                                                        │
//! │  WATCH ───► Hello { nodeId, nodeName, protocolVersion }                │
//! │  PHONE ◄─── Welcome { nodeId, nodeName, serverTimeMs }                 │
//! │                                                                         │
//! │  ITEM SYNC (store-and-forward, per-path last-write-wins)               │
//! │  ──────────────────────────────────────────────────────                │
//! │  Either ──► SetItem { path, payload, timestamp }                       │
//! │                                                                         │
//! │  DIRECT MESSAGES (unqueued, fail fast when peer unreachable)           │
//! │  ───────────────────────────────────────────────────────────           │
//! │  Either ──► Message { path, payload, timestamp }                       │
//! │                                                                         │
//! │  ERROR                                                                 │
//! │  ─────                                                                 │
//! │  Either ──► Error { code, message }    (e.g. VERSION_MISMATCH)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Wire Format (JSON)
//! Frames are serialized as tagged JSON using serde's adjacently tagged enum:
//! ```json
//! { "type": "SetItem", "payload": { "path": "/fitmatch/product", ... } }
//! ```
//!
//! The envelope `timestamp` (epoch milliseconds, stamped by the sending
//! channel from a monotonically non-decreasing source) is the single
//! timestamp of a write: last-write-wins comparisons and the event
//! timestamps surfaced to subscribers both read it.

use serde::{Deserialize, Serialize};

/// Current protocol version.
///
/// Negotiated once per link in the Hello/Welcome handshake; a mismatch
/// refuses the link. Item and message payloads carry no version of their
/// own.
pub const PROTOCOL_VERSION: u32 = 1;

/// Error code sent before closing a link whose peer version is unsupported.
pub const CODE_VERSION_MISMATCH: &str = "VERSION_MISMATCH";

/// Checks a peer's protocol version during the handshake.
///
/// There is no negotiation: the pairing ships as one product, so anything
/// other than an exact match refuses the link.
pub fn check_version(remote: u32) -> Result<(), crate::error::SyncError> {
    if remote == PROTOCOL_VERSION {
        Ok(())
    } else {
        Err(crate::error::SyncError::UnsupportedVersion {
            local: PROTOCOL_VERSION,
            remote,
        })
    }
}

// =============================================================================
// Link Frames (Tagged Union)
// =============================================================================

/// All frames exchanged over the device link.
///
/// Uses serde's adjacently tagged enum for clean JSON serialization:
/// `{ "type": "Hello", "payload": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum LinkFrame {
    /// Initial frame from the dialing device.
    Hello(HelloPayload),

    /// Response from the hosting device after a successful handshake.
    Welcome(WelcomePayload),

    /// A path-addressed item write being synced to the peer.
    SetItem(ItemRecord),

    /// A direct message for the peer.
    Message(MessageRecord),

    /// A refusal or protocol error, usually followed by a close.
    Error { code: String, message: String },
}

impl LinkFrame {
    /// Returns the frame type name as a string (for logging).
    pub fn type_name(&self) -> &'static str {
        match self {
            LinkFrame::Hello(_) => "Hello",
            LinkFrame::Welcome(_) => "Welcome",
            LinkFrame::SetItem(_) => "SetItem",
            LinkFrame::Message(_) => "Message",
            LinkFrame::Error { .. } => "Error",
        }
    }

    /// Creates an Error frame.
    pub fn error(code: &str, message: &str) -> Self {
        LinkFrame::Error {
            code: code.to_string(),
            message: message.to_string(),
        }
    }

    /// Serializes to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes from JSON string.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

// =============================================================================
// Handshake Payloads
// =============================================================================

/// Hello frame sent by the dialing device on connect.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HelloPayload {
    /// Node identifier of the dialing device.
    pub node_id: String,

    /// Human-readable device name.
    pub node_name: String,

    /// Protocol version supported by the dialing device.
    pub protocol_version: u32,
}

impl HelloPayload {
    pub fn new(node_id: &str, node_name: &str) -> Self {
        HelloPayload {
            node_id: node_id.to_string(),
            node_name: node_name.to_string(),
            protocol_version: PROTOCOL_VERSION,
        }
    }
}

/// Welcome frame sent by the hosting device after accepting a Hello.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WelcomePayload {
    /// Node identifier of the hosting device.
    pub node_id: String,

    /// Human-readable device name.
    pub node_name: String,

    /// Host wall-clock at accept time, epoch milliseconds.
    pub server_time_ms: i64,
}

// =============================================================================
// Item & Message Records
// =============================================================================

/// A path-addressed item write.
///
/// Items are persisted per path on both devices; a write with an older
/// timestamp than the stored one is stale and discarded on receipt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemRecord {
    /// Well-known path this item lives at.
    pub path: String,

    /// JSON payload (e.g. `{"product": "<encoded-product>"}`).
    pub payload: serde_json::Value,

    /// Send timestamp, epoch milliseconds.
    pub timestamp: i64,
}

/// A direct, unqueued message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Well-known path this message is addressed to.
    pub path: String,

    /// JSON payload (e.g. `{"productId": "sku-123"}`).
    pub payload: serde_json::Value,

    /// Send timestamp, epoch milliseconds.
    pub timestamp: i64,
}

// =============================================================================
// Path Payload Shapes
// =============================================================================

/// Payload stored at `/fitmatch/product`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    /// The encoded product text (see [`crate::codec`]).
    pub product: String,
}

/// Payload sent on the action paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionPayload {
    /// The product the action applies to.
    pub product_id: String,
}

/// Payload sent on the delivery event paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// Optional free-text detail (caller name, message preview, next turn).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_serialization_is_tagged() {
        let hello = LinkFrame::Hello(HelloPayload::new("node-w", "Pixel Watch"));
        let json = hello.to_json().unwrap();
        assert!(json.contains("\"type\":\"Hello\""));
        assert!(json.contains("node-w"));

        let parsed = LinkFrame::from_json(&json).unwrap();
        if let LinkFrame::Hello(payload) = parsed {
            assert_eq!(payload.node_id, "node-w");
            assert_eq!(payload.protocol_version, PROTOCOL_VERSION);
        } else {
            panic!("Expected Hello frame");
        }
    }

    #[test]
    fn test_item_record_round_trip() {
        let frame = LinkFrame::SetItem(ItemRecord {
            path: crate::paths::PRODUCT.to_string(),
            payload: serde_json::json!({"product": "{\"id\":\"sku-1\"}"}),
            timestamp: 1_700_000_000_000,
        });
        let json = frame.to_json().unwrap();
        assert!(json.contains("SetItem"));
        assert!(json.contains("/fitmatch/product"));

        let parsed = LinkFrame::from_json(&json).unwrap();
        if let LinkFrame::SetItem(rec) = parsed {
            assert_eq!(rec.timestamp, 1_700_000_000_000);
        } else {
            panic!("Expected SetItem frame");
        }
    }

    #[test]
    fn test_action_payload_camel_case() {
        let payload = ActionPayload {
            product_id: "sku-123".to_string(),
        };
        let json = serde_json::to_string(&payload).unwrap();
        assert_eq!(json, r#"{"productId":"sku-123"}"#);
    }

    #[test]
    fn test_event_payload_omits_empty_detail() {
        let json = serde_json::to_string(&EventPayload { detail: None }).unwrap();
        assert_eq!(json, "{}");

        let back: EventPayload = serde_json::from_str("{}").unwrap();
        assert!(back.detail.is_none());
    }

    #[test]
    fn test_error_frame() {
        let frame = LinkFrame::error(CODE_VERSION_MISMATCH, "peer speaks v9");
        let json = frame.to_json().unwrap();
        assert!(json.contains(CODE_VERSION_MISMATCH));
    }

    #[test]
    fn test_version_gate() {
        use crate::error::SyncError;

        assert!(check_version(PROTOCOL_VERSION).is_ok());

        match check_version(PROTOCOL_VERSION + 1) {
            Err(SyncError::UnsupportedVersion { local, remote }) => {
                assert_eq!(local, PROTOCOL_VERSION);
                assert_eq!(remote, PROTOCOL_VERSION + 1);
            }
            other => panic!("expected UnsupportedVersion, got {:?}", other),
        }
    }
}
