//! # Sync Error Types
//!
//! Error types for the phone↔watch data layer.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  NotConnected   │  │  InvalidPath            │ │
//! │  │  MissingDeviceId│  │  ConnectionFail │  │  UnsupportedVersion     │ │
//! │  │  InvalidUrl     │  │  LinkClosed     │  │  Codec / Validation     │ │
//! │  │  ConfigLoad/Save│  │  Timeout        │  │  UnexpectedPayload      │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  Discovery failure is a Transport error, never an empty node list:     │
//! │  Ok(vec![]) always means a verified-empty snapshot.                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use crate::codec::CodecError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all data-layer failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Missing device ID (required for pairing).
    #[error("Device ID not configured. Run initial setup first.")]
    MissingDeviceId,

    /// Invalid peer URL.
    #[error("Invalid peer URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// No companion node is currently connected.
    ///
    /// Returned by the addressed message channel; it never queues.
    #[error("No companion node is currently connected")]
    NotConnected,

    /// Failed to establish the device link.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The device link closed while an operation was in flight.
    #[error("Device link closed")]
    LinkClosed,

    /// An operation exceeded its configured timeout.
    #[error("Operation timed out after {0} ms")]
    Timeout(u64),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// A path did not match the well-known addressing scheme.
    #[error("Unknown sync path: {0}")]
    InvalidPath(String),

    /// The peer speaks an incompatible protocol version.
    #[error("Unsupported protocol version: peer has {remote}, this device has {local}")]
    UnsupportedVersion { local: u32, remote: u32 },

    /// The host refused the handshake (e.g. version mismatch).
    #[error("Handshake refused: {code}: {message}")]
    HandshakeRefused { code: String, message: String },

    /// Payload encode/decode failure.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// A field failed domain validation before send.
    #[error(transparent)]
    Validation(#[from] fitmatch_core::ValidationError),

    /// A payload arrived on a path it does not belong to.
    #[error("Unexpected payload on {path}: {reason}")]
    UnexpectedPayload { path: String, reason: String },

    /// Failed to serialize a link frame.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// The device channel task is gone.
    #[error("Device channel closed: {0}")]
    ChannelClosed(String),

    /// The component is shutting down.
    #[error("Sync is shutting down")]
    ShuttingDown,

    /// Internal invariant violation.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConnectionFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed | WsError::AlreadyClosed => SyncError::LinkClosed,
            WsError::Io(io) => SyncError::ConnectionFailed(io.to_string()),
            other => SyncError::ConnectionFailed(other.to_string()),
        }
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the failed operation could succeed on a later attempt.
    ///
    /// The protocol itself never retries; this classification exists for the
    /// UI layer deciding whether to offer a retry affordance.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::NotConnected
                | SyncError::ConnectionFailed(_)
                | SyncError::LinkClosed
                | SyncError::Timeout(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingDeviceId
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error indicates a protocol mismatch or bad payload.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidPath(_)
                | SyncError::UnsupportedVersion { .. }
                | SyncError::HandshakeRefused { .. }
                | SyncError::Codec(_)
                | SyncError::Validation(_)
                | SyncError::UnexpectedPayload { .. }
                | SyncError::SerializationFailed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::NotConnected.is_retryable());
        assert!(SyncError::Timeout(5000).is_retryable());
        assert!(SyncError::LinkClosed.is_retryable());

        assert!(!SyncError::InvalidConfig("bad".into()).is_retryable());
        assert!(!SyncError::UnsupportedVersion { local: 1, remote: 2 }.is_retryable());
    }

    #[test]
    fn test_category_helpers_are_disjoint() {
        let config = SyncError::MissingDeviceId;
        assert!(config.is_config_error());
        assert!(!config.is_protocol_error());

        let protocol = SyncError::InvalidPath("/nope".into());
        assert!(protocol.is_protocol_error());
        assert!(!protocol.is_config_error());
        assert!(!protocol.is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::UnsupportedVersion { local: 1, remote: 9 };
        assert!(err.to_string().contains('9'));
        assert!(err.to_string().contains('1'));
    }
}
