//! # Product Payload Codec
//!
//! Converts a product record to its transport representation and back.
//!
//! The encoded form is a JSON object, so it is self-describing (field names
//! are embedded) and `decode_product` is independent of field order. Unknown
//! fields are ignored on decode, which keeps old builds compatible with
//! payloads from newer peers. There is no version field inside the payload;
//! version compatibility is settled once per link during the handshake.

use fitmatch_core::Product;
use thiserror::Error;

// =============================================================================
// Codec Errors
// =============================================================================

/// Payload encode/decode failures.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Failed to serialize a product.
    #[error("Failed to encode product: {0}")]
    Encode(#[source] serde_json::Error),

    /// The text is not well-formed or a required field is missing.
    #[error("Failed to decode product: {0}")]
    Decode(#[source] serde_json::Error),

    /// The payload text is empty.
    #[error("Product payload is empty")]
    EmptyPayload,
}

// =============================================================================
// Encode / Decode
// =============================================================================

/// Encodes a product to its transport text.
///
/// Total and deterministic for any well-formed product.
pub fn encode_product(product: &Product) -> Result<String, CodecError> {
    serde_json::to_string(product).map_err(CodecError::Encode)
}

/// Decodes a product from transport text.
///
/// Fails when the text is not well-formed JSON or a required field is
/// missing. Extra fields are ignored.
pub fn decode_product(text: &str) -> Result<Product, CodecError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(CodecError::EmptyPayload);
    }

    serde_json::from_str(text).map_err(CodecError::Decode)
}

// =============================================================================
// Unit Tests
// =============================================================================
