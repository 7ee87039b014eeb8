//! # Error Types
//!
//! Domain-specific error types for fitmatch-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  fitmatch-core errors (this file)                                      │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  fitmatch-sync errors (separate crate)                                 │
//! │  ├── CodecError       - Payload encode/decode failures                 │
//! │  └── SyncError        - Transport and protocol failures                │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → caller                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (field, id, limit)
//! 3. Errors are enum variants, never String

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A value failed validation.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// An action event violates the product-id invariant.
    ///
    /// ## When This Occurs
    /// - A LIKE or PASS was deserialized from the wire without a product id
    /// - A hand-built `ActionEvent` bypassed the constructors
    #[error("{kind} action is missing its product id")]
    MalformedAction { kind: String },
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation failures.
///
/// Each variant names the offending field so callers can surface a precise
/// message without string matching.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A field exceeds its maximum length.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// A field has an invalid format.
    #[error("{field} is invalid: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// A price is negative.
    #[error("price must not be negative, got {minor_units}")]
    NegativePrice { minor_units: i64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_context() {
        let err = ValidationError::TooLong {
            field: "title".to_string(),
            max: 200,
        };
        assert!(err.to_string().contains("title"));
        assert!(err.to_string().contains("200"));
    }

    #[test]
    fn test_validation_error_converts_to_core_error() {
        let err: CoreError = ValidationError::Required {
            field: "id".to_string(),
        }
        .into();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
