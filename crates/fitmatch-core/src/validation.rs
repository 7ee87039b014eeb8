//! # Validation Module
//!
//! Field validation for products and action events.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Construction (types.rs)                                      │
//! │  └── Constructors make invalid shapes unrepresentable                  │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: THIS MODULE                                                  │
//! │  └── Field rules checked before a product leaves the device            │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Decode (fitmatch-sync codec)                                 │
//! │  └── Structural checks on anything arriving from the wire              │
//! │                                                                         │
//! │  Defense in depth: each layer catches a different failure class        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,no_run
//! use fitmatch_core::validation::validate_product_id;
//!
//! validate_product_id("sku-123").unwrap();
//! ```

use crate::error::ValidationError;
use crate::types::{ActionEvent, Product};
use crate::{MAX_ID_LEN, MAX_TEXT_LEN, MAX_URL_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Field Validators
// =============================================================================

/// Validates a product identifier.
///
/// ## Rules
/// - Must not be empty
/// - Must be at most 64 characters
/// - Must contain only alphanumeric characters, hyphens, underscores
///
/// ## Example
/// ```rust
/// use fitmatch_core::validation::validate_product_id;
///
/// assert!(validate_product_id("sku-123").is_ok());
/// assert!(validate_product_id("").is_err());
/// ```
pub fn validate_product_id(id: &str) -> ValidationResult<()> {
    let id = id.trim();

    if id.is_empty() {
        return Err(ValidationError::Required {
            field: "id".to_string(),
        });
    }

    if id.len() > MAX_ID_LEN {
        return Err(ValidationError::TooLong {
            field: "id".to_string(),
            max: MAX_ID_LEN,
        });
    }

    if !id
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "id".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(())
}

/// Validates a display text field (title, brand, category, color, size).
pub fn validate_text(field: &'static str, value: &str, required: bool) -> ValidationResult<()> {
    let value = value.trim();

    if value.is_empty() {
        if required {
            return Err(ValidationError::Required {
                field: field.to_string(),
            });
        }
        return Ok(());
    }

    if value.len() > MAX_TEXT_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_TEXT_LEN,
        });
    }

    Ok(())
}

/// Validates an image reference.
///
/// ## Rules
/// - Must not be empty
/// - Must start with `http://` or `https://`
/// - Must be at most 2048 characters
pub fn validate_image_url(url: &str) -> ValidationResult<()> {
    let url = url.trim();

    if url.is_empty() {
        return Err(ValidationError::Required {
            field: "imageUrl".to_string(),
        });
    }

    if url.len() > MAX_URL_LEN {
        return Err(ValidationError::TooLong {
            field: "imageUrl".to_string(),
            max: MAX_URL_LEN,
        });
    }

    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ValidationError::InvalidFormat {
            field: "imageUrl".to_string(),
            reason: "must start with http:// or https://".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Validates a complete product record before it is pushed.
pub fn validate_product(product: &Product) -> ValidationResult<()> {
    validate_product_id(&product.id)?;
    validate_text("title", &product.title, true)?;
    validate_text("brand", &product.brand, true)?;
    validate_text("category", &product.category, true)?;
    validate_text("color", &product.color, true)?;
    validate_text("size", &product.size, false)?;
    validate_image_url(&product.image_url)?;

    if product.price.is_negative() {
        return Err(ValidationError::NegativePrice {
            minor_units: product.price.minor_units(),
        });
    }

    Ok(())
}

/// Validates an action event before it is sent.
pub fn validate_action(event: &ActionEvent) -> ValidationResult<()> {
    if let Some(ref id) = event.product_id {
        validate_product_id(id)?;
    } else if event.kind.requires_product_id() {
        return Err(ValidationError::Required {
            field: "productId".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::money::Money;
    use crate::types::ActionKind;

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
    }

    #[test]
    fn test_valid_product_passes() {
        assert!(validate_product(&sample_product()).is_ok());
    }

    #[test]
    fn test_product_id_rules() {
        assert!(validate_product_id("sku-123").is_ok());
        assert!(validate_product_id("SKU_9").is_ok());
        assert!(validate_product_id("").is_err());
        assert!(validate_product_id("has space").is_err());
        assert!(validate_product_id(&"x".repeat(65)).is_err());
    }

    #[test]
    fn test_image_url_rules() {
        assert!(validate_image_url("https://img.example.com/a.jpg").is_ok());
        assert!(validate_image_url("http://img.example.com/a.jpg").is_ok());
        assert!(validate_image_url("ftp://img.example.com/a.jpg").is_err());
        assert!(validate_image_url("").is_err());
    }

    #[test]
    fn test_negative_price_rejected() {
        let mut p = sample_product();
        p.price = Money::from_minor_units(-1);
        assert_eq!(
            validate_product(&p),
            Err(ValidationError::NegativePrice { minor_units: -1 })
        );
    }

    #[test]
    fn test_empty_size_is_allowed() {
        let p = sample_product();
        assert!(p.size.is_empty());
        assert!(validate_product(&p).is_ok());
    }

    #[test]
    fn test_action_requires_product_id() {
        let like = ActionEvent::like("sku-123", 0);
        assert!(validate_action(&like).is_ok());

        let request = ActionEvent::request_next(0);
        assert!(validate_action(&request).is_ok());

        // A hand-built event that bypassed the constructors.
        let broken = ActionEvent {
            kind: ActionKind::Like,
            product_id: None,
            timestamp_ms: 0,
        };
        assert!(validate_action(&broken).is_err());
    }
}
