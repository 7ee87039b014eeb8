//! # Domain Types
//!
//! Core domain types used throughout FitMatch.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │  ActionEvent    │   │ DeliveryEvent   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  kind           │   │  kind           │       │
//! │  │  title, brand   │   │  product_id?    │   │  detail?        │       │
//! │  │  price (Money)  │   │  timestamp_ms   │   │  timestamp_ms   │       │
//! │  │  image_url      │   └─────────────────┘   └─────────────────┘       │
//! │  │  category,color │                                                   │
//! │  │  size (opt.)    │   ┌─────────────────┐   ┌─────────────────┐       │
//! │  └─────────────────┘   │   ActionKind    │   │      Node       │       │
//! │                        │  Like / Pass /  │   │  id             │       │
//! │                        │  RequestNext    │   │  name           │       │
//! │                        └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A product record is immutable once constructed. Every synchronization
//! event carries a fresh instance; nothing in the protocol mutates one in
//! place.

use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Product
// =============================================================================

/// A catalog product as exchanged between the phone and the watch.
///
/// The identifier is unique per catalog entry. The watch keeps at most one
/// product at a time; a newly pushed product supersedes the previous one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Unique catalog identifier.
    pub id: String,

    /// Display title shown on the discovery card.
    pub title: String,

    /// Brand name.
    pub brand: String,

    /// Price in minor currency units.
    pub price: Money,

    /// Image reference (URL).
    pub image_url: String,

    /// Category (e.g. "jackets", "sneakers").
    pub category: String,

    /// Primary color.
    pub color: String,

    /// Size label. Optional; defaults to empty for one-size items.
    #[serde(default)]
    pub size: String,
}

impl Product {
    /// Creates a product with an empty size label.
    ///
    /// ## Example
    /// ```rust
    /// use fitmatch_core::{Money, Product};
    ///
    /// let p = Product::new("sku-123", "Denim Jacket", "Acme",
    ///                      Money::from_minor_units(7999),
    ///                      "https://img.example.com/sku-123.jpg",
    ///                      "jackets", "blue");
    /// assert!(p.size.is_empty());
    /// ```
    pub fn new(
        id: impl Into<String>,
        title: impl Into<String>,
        brand: impl Into<String>,
        price: Money,
        image_url: impl Into<String>,
        category: impl Into<String>,
        color: impl Into<String>,
    ) -> Self {
        Product {
            id: id.into(),
            title: title.into(),
            brand: brand.into(),
            price,
            image_url: image_url.into(),
            category: category.into(),
            color: color.into(),
            size: String::new(),
        }
    }

    /// Returns a copy of this product with the given size label.
    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }
}

// =============================================================================
// Action Events
// =============================================================================

/// The kind of action a watch user can take on the discovery feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// The user liked the current product.
    Like,

    /// The user passed on the current product.
    Pass,

    /// The watch wants the next product pushed.
    RequestNext,
}

impl ActionKind {
    /// Returns true if this kind must carry a product identifier.
    pub const fn requires_product_id(&self) -> bool {
        matches!(self, ActionKind::Like | ActionKind::Pass)
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionKind::Like => write!(f, "like"),
            ActionKind::Pass => write!(f, "pass"),
            ActionKind::RequestNext => write!(f, "request_next"),
        }
    }
}

/// An action taken on a device, stamped at send time.
///
/// LIKE and PASS reference the product they apply to; REQUEST_NEXT carries
/// no payload beyond its timestamp. The constructors make a LIKE or PASS
/// without a product id unrepresentable; the only way to build one is
/// through [`ActionEvent::like`] / [`ActionEvent::pass`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionEvent {
    /// What happened.
    pub kind: ActionKind,

    /// The product the action applies to. `None` only for REQUEST_NEXT.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,

    /// Wall-clock send time, epoch milliseconds.
    pub timestamp_ms: i64,
}

impl ActionEvent {
    /// Creates a LIKE for the given product.
    pub fn like(product_id: impl Into<String>, timestamp_ms: i64) -> Self {
        ActionEvent {
            kind: ActionKind::Like,
            product_id: Some(product_id.into()),
            timestamp_ms,
        }
    }

    /// Creates a PASS for the given product.
    pub fn pass(product_id: impl Into<String>, timestamp_ms: i64) -> Self {
        ActionEvent {
            kind: ActionKind::Pass,
            product_id: Some(product_id.into()),
            timestamp_ms,
        }
    }

    /// Creates a REQUEST_NEXT marker.
    pub fn request_next(timestamp_ms: i64) -> Self {
        ActionEvent {
            kind: ActionKind::RequestNext,
            product_id: None,
            timestamp_ms,
        }
    }

    /// Returns true if the product-id invariant holds for this event.
    pub fn is_well_formed(&self) -> bool {
        !self.kind.requires_product_id() || self.product_id.is_some()
    }
}

// =============================================================================
// Delivery Events
// =============================================================================

/// Events exchanged during the delivery-tracking flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryEventKind {
    /// An incoming or requested voice call.
    Call,

    /// A chat message notification.
    Chat,

    /// A navigation update for the courier route.
    Navigation,
}

impl std::fmt::Display for DeliveryEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryEventKind::Call => write!(f, "call"),
            DeliveryEventKind::Chat => write!(f, "chat"),
            DeliveryEventKind::Navigation => write!(f, "navigation"),
        }
    }
}

/// A delivery-tracking event, stamped at send time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryEvent {
    /// What happened.
    pub kind: DeliveryEventKind,

    /// Optional free-text detail (caller name, message preview, next turn).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,

    /// Wall-clock send time, epoch milliseconds.
    pub timestamp_ms: i64,
}

impl DeliveryEvent {
    /// Creates a delivery event.
    pub fn new(kind: DeliveryEventKind, detail: Option<String>, timestamp_ms: i64) -> Self {
        DeliveryEvent {
            kind,
            detail,
            timestamp_ms,
        }
    }
}

// =============================================================================
// Nodes
// =============================================================================

/// A paired companion device reachable through the transport.
///
/// Discovered on demand. Callers must not cache a node beyond one use; the
/// snapshot it came from is already stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Opaque identifier of the device.
    pub id: String,

    /// Human-readable device name.
    pub name: String,
}

impl Node {
    /// Creates a node descriptor.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Node {
            id: id.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.id)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

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
    fn test_product_defaults_empty_size() {
        let p = sample_product();
        assert!(p.size.is_empty());

        let sized = p.with_size("M");
        assert_eq!(sized.size, "M");
    }

    #[test]
    fn test_product_serde_camel_case() {
        let json = serde_json::to_string(&sample_product()).unwrap();
        assert!(json.contains("\"imageUrl\""));
        assert!(json.contains("\"price\":7999"));
    }

    #[test]
    fn test_product_size_optional_on_decode() {
        // A payload without a size field decodes to the empty default.
        let json = r#"{
            "id": "sku-9", "title": "Tee", "brand": "Acme", "price": 1299,
            "imageUrl": "https://img.example.com/9.jpg",
            "category": "tees", "color": "white"
        }"#;
        let p: Product = serde_json::from_str(json).unwrap();
        assert!(p.size.is_empty());
    }

    #[test]
    fn test_action_constructors_enforce_product_id() {
        let like = ActionEvent::like("sku-123", 1_700_000_000_000);
        assert_eq!(like.kind, ActionKind::Like);
        assert_eq!(like.product_id.as_deref(), Some("sku-123"));
        assert!(like.is_well_formed());

        let request = ActionEvent::request_next(1_700_000_000_000);
        assert!(request.product_id.is_none());
        assert!(request.is_well_formed());
    }

    #[test]
    fn test_action_kind_requirements() {
        assert!(ActionKind::Like.requires_product_id());
        assert!(ActionKind::Pass.requires_product_id());
        assert!(!ActionKind::RequestNext.requires_product_id());
    }

    #[test]
    fn test_delivery_event_kind_display() {
        assert_eq!(DeliveryEventKind::Call.to_string(), "call");
        assert_eq!(DeliveryEventKind::Navigation.to_string(), "navigation");
    }

    #[test]
    fn test_node_display() {
        let node = Node::new("node-a", "Pixel Watch");
        assert_eq!(node.to_string(), "Pixel Watch (node-a)");
    }
}
