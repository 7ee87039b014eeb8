//! # fitmatch-core: Pure Domain Types for FitMatch
//!
//! This crate is the **heart** of the FitMatch workspace. It contains the
//! domain model exchanged between the phone and the watch, with zero I/O
//! dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       FitMatch Architecture                             │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │              Phone / Watch UI (out of scope)                    │   │
//! │  │    discovery feed, cart, delivery tracking, chat                │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ manager handles                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                  fitmatch-sync (protocol crate)                 │   │
//! │  │    codec, paths, device channel, listener, managers             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ fitmatch-core (THIS CRATE) ★                    │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   money   │  │ validation│  │   error   │  │   │
//! │  │   │  Product  │  │   Money   │  │   rules   │  │  domain   │  │   │
//! │  │   │  Actions  │  │ (minor u.)│  │  checks   │  │  errors   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO NETWORK • PURE FUNCTIONS                         │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, ActionEvent, DeliveryEvent, Node)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`error`] - Domain error types
//! - [`validation`] - Field rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: Every function is deterministic, same input = same output
//! 2. **No I/O**: Network, file system, and clock access are FORBIDDEN here;
//!    timestamps are plain `i64` values stamped by the caller
//! 3. **Integer Money**: All prices are in minor currency units (i64)
//! 4. **Explicit Errors**: All errors are typed, never strings or panics

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================
// These allow users to do `use fitmatch_core::Product` instead of
// `use fitmatch_core::types::Product`

pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum length of a product identifier.
///
/// Catalog ids are short SKU-style strings. Anything longer is almost
/// certainly a payload stuffed into the wrong field.
pub const MAX_ID_LEN: usize = 64;

/// Maximum length of a display text field (title, brand, category, color, size).
pub const MAX_TEXT_LEN: usize = 200;

/// Maximum length of an image reference.
///
/// Matches the practical URL limit of common CDNs.
pub const MAX_URL_LEN: usize = 2048;
