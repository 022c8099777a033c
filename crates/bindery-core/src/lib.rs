//! # bindery-core: Pure Business Logic for bindery
//!
//! This crate is the heart of the bindery order-fulfillment core. It
//! contains all business logic as pure functions with zero I/O
//! dependencies.
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Book, CartLine, Order, PreOrder, Payment)
//! - [`money`] - Money type with integer arithmetic (no floating point!)
//! - [`totals`] - Checkout totals: shipping, promo discounts, tax
//! - [`error`] - Domain error types
//! - [`validation`] - Business rule validation
//!
//! ## Design Principles
//!
//! 1. **Pure Functions**: every function is deterministic
//! 2. **No I/O**: database, network, and file system access are forbidden
//!    here
//! 3. **Integer Money**: all monetary values are in cents (i64)
//! 4. **Explicit Errors**: all errors are typed, never strings or panics
//!
//! ## Example Usage
//!
//! ```rust
//! use bindery_core::money::Money;
//! use bindery_core::totals::{CheckoutTotals, ShippingOption};
//! use bindery_core::types::TaxRate;
//!
//! // Two copies at $20.00 each
//! let subtotal = Money::from_cents(4000);
//!
//! let totals = CheckoutTotals::compute(
//!     subtotal,
//!     ShippingOption::Standard.fee(),
//!     1000, // SAVE10: 10% off
//!     TaxRate::from_bps(600),
//! );
//!
//! assert_eq!(totals.total.cents(), 4316);
//! ```

pub mod error;
pub mod money;
pub mod totals;
pub mod types;
pub mod validation;

pub use error::{CoreError, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum distinct lines allowed in a single cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum quantity of a single line in a cart or pre-order.
pub const MAX_LINE_QUANTITY: i64 = 999;

/// Minimum length of a shipping or billing address, after trimming.
pub const MIN_ADDRESS_LEN: usize = 10;

/// Maximum length of an address field.
pub const MAX_ADDRESS_LEN: usize = 500;

/// A payment may exceed the order total by at most this many cents
/// (rounding differences, tips).
pub const OVERPAY_TOLERANCE_CENTS: i64 = 100;

/// Days from confirmation to the expected delivery date of a pre-order.
pub const PRE_ORDER_DELIVERY_DAYS: i64 = 30;

/// Sales tax applied to the discounted item subtotal, in basis points.
/// Overridable through service configuration.
pub const DEFAULT_TAX_RATE_BPS: u32 = 600;
