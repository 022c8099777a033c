//! # Domain Types
//!
//! Core domain types used throughout bindery.
//!
//! ## Entity Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  Book ──────────┐  read-only catalog record; `stock` is written only   │
//! │                 │  by the inventory ledger                              │
//! │                 ▼                                                       │
//! │  CartLine ──► Order ──► OrderLine   price_cents snapshotted at         │
//! │      │                              checkout (price-at-purchase)        │
//! │      └──► PreOrder                  deferred intent, own lifecycle      │
//! │                                                                         │
//! │  Payment            one non-refunded row per Order; refunds are        │
//! │                     linked negative-amount rows                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every entity has a UUID v4 `id` stored as a string. Monetary fields are
//! integer cents (`*_cents`), convertible to [`Money`] via helpers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::money::Money;

// =============================================================================
// Tax Rate
// =============================================================================

/// Tax rate represented in basis points (bps).
///
/// 1 basis point = 0.01%, so 600 bps = 6%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxRate(u32);

impl TaxRate {
    /// Creates a tax rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        TaxRate(bps)
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a percentage (for display only).
    #[inline]
    pub fn percentage(&self) -> f64 {
        self.0 as f64 / 100.0
    }

    /// Zero tax rate.
    #[inline]
    pub const fn zero() -> Self {
        TaxRate(0)
    }
}

impl Default for TaxRate {
    fn default() -> Self {
        TaxRate::zero()
    }
}

// =============================================================================
// Book
// =============================================================================

/// A catalog book record.
///
/// Supplied by the catalog collaborator; this core reads price, title and
/// stock. Only the inventory ledger mutates `stock`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Book {
    /// Unique identifier (UUID v4).
    pub id: String,

    /// Display title, snapshotted into order lines at checkout.
    pub title: String,

    /// Author name.
    pub author: String,

    /// Current list price in cents.
    pub price_cents: i64,

    /// Units on hand. Never negative.
    pub stock: i64,

    /// Whether the book is purchasable (soft delete).
    pub is_active: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Book {
    /// Returns the list price as a Money type.
    #[inline]
    pub fn price(&self) -> Money {
        Money::from_cents(self.price_cents)
    }

    /// Checks whether `quantity` units can be reserved right now.
    #[inline]
    pub fn has_stock(&self, quantity: i64) -> bool {
        self.stock >= quantity
    }

    /// A book with zero stock is the only thing a pre-order may be
    /// created for.
    #[inline]
    pub fn is_out_of_stock(&self) -> bool {
        self.stock == 0
    }
}

// =============================================================================
// Cart Line
// =============================================================================

/// One (customer, book, quantity) entry in a shopping cart.
///
/// `saved` lines sit in the save-for-later list and never check out.
/// `is_pre_order` lines reference a [`PreOrder`] row via `pre_order_id`;
/// the pre-order record is the single source of truth for deferred state,
/// the cart line only points at it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct CartLine {
    pub id: String,
    pub customer_id: String,
    pub book_id: String,
    /// Always >= 1. Quantity zero is expressed by removing the line.
    pub quantity: i64,
    pub saved: bool,
    pub is_pre_order: bool,
    pub pre_order_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CartLine {
    /// An active line participates in checkout: not saved, not deferred.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.saved && !self.is_pre_order
    }
}

// =============================================================================
// Order
// =============================================================================

/// The status of an order. Transitions move forward only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Cancelled,
}

impl OrderStatus {
    /// Stable lowercase name, matching the database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Forward-only transition check.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Confirmed)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Confirmed, OrderStatus::Cancelled)
        )
    }
}

impl Default for OrderStatus {
    fn default() -> Self {
        OrderStatus::Pending
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable order created by exactly one successful checkout.
///
/// The invariant `total_cents == subtotal - discount + tax + shipping`
/// is established by the checkout coordinator and never recomputed from
/// the catalog afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Order {
    pub id: String,
    pub customer_id: String,
    pub subtotal_cents: i64,
    pub shipping_cents: i64,
    pub tax_cents: i64,
    pub discount_cents: i64,
    pub total_cents: i64,
    pub status: OrderStatus,
    pub shipping_address: String,
    pub billing_address: String,
    pub contact_email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Returns the order total as Money.
    #[inline]
    pub fn total(&self) -> Money {
        Money::from_cents(self.total_cents)
    }
}

/// A line item belonging to an order.
///
/// `unit_price_cents` and `title_snapshot` are frozen at checkout time
/// (price-at-purchase); later catalog edits do not touch them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct OrderLine {
    pub id: String,
    pub order_id: String,
    pub book_id: String,
    pub title_snapshot: String,
    pub quantity: i64,
    pub unit_price_cents: i64,
    /// quantity * unit_price_cents
    pub subtotal_cents: i64,
}

impl OrderLine {
    #[inline]
    pub fn unit_price(&self) -> Money {
        Money::from_cents(self.unit_price_cents)
    }

    #[inline]
    pub fn subtotal(&self) -> Money {
        Money::from_cents(self.subtotal_cents)
    }
}

// =============================================================================
// Pre-Order
// =============================================================================

/// Lifecycle of a pre-order.
///
/// ```text
/// pending ──► confirmed ──► available ──► shipped ──► delivered
///    │            │             │            │
///    └────────────┴─────────────┴────────────┴──► cancelled
/// ```
///
/// `delivered` and `cancelled` are terminal. `available` is also the
/// state from which `fulfill_to_order` may consume the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PreOrderStatus {
    Pending,
    Confirmed,
    Available,
    Shipped,
    Delivered,
    Cancelled,
}

impl PreOrderStatus {
    /// Stable lowercase name, matching the database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PreOrderStatus::Pending => "pending",
            PreOrderStatus::Confirmed => "confirmed",
            PreOrderStatus::Available => "available",
            PreOrderStatus::Shipped => "shipped",
            PreOrderStatus::Delivered => "delivered",
            PreOrderStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, PreOrderStatus::Delivered | PreOrderStatus::Cancelled)
    }

    /// Checks whether `next` is a legal transition from this state.
    ///
    /// Cancellation is legal from every non-terminal state; everything
    /// else moves one step forward.
    pub fn can_transition_to(&self, next: PreOrderStatus) -> bool {
        if next == PreOrderStatus::Cancelled {
            return !self.is_terminal();
        }
        matches!(
            (self, next),
            (PreOrderStatus::Pending, PreOrderStatus::Confirmed)
                | (PreOrderStatus::Confirmed, PreOrderStatus::Available)
                | (PreOrderStatus::Available, PreOrderStatus::Shipped)
                | (PreOrderStatus::Shipped, PreOrderStatus::Delivered)
        )
    }
}

impl Default for PreOrderStatus {
    fn default() -> Self {
        PreOrderStatus::Pending
    }
}

impl std::fmt::Display for PreOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A deferred purchase intent for a book that was out of stock.
///
/// Never competes for live stock; fulfillment re-checks availability at
/// the moment of the explicit `fulfill_to_order` action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct PreOrder {
    pub id: String,
    pub customer_id: String,
    pub book_id: String,
    pub quantity: i64,
    /// Price in cents at the time the pre-order was placed (frozen).
    pub unit_price_cents: i64,
    /// quantity * unit_price_cents
    pub total_cents: i64,
    pub status: PreOrderStatus,
    /// Set when the pre-order is confirmed.
    pub expected_delivery: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// Payment
// =============================================================================

/// The status of a payment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Completed,
    Refunded,
}

impl PaymentStatus {
    /// Stable lowercase name, matching the database representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment record associated with an order.
///
/// Exactly one non-refunded row is authoritative per order. Refunds are
/// separate rows with a negative `amount_cents` and `refund_of` pointing
/// at the original; the original row is never destructively rewritten.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct Payment {
    pub id: String,
    pub order_id: String,
    pub customer_id: String,
    /// Payment method label supplied by the caller ("card", "paypal", ...).
    pub method: String,
    pub status: PaymentStatus,
    pub amount_cents: i64,
    /// Globally unique across all payment rows, refunds included.
    pub transaction_id: String,
    /// For refund rows: id of the payment being refunded.
    pub refund_of: Option<String>,
    /// Audit note (partial-refund reasons and similar).
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    /// Returns the payment amount as Money.
    #[inline]
    pub fn amount(&self) -> Money {
        Money::from_cents(self.amount_cents)
    }

    /// Refund rows carry negative amounts and a back-reference.
    #[inline]
    pub fn is_refund(&self) -> bool {
        self.refund_of.is_some()
    }
}

// =============================================================================
// Stock Shortage
// =============================================================================

/// One book that could not be reserved, with the quantities involved.
/// Carried by `CoreError::InsufficientStock` so the caller can tell the
/// shopper exactly which titles are short.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockShortage {
    pub book_id: String,
    pub title: String,
    pub available: i64,
    pub requested: i64,
}

impl std::fmt::Display for StockShortage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (requested {}, available {})",
            self.title, self.requested, self.available
        )
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tax_rate_from_bps() {
        let rate = TaxRate::from_bps(600);
        assert_eq!(rate.bps(), 600);
        assert!((rate.percentage() - 6.0).abs() < 0.001);
    }

    #[test]
    fn test_order_status_forward_only() {
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Confirmed));
        assert!(OrderStatus::Pending.can_transition_to(OrderStatus::Cancelled));
        assert!(OrderStatus::Confirmed.can_transition_to(OrderStatus::Cancelled));

        assert!(!OrderStatus::Confirmed.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Pending));
        assert!(!OrderStatus::Cancelled.can_transition_to(OrderStatus::Confirmed));
    }

    #[test]
    fn test_pre_order_forward_chain() {
        use PreOrderStatus::*;

        assert!(Pending.can_transition_to(Confirmed));
        assert!(Confirmed.can_transition_to(Available));
        assert!(Available.can_transition_to(Shipped));
        assert!(Shipped.can_transition_to(Delivered));

        // No skipping ahead
        assert!(!Pending.can_transition_to(Available));
        assert!(!Confirmed.can_transition_to(Shipped));
        // No moving backward
        assert!(!Available.can_transition_to(Confirmed));
    }

    #[test]
    fn test_pre_order_cancel_from_any_non_terminal() {
        use PreOrderStatus::*;

        for status in [Pending, Confirmed, Available, Shipped] {
            assert!(status.can_transition_to(Cancelled), "{status} should cancel");
        }
        assert!(!Delivered.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Cancelled));
    }

    #[test]
    fn test_cart_line_active() {
        let line = CartLine {
            id: "l1".into(),
            customer_id: "c1".into(),
            book_id: "b1".into(),
            quantity: 1,
            saved: false,
            is_pre_order: false,
            pre_order_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        assert!(line.is_active());

        let saved = CartLine { saved: true, ..line.clone() };
        assert!(!saved.is_active());

        let deferred = CartLine { is_pre_order: true, ..line };
        assert!(!deferred.is_active());
    }

    #[test]
    fn test_shortage_display() {
        let shortage = StockShortage {
            book_id: "b1".into(),
            title: "The Trial".into(),
            available: 0,
            requested: 1,
        };
        assert_eq!(shortage.to_string(), "The Trial (requested 1, available 0)");
    }
}
