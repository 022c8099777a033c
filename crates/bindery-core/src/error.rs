//! # Error Types
//!
//! Domain-specific error types for bindery-core.
//!
//! ## Design Principles
//! 1. Use `thiserror` for derive macros (not manual impl)
//! 2. Include context in error messages (titles, ids, amounts)
//! 3. Errors are enum variants, never bare strings
//! 4. Each variant maps to a user-facing message at the API boundary

use thiserror::Error;

use crate::types::StockShortage;

// =============================================================================
// Core Error
// =============================================================================

/// Core business rule violations.
///
/// These are caught at the service boundary and translated into the
/// uniform `{success: false, error}` envelope; none of them crash a
/// request.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Book id does not exist in the catalog, or the book is inactive.
    #[error("Book not found: {0}")]
    BookNotFound(String),

    /// One or more lines could not be reserved.
    ///
    /// Carries every short title so the shopper can reduce quantities or
    /// pre-order. Raised only from inside a transaction that is about to
    /// roll back: no partial decrement survives it.
    #[error("Insufficient stock: {}", format_shortages(.shortages))]
    InsufficientStock { shortages: Vec<StockShortage> },

    /// Checkout was requested with no active cart lines.
    #[error("Cart is empty")]
    EmptyCart,

    /// A concurrent checkout committed the same idempotency key first.
    /// Safe to retry: the retry resolves to the already-created order.
    #[error("A checkout with this idempotency key is already in progress")]
    DuplicateCheckout,

    /// Entity is not in a state that allows the requested operation.
    #[error("{entity} {id} is {status}, cannot {action}")]
    InvalidTransition {
        entity: &'static str,
        id: String,
        status: String,
        action: &'static str,
    },

    /// Payment creation or refund violated an amount rule.
    #[error("Payment rejected: {reason}")]
    PaymentRejected { reason: String },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl CoreError {
    /// Creates an InvalidTransition error.
    pub fn invalid_transition(
        entity: &'static str,
        id: impl Into<String>,
        status: impl Into<String>,
        action: &'static str,
    ) -> Self {
        CoreError::InvalidTransition {
            entity,
            id: id.into(),
            status: status.into(),
            action,
        }
    }

    /// Creates a PaymentRejected error.
    pub fn payment_rejected(reason: impl Into<String>) -> Self {
        CoreError::PaymentRejected {
            reason: reason.into(),
        }
    }
}

fn format_shortages(shortages: &[StockShortage]) -> String {
    shortages
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// Raised before any business logic runs, so a request that fails
/// validation has touched nothing.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too short.
    #[error("{field} must be at least {min} characters")]
    TooShort { field: String, min: usize },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Invalid format (invalid UUID, malformed email).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value is not in the allowed set (unknown promo code or shipping
    /// option).
    #[error("{field} '{value}' is not recognized")]
    NotAllowed { field: String, value: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================
