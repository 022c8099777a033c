//! # Validation Module
//!
//! Input validation for the order-fulfillment surface. Runs before any
//! storage access; a request that fails here has touched nothing.
//!
//! ## Usage
//! ```rust
//! use bindery_core::validation::{validate_quantity, validate_address};
//!
//! validate_quantity(3).unwrap();
//! validate_address("22 Acacia Avenue, London").unwrap();
//! ```

use crate::error::ValidationError;
use crate::{MAX_ADDRESS_LEN, MAX_LINE_QUANTITY, MIN_ADDRESS_LEN};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// Numeric Validators
// =============================================================================

/// Validates a line quantity.
///
/// Quantity must be at least 1; a non-positive value is rejected, never
/// silently floored. The ceiling guards against typo-sized orders.
pub fn validate_quantity(qty: i64) -> ValidationResult<()> {
    if qty <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "quantity".to_string(),
        });
    }

    if qty > MAX_LINE_QUANTITY {
        return Err(ValidationError::OutOfRange {
            field: "quantity".to_string(),
            min: 1,
            max: MAX_LINE_QUANTITY,
        });
    }

    Ok(())
}

/// Validates a payment or refund amount in cents. Must be positive.
pub fn validate_amount_cents(cents: i64) -> ValidationResult<()> {
    if cents <= 0 {
        return Err(ValidationError::MustBePositive {
            field: "amount".to_string(),
        });
    }

    Ok(())
}

// =============================================================================
// String Validators
// =============================================================================

/// Validates a shipping or billing address.
///
/// ## Rules
/// - Must not be empty after trimming
/// - Must be at least `MIN_ADDRESS_LEN` characters
/// - Must be at most `MAX_ADDRESS_LEN` characters
///
/// ## Returns
/// The trimmed address string.
pub fn validate_address(address: &str) -> ValidationResult<String> {
    let address = address.trim();

    if address.is_empty() {
        return Err(ValidationError::Required {
            field: "address".to_string(),
        });
    }

    if address.len() < MIN_ADDRESS_LEN {
        return Err(ValidationError::TooShort {
            field: "address".to_string(),
            min: MIN_ADDRESS_LEN,
        });
    }

    if address.len() > MAX_ADDRESS_LEN {
        return Err(ValidationError::TooLong {
            field: "address".to_string(),
            max: MAX_ADDRESS_LEN,
        });
    }

    Ok(address.to_string())
}

/// Validates a payment method label.
///
/// The set of accepted processors lives with the payment collaborator;
/// this core only requires a non-empty, reasonably sized label.
pub fn validate_payment_method(method: &str) -> ValidationResult<String> {
    let method = method.trim();

    if method.is_empty() {
        return Err(ValidationError::Required {
            field: "payment_method".to_string(),
        });
    }

    if method.len() > 50 {
        return Err(ValidationError::TooLong {
            field: "payment_method".to_string(),
            max: 50,
        });
    }

    Ok(method.to_string())
}

/// Validates a contact email, when one is supplied.
pub fn validate_contact_email(email: &str) -> ValidationResult<String> {
    let email = email.trim();

    if email.is_empty() || !email.contains('@') || email.len() > 200 {
        return Err(ValidationError::InvalidFormat {
            field: "contact_email".to_string(),
            reason: "must be a valid email address".to_string(),
        });
    }

    Ok(email.to_string())
}

// =============================================================================
// UUID Validators
// =============================================================================

/// Validates a UUID string format.
pub fn validate_uuid(field: &'static str, id: &str) -> ValidationResult<()> {
    if id.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    uuid::Uuid::parse_str(id).map_err(|_| ValidationError::InvalidFormat {
        field: field.to_string(),
        reason: "must be a valid UUID".to_string(),
    })?;

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_quantity() {
        assert!(validate_quantity(1).is_ok());
        assert!(validate_quantity(999).is_ok());

        assert!(validate_quantity(0).is_err());
        assert!(validate_quantity(-3).is_err());
        assert!(validate_quantity(1000).is_err());
    }

    #[test]
    fn test_validate_amount_cents() {
        assert!(validate_amount_cents(1).is_ok());
        assert!(validate_amount_cents(0).is_err());
        assert!(validate_amount_cents(-500).is_err());
    }

    #[test]
    fn test_validate_address() {
        assert_eq!(
            validate_address("  22 Acacia Avenue, London  ").unwrap(),
            "22 Acacia Avenue, London"
        );
        assert!(validate_address("").is_err());
        assert!(validate_address("   ").is_err());
        assert!(validate_address("short").is_err());
        assert!(validate_address(&"A".repeat(600)).is_err());
    }

    #[test]
    fn test_validate_payment_method() {
        assert_eq!(validate_payment_method("card").unwrap(), "card");
        assert!(validate_payment_method("").is_err());
        assert!(validate_payment_method(&"x".repeat(60)).is_err());
    }

    #[test]
    fn test_validate_contact_email() {
        assert!(validate_contact_email("reader@example.com").is_ok());
        assert!(validate_contact_email("not-an-email").is_err());
        assert!(validate_contact_email("").is_err());
    }

    #[test]
    fn test_validate_uuid() {
        assert!(validate_uuid("book_id", "550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(validate_uuid("book_id", "").is_err());
        assert!(validate_uuid("book_id", "not-a-uuid").is_err());
    }
}
