//! # Checkout Totals
//!
//! Pure computation of the amounts an order is created with.
//!
//! ## Formula
//! ```text
//! subtotal = Σ line.quantity × line.unit_price        (snapshotted)
//! discount = promo share of subtotal, clamped to subtotal + shipping
//! taxable  = max(subtotal − discount, 0)
//! tax      = taxable × rate                            (never negative)
//! total    = max(subtotal + shipping + tax − discount, 0)
//! ```
//!
//! Promo *authoring* is out of scope; only application of a fixed set of
//! active codes happens here. Shipping fees are a flat per-option table.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::TaxRate;

// =============================================================================
// Shipping Options
// =============================================================================

/// Shipping options offered at checkout, each with a flat fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShippingOption {
    Standard,
    Express,
    Pickup,
}

impl ShippingOption {
    /// Flat fee for this option.
    pub const fn fee(&self) -> Money {
        match self {
            ShippingOption::Standard => Money::from_cents(500),
            ShippingOption::Express => Money::from_cents(1500),
            ShippingOption::Pickup => Money::zero(),
        }
    }

    /// Parses a wire-format option name. Unknown names are a validation
    /// error, not a silent fallback.
    pub fn parse(value: &str) -> Result<Self, ValidationError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(ShippingOption::Standard),
            "express" => Ok(ShippingOption::Express),
            "pickup" => Ok(ShippingOption::Pickup),
            other => Err(ValidationError::NotAllowed {
                field: "shipping_option".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

impl Default for ShippingOption {
    fn default() -> Self {
        ShippingOption::Standard
    }
}

// =============================================================================
// Promo Codes
// =============================================================================

/// Currently active promo codes and their percentage discount in basis
/// points. Authoring new rules happens outside this core.
const ACTIVE_PROMOS: &[(&str, u32)] = &[
    ("SAVE10", 1000), // 10% off the item subtotal
    ("WELCOME5", 500),
];

/// Resolves a promo code to its discount in basis points.
///
/// Matching is case-insensitive. An unknown code is rejected rather than
/// silently applying no discount.
pub fn promo_discount_bps(code: &str) -> Result<u32, ValidationError> {
    let code = code.trim();
    if code.is_empty() {
        return Err(ValidationError::Required {
            field: "promo_code".to_string(),
        });
    }

    ACTIVE_PROMOS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(code))
        .map(|(_, bps)| *bps)
        .ok_or_else(|| ValidationError::NotAllowed {
            field: "promo_code".to_string(),
            value: code.to_string(),
        })
}

// =============================================================================
// Checkout Totals
// =============================================================================

/// The computed amounts of a checkout, all in cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutTotals {
    pub subtotal: Money,
    pub shipping: Money,
    pub discount: Money,
    pub tax: Money,
    pub total: Money,
}

impl CheckoutTotals {
    /// Computes order totals from a snapshotted item subtotal.
    ///
    /// Clamping rules:
    /// - the discount never exceeds subtotal + shipping
    /// - tax applies to the discounted item base and is never negative
    /// - the grand total is never negative
    pub fn compute(
        subtotal: Money,
        shipping: Money,
        discount_bps: u32,
        tax_rate: TaxRate,
    ) -> Self {
        let discount = subtotal.percentage(discount_bps).min(subtotal + shipping);
        let taxable = (subtotal - discount).max(Money::zero());
        let tax = taxable.calculate_tax(tax_rate);
        let total = (subtotal + shipping + tax - discount).max(Money::zero());

        CheckoutTotals {
            subtotal,
            shipping,
            discount,
            tax,
            total,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shipping_fees() {
        assert_eq!(ShippingOption::Standard.fee().cents(), 500);
        assert_eq!(ShippingOption::Express.fee().cents(), 1500);
        assert_eq!(ShippingOption::Pickup.fee().cents(), 0);
    }

    #[test]
    fn test_shipping_parse() {
        assert_eq!(
            ShippingOption::parse("standard").unwrap(),
            ShippingOption::Standard
        );
        assert_eq!(
            ShippingOption::parse(" Express ").unwrap(),
            ShippingOption::Express
        );
        assert!(ShippingOption::parse("drone").is_err());
    }

    #[test]
    fn test_promo_lookup() {
        assert_eq!(promo_discount_bps("SAVE10").unwrap(), 1000);
        assert_eq!(promo_discount_bps("save10").unwrap(), 1000);
        assert_eq!(promo_discount_bps("WELCOME5").unwrap(), 500);
        assert!(promo_discount_bps("EXPIRED99").is_err());
        assert!(promo_discount_bps("").is_err());
    }

    /// 2 × $20.00, standard shipping, SAVE10, 6% tax:
    /// subtotal 40.00, discount 4.00, taxable 36.00, tax 2.16,
    /// shipping 5.00, total 43.16.
    #[test]
    fn test_worked_example() {
        let totals = CheckoutTotals::compute(
            Money::from_cents(4000),
            ShippingOption::Standard.fee(),
            1000,
            TaxRate::from_bps(600),
        );

        assert_eq!(totals.subtotal.cents(), 4000);
        assert_eq!(totals.discount.cents(), 400);
        assert_eq!(totals.tax.cents(), 216);
        assert_eq!(totals.shipping.cents(), 500);
        assert_eq!(totals.total.cents(), 4316);
    }

    #[test]
    fn test_no_promo_no_discount() {
        let totals = CheckoutTotals::compute(
            Money::from_cents(4000),
            ShippingOption::Pickup.fee(),
            0,
            TaxRate::from_bps(600),
        );
        assert_eq!(totals.discount.cents(), 0);
        assert_eq!(totals.tax.cents(), 240);
        assert_eq!(totals.total.cents(), 4240);
    }

    #[test]
    fn test_discount_clamped_to_subtotal_plus_shipping() {
        // A 200% "discount" can never push past subtotal + shipping.
        let totals = CheckoutTotals::compute(
            Money::from_cents(1000),
            Money::from_cents(500),
            20_000,
            TaxRate::from_bps(600),
        );
        assert_eq!(totals.discount.cents(), 1500);
        assert_eq!(totals.tax.cents(), 0);
        assert_eq!(totals.total.cents(), 0);
    }

    #[test]
    fn test_total_never_negative() {
        let totals = CheckoutTotals::compute(
            Money::zero(),
            Money::zero(),
            1000,
            TaxRate::from_bps(600),
        );
        assert_eq!(totals.total.cents(), 0);
        assert_eq!(totals.tax.cents(), 0);
    }

    /// Totals must balance: total == subtotal + shipping + tax - discount.
    #[test]
    fn test_totals_balance() {
        for subtotal in [0i64, 999, 4000, 123_456] {
            let t = CheckoutTotals::compute(
                Money::from_cents(subtotal),
                ShippingOption::Standard.fee(),
                1000,
                TaxRate::from_bps(600),
            );
            assert_eq!(
                t.total.cents(),
                t.subtotal.cents() + t.shipping.cents() + t.tax.cents() - t.discount.cents()
            );
        }
    }
}
