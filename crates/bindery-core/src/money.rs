//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! All monetary values in bindery are integer cents. The database,
//! calculations, and API all use cents; only a UI converts to a display
//! currency. Tax and discount calculations widen to i128 internally so
//! they cannot overflow on large amounts.
//!
//! ## Usage
//! ```rust
//! use bindery_core::money::Money;
//!
//! let price = Money::from_cents(1099); // $10.99
//! let doubled = price * 2;             // $21.98
//! let total = price + Money::from_cents(500); // $15.99
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};

use crate::types::TaxRate;

/// A monetary value in the smallest currency unit (cents for USD).
///
/// Signed so refunds and discounts can be represented as negative
/// amounts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    ///
    /// ## Example
    /// ```rust
    /// use bindery_core::money::Money;
    ///
    /// let price = Money::from_cents(1099); // $10.99
    /// assert_eq!(price.cents(), 1099);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is greater than zero.
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is less than zero.
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Returns the negated value. Used for refund rows.
    #[inline]
    pub const fn negate(&self) -> Self {
        Money(-self.0)
    }

    /// Multiplies money by a quantity.
    ///
    /// ## Example
    /// ```rust
    /// use bindery_core::money::Money;
    ///
    /// let unit_price = Money::from_cents(2000); // $20.00
    /// assert_eq!(unit_price.multiply_quantity(2).cents(), 4000);
    /// ```
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0 * qty)
    }

    /// Calculates tax on this amount.
    ///
    /// Integer math with half-up rounding:
    /// `(amount_cents * bps + 5000) / 10000`.
    ///
    /// ## Example
    /// ```rust
    /// use bindery_core::money::Money;
    /// use bindery_core::types::TaxRate;
    ///
    /// let taxable = Money::from_cents(3600); // $36.00
    /// let tax = taxable.calculate_tax(TaxRate::from_bps(600)); // 6%
    /// assert_eq!(tax.cents(), 216); // $2.16
    /// ```
    pub fn calculate_tax(&self, rate: TaxRate) -> Money {
        // i128 to prevent overflow on large amounts
        let tax_cents = (self.0 as i128 * rate.bps() as i128 + 5000) / 10000;
        Money::from_cents(tax_cents as i64)
    }

    /// Returns the given basis-point share of this amount, rounded
    /// half-up. Used for percentage promo discounts.
    ///
    /// ## Example
    /// ```rust
    /// use bindery_core::money::Money;
    ///
    /// let subtotal = Money::from_cents(4000); // $40.00
    /// assert_eq!(subtotal.percentage(1000).cents(), 400); // 10% = $4.00
    /// ```
    pub fn percentage(&self, bps: u32) -> Money {
        let share = (self.0 as i128 * bps as i128 + 5000) / 10000;
        Money::from_cents(share as i64)
    }
}

/// Display implementation shows money in a human-readable format.
/// For logs and error messages, not UI formatting.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}${}.{:02}", sign, (self.0 / 100).abs(), (self.0 % 100).abs())
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 -= other.0;
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_cents() {
        let money = Money::from_cents(1099);
        assert_eq!(money.cents(), 1099);
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", Money::from_cents(1099)), "$10.99");
        assert_eq!(format!("{}", Money::from_cents(500)), "$5.00");
        assert_eq!(format!("{}", Money::from_cents(-550)), "-$5.50");
        assert_eq!(format!("{}", Money::from_cents(0)), "$0.00");
    }

    #[test]
    fn test_arithmetic() {
        let a = Money::from_cents(1000);
        let b = Money::from_cents(500);

        assert_eq!((a + b).cents(), 1500);
        assert_eq!((a - b).cents(), 500);
        assert_eq!((a * 3).cents(), 3000);
        assert_eq!(a.multiply_quantity(2).cents(), 2000);
    }

    #[test]
    fn test_negate() {
        assert_eq!(Money::from_cents(1000).negate().cents(), -1000);
        assert_eq!(Money::from_cents(-250).negate().cents(), 250);
    }

    #[test]
    fn test_tax_calculation() {
        // $36.00 at 6% = $2.16 exactly
        let taxable = Money::from_cents(3600);
        assert_eq!(taxable.calculate_tax(TaxRate::from_bps(600)).cents(), 216);

        // $10.00 at 8.25% = $0.825, rounds half-up to $0.83
        let amount = Money::from_cents(1000);
        assert_eq!(amount.calculate_tax(TaxRate::from_bps(825)).cents(), 83);
    }

    #[test]
    fn test_tax_on_zero_rate() {
        let amount = Money::from_cents(1000);
        assert_eq!(amount.calculate_tax(TaxRate::zero()).cents(), 0);
    }

    #[test]
    fn test_percentage() {
        let subtotal = Money::from_cents(4000);
        assert_eq!(subtotal.percentage(1000).cents(), 400);
        // Rounding: 10% of $0.05 = 0.5 cents, rounds to 1 cent
        assert_eq!(Money::from_cents(5).percentage(1000).cents(), 1);
    }

    #[test]
    fn test_zero_and_checks() {
        let zero = Money::zero();
        assert!(zero.is_zero());
        assert!(!zero.is_positive());
        assert!(!zero.is_negative());

        assert!(Money::from_cents(100).is_positive());
        assert!(Money::from_cents(-100).is_negative());
    }
}
