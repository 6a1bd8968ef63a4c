//! # Money Module
//!
//! Provides the `Money` type for presented monetary values, and the single
//! rounding rule that turns full-precision amounts into it.
//!
//! ## Two Representations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌ WRONG!                           │
//! │                                                                         │
//! │  OUR SOLUTION                                                           │
//! │                                                                         │
//! │  Decimal (rust_decimal)        Money (i64 cents)                        │
//! │  ──────────────────────        ──────────────────                       │
//! │  quantity × unit price         document totals                          │
//! │  line / section totals   ───►  VAT breakdown                            │
//! │  full precision, exact         rounded ONCE, half away from zero        │
//! │                                                                         │
//! │  Rounding every line and then summing drifts. Summing exact values and │
//! │  rounding the result does not.                                          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use devis_core::money::Money;
//! use rust_decimal::Decimal;
//!
//! let exact = Decimal::new(12345, 3); // 12.345
//! let shown = Money::from_decimal(exact);
//! assert_eq!(shown.cents(), 1235);
//! assert_eq!(shown.to_string(), "12.35");
//! ```

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

/// Number of decimals shown at presentation boundaries.
pub const PRESENTATION_DECIMALS: u32 = 2;

/// Rounds a full-precision amount to two decimals, midpoint away from zero.
///
/// Positive values round half-up. Negative values (discounts) round to the
/// same magnitude as their positive counterpart: `-0.125 → -0.13`.
///
/// ## Example
/// ```rust
/// use devis_core::money::round_amount;
/// use rust_decimal::Decimal;
///
/// assert_eq!(round_amount(Decimal::new(1005, 3)), Decimal::new(101, 2));
/// assert_eq!(round_amount(Decimal::new(-1005, 3)), Decimal::new(-101, 2));
/// ```
pub fn round_amount(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(PRESENTATION_DECIMALS, RoundingStrategy::MidpointAwayFromZero)
}

// =============================================================================
// Money Type
// =============================================================================

/// A presented monetary value in the smallest currency unit (cents).
///
/// ## Design Decisions
/// - **i64 (signed)**: discounts are negative
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - Only created by rounding (`from_decimal`) or from cents; never from floats
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents.
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Rounds a full-precision amount into Money.
    ///
    /// Returns `None` when the rounded amount does not fit in i64 cents.
    pub fn checked_from_decimal(amount: Decimal) -> Option<Self> {
        round_amount(amount)
            .checked_mul(Decimal::ONE_HUNDRED)?
            .to_i64()
            .map(Money)
    }

    /// Rounds a full-precision amount into Money, saturating at the i64
    /// bounds.
    pub fn from_decimal(amount: Decimal) -> Self {
        Self::checked_from_decimal(amount).unwrap_or(if amount.is_sign_negative() {
            Money(i64::MIN)
        } else {
            Money(i64::MAX)
        })
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the value as an exact two-decimal `Decimal`.
    ///
    /// ## Example
    /// ```rust
    /// use devis_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// assert_eq!(Money::from_cents(-12050).to_decimal(), Decimal::new(-12050, 2));
    /// ```
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, PRESENTATION_DECIMALS)
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Returns the absolute value.
    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain `major.minor` rendering, without currency symbol.
///
/// ## Note
/// Locale-aware formatting (thousands separators, `€`) belongs to the
/// presentation layer.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
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

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
