//! # Money Module
//!
//! Provides the `Money` type for every amount the ledger stores: negotiated
//! prices, approved source amounts, installments and derived balances.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  RECONCILING SOURCES AGAINST A SALE PRICE                               │
//! │                                                                         │
//! │  Sale price:           100,000,000.00                                   │
//! │  Down payment:          30,000,000.10                                   │
//! │  Mortgage:              69,999,999.90                                   │
//! │                                                                         │
//! │  With f64 the sum can land on 99,999,999.99999999 and the              │
//! │  "sources equal price" gate flips on rounding noise.                    │
//! │                                                                         │
//! │  OUR SOLUTION: Integer minor units                                      │
//! │    3_000_000_010 + 6_999_999_990 == 10_000_000_000  (exact)             │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use ledger_core::money::Money;
//!
//! let approved = Money::from_units(60_000_000);
//! let received = Money::from_cents(1_500_000_000);
//! assert_eq!((approved - received).units(), 45_000_000);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};
use ts_rs::TS;

use crate::types::Percentage;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit ("cents").
///
/// ## Design Decisions
/// - **i64 (signed)**: adjustments can be negative
/// - **Single field tuple struct**: zero-cost wrapper over the stored integer
/// - **No float constructor**: amounts arrive as integers from the caller
///
/// ## Where Money Flows
/// ```text
/// ┌─────────────────────────────────────────────────────────────────────────┐
/// │  Negotiation.total ──► Σ PaymentSource.approved  (must reconcile)      │
/// │                                                                         │
/// │  Installment.amount ──► PaymentSource.received ──► outstanding balance  │
/// │          │                                                              │
/// │          └──► Σ per negotiation ──► total paid / balance due / percent │
/// └─────────────────────────────────────────────────────────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from cents (the smallest currency unit).
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from whole currency units.
    ///
    /// ## Example
    /// ```rust
    /// use ledger_core::money::Money;
    ///
    /// let price = Money::from_units(100_000_000);
    /// assert_eq!(price.cents(), 10_000_000_000);
    /// ```
    #[inline]
    pub const fn from_units(units: i64) -> Self {
        Money(units * 100)
    }

    /// Returns the value in cents.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-unit portion (truncated toward zero).
    #[inline]
    pub const fn units(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the minor-unit portion (always 0-99).
    #[inline]
    pub const fn cents_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    #[inline]
    pub const fn abs(&self) -> Self {
        Money(self.0.abs())
    }

    /// Clamps negative values to zero.
    ///
    /// Balance due is floored this way so an over-collected negotiation
    /// never reports a negative balance.
    #[inline]
    pub const fn floor_zero(&self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            *self
        }
    }

    /// Addition that reports overflow instead of wrapping.
    #[inline]
    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    /// True when `self` and `other` differ by at most `epsilon`.
    ///
    /// ## Example
    /// ```rust
    /// use ledger_core::money::Money;
    ///
    /// let a = Money::from_cents(10_000);
    /// assert!(a.within(Money::from_cents(10_001), Money::from_cents(1)));
    /// assert!(!a.within(Money::from_cents(10_002), Money::from_cents(1)));
    /// ```
    #[inline]
    pub fn within(&self, other: Money, epsilon: Money) -> bool {
        (self.0 as i128 - other.0 as i128).abs() <= epsilon.0 as i128
    }

    /// What share of `total` this amount represents, in basis points.
    ///
    /// Rounds half up, caps at 100%, and returns 0% when `total` is not
    /// positive (nothing to pay means nothing paid).
    ///
    /// ## Example
    /// ```rust
    /// use ledger_core::money::Money;
    ///
    /// let paid = Money::from_units(60_000_000);
    /// let total = Money::from_units(100_000_000);
    /// assert_eq!(paid.percentage_of(total).bps(), 6000);
    /// ```
    pub fn percentage_of(&self, total: Money) -> Percentage {
        if total.0 <= 0 || self.0 <= 0 {
            return Percentage::zero();
        }
        // i128 keeps `cents * 10000` safe for any i64 amount
        let bps = (self.0 as i128 * 10_000 + total.0 as i128 / 2) / total.0 as i128;
        Percentage::from_bps(bps.min(10_000) as u32)
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Debug-oriented display with thousands separators (`$60,000,000.00`).
///
/// ## Note
/// Presentation code formats for its own locale; this is for logs and
/// error messages.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let digits = self.units().abs().to_string();
        let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
        for (i, ch) in digits.chars().enumerate() {
            if i > 0 && (digits.len() - i) % 3 == 0 {
                grouped.push(',');
            }
            grouped.push(ch);
        }
        write!(f, "{}${}.{:02}", sign, grouped, self.cents_part())
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

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + *m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
