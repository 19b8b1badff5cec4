//! # Money Module
//!
//! Provides the `Money` type for marketplace amounts.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Marketplaces send amounts as JSON numbers:  "buyerTotal": 499.9       │
//! │  Read as f64 and summed over thousands of orders, the totals drift.    │
//! │                                                                         │
//! │  OUR SOLUTION: parse the decimal TEXT straight into minor units        │
//! │    "499.9"  → 49990                                                    │
//! │    "500"    → 50000                                                    │
//! │    "12.345" → rejected (sub-minor precision)                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use bazaar_core::money::Money;
//!
//! let total = Money::parse_decimal("499.90").unwrap();
//! assert_eq!(total.minor_units(), 49990);
//! assert_eq!(total.to_string(), "499.90");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign};

use crate::error::{CoreError, CoreResult};

/// Minor units per major unit (kopecks per ruble, tiyin per sum, tiyn per tenge).
const MINOR_PER_MAJOR: i64 = 100;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in the smallest currency unit.
///
/// Currency is implied by the platform the record came from; the sync core
/// never converts between currencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from minor units.
    #[inline]
    pub const fn from_minor_units(minor: i64) -> Self {
        Money(minor)
    }

    /// Creates a Money value from whole major units.
    ///
    /// ## Example
    /// ```rust
    /// use bazaar_core::money::Money;
    ///
    /// assert_eq!(Money::from_major(500).minor_units(), 50000);
    /// ```
    #[inline]
    pub const fn from_major(major: i64) -> Self {
        Money(major * MINOR_PER_MAJOR)
    }

    /// Parses a decimal string such as `"500"`, `"499.9"` or `"-12.05"`.
    ///
    /// ## Rules
    /// - Optional leading `-`
    /// - At most two significant fractional digits; trailing zeros beyond
    ///   that are accepted (`"499.900"`)
    /// - Exponent notation is rejected
    pub fn parse_decimal(raw: &str) -> CoreResult<Self> {
        let text = raw.trim();
        let invalid = |reason: &str| CoreError::InvalidAmount {
            value: raw.to_string(),
            reason: reason.to_string(),
        };

        let (negative, digits) = match text.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, text),
        };

        let (int_part, frac_part) = match digits.split_once('.') {
            Some((i, f)) => (i, f),
            None => (digits, ""),
        };

        if int_part.is_empty() || !int_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }
        if !frac_part.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid("not a decimal number"));
        }

        let significant = frac_part.trim_end_matches('0');
        if significant.len() > 2 {
            return Err(invalid("more precision than minor units allow"));
        }

        let major: i64 = int_part.parse().map_err(|_| invalid("out of range"))?;
        let mut minor_text = significant.to_string();
        while minor_text.len() < 2 {
            minor_text.push('0');
        }
        let minor: i64 = minor_text.parse().map_err(|_| invalid("out of range"))?;

        let value = major
            .checked_mul(MINOR_PER_MAJOR)
            .and_then(|m| m.checked_add(minor))
            .ok_or_else(|| invalid("out of range"))?;

        Ok(Money(if negative { -value } else { value }))
    }

    /// Converts a JSON number without going through `f64`.
    pub fn from_json_number(number: &serde_json::Number) -> CoreResult<Self> {
        Self::parse_decimal(&number.to_string())
    }

    /// Returns the value in minor units.
    #[inline]
    pub const fn minor_units(&self) -> i64 {
        self.0
    }

    /// Returns the whole major-unit portion.
    #[inline]
    pub const fn major_part(&self) -> i64 {
        self.0 / MINOR_PER_MAJOR
    }

    /// Returns the minor-unit portion (always 0-99).
    #[inline]
    pub const fn minor_part(&self) -> i64 {
        (self.0 % MINOR_PER_MAJOR).abs()
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
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Plain decimal rendering, used in notification texts.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}{}.{:02}", sign, self.major_part().abs(), self.minor_part())
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

/// Summing line items into an order total.
impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
