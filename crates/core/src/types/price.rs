//! Type-safe price representation using decimal arithmetic.
//!
//! Prices are stored as `NUMERIC(10, 2)`, so a valid [`Price`] is
//! non-negative, has at most two fractional digits and at most eight
//! integral digits. The store is single-currency.

use core::fmt;
use core::iter::Sum;
use core::ops::Add;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Price`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum PriceError {
    /// The amount is below zero.
    #[error("price cannot be negative")]
    Negative,
    /// The amount has more than two fractional digits.
    #[error("price must have at most {max} decimal places")]
    TooPrecise {
        /// Maximum allowed fractional digits.
        max: u32,
    },
    /// The amount does not fit in `NUMERIC(10, 2)`.
    #[error("price must be below {max}")]
    TooLarge {
        /// Exclusive upper bound.
        max: Decimal,
    },
}

/// A unit or line price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type), sqlx(transparent))]
#[serde(transparent)]
pub struct Price(Decimal);

impl Price {
    /// Maximum number of fractional digits.
    pub const SCALE: u32 = 2;

    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Exclusive upper bound (10^8) imposed by `NUMERIC(10, 2)`.
    const LIMIT: Decimal = Decimal::from_parts(100_000_000, 0, 0, false, 0);

    /// Validate and wrap a decimal amount.
    ///
    /// # Errors
    ///
    /// Returns an error if the amount is negative, has more than two
    /// fractional digits, or is 10^8 or larger.
    pub fn new(amount: Decimal) -> Result<Self, PriceError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(PriceError::Negative);
        }
        if amount.normalize().scale() > Self::SCALE {
            return Err(PriceError::TooPrecise { max: Self::SCALE });
        }
        if amount >= Self::LIMIT {
            return Err(PriceError::TooLarge { max: Self::LIMIT });
        }
        Ok(Self(amount))
    }

    /// Build a price from an amount in cents.
    ///
    /// # Errors
    ///
    /// Returns an error if `cents` is negative or out of range.
    pub fn from_cents(cents: i64) -> Result<Self, PriceError> {
        Self::new(Decimal::new(cents, Self::SCALE))
    }

    /// The underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Price of `quantity` units at this unit price.
    ///
    /// Line totals are not bounded by the column limit; only unit prices
    /// and order totals are persisted.
    #[must_use]
    pub fn line_total(&self, quantity: i32) -> Self {
        Self(self.0 * Decimal::from(quantity))
    }

    /// Like [`Price::line_total`], but the result must itself be a valid price.
    ///
    /// # Errors
    ///
    /// Returns `TooLarge` if the line does not fit in `NUMERIC(10, 2)` and
    /// `Negative` for a negative quantity.
    pub fn checked_line_total(self, quantity: i32) -> Result<Self, PriceError> {
        let amount = self
            .0
            .checked_mul(Decimal::from(quantity))
            .ok_or(PriceError::TooLarge { max: Self::LIMIT })?;
        Self::new(amount)
    }

    /// Add two prices, keeping the sum within `NUMERIC(10, 2)`.
    ///
    /// # Errors
    ///
    /// Returns `TooLarge` if the sum is 10^8 or more.
    pub fn checked_add(self, other: Self) -> Result<Self, PriceError> {
        let amount = self
            .0
            .checked_add(other.0)
            .ok_or(PriceError::TooLarge { max: Self::LIMIT })?;
        Self::new(amount)
    }
}

impl Default for Price {
    fn default() -> Self {
        Self::ZERO
    }
}

impl Add for Price {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self(self.0 + rhs.0)
    }
}

impl Sum for Price {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Add::add)
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Price {
    type Error = PriceError;

    fn try_from(amount: Decimal) -> Result<Self, Self::Error> {
        Self::new(amount)
    }
}

impl From<Price> for Decimal {
    fn from(price: Price) -> Self {
        price.0
    }
}
