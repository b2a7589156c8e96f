use crate::error::{MarketError, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A monetary value with exactly two fractional digits.
///
/// Every constructor rounds (midpoint away from zero) and rescales, so two
/// `Money` values that compare equal also print identically. Arithmetic never
/// goes through binary floats and is checked: a sum or product whose
/// magnitude no longer fits two fractional digits yields `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Number of fractional digits kept on every value.
    pub const SCALE: u32 = 2;
    pub const ZERO: Self = Self(Decimal::from_parts(0, 0, 0, false, Self::SCALE));

    pub fn new(value: Decimal) -> Self {
        let mut rounded = value.round_dp_with_strategy(Self::SCALE, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(Self::SCALE);
        Self(rounded)
    }

    /// Like [`Money::new`], but `None` when `value` is too large to keep two
    /// fractional digits.
    pub fn checked_new(value: Decimal) -> Option<Self> {
        let money = Self::new(value);
        (money.0.scale() == Self::SCALE).then_some(money)
    }

    /// Builds a strictly positive amount, as required by every ledger primitive.
    pub fn positive(value: Decimal) -> Result<Self> {
        let money = Self::checked_new(value).ok_or_else(|| {
            MarketError::Validation(format!("amount {value} is out of range"))
        })?;
        if money.0 > Decimal::ZERO {
            Ok(money)
        } else {
            Err(MarketError::Validation(format!(
                "amount must be positive, got {value}"
            )))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn checked_add(self, rhs: Self) -> Option<Self> {
        self.0.checked_add(rhs.0).and_then(Self::checked_new)
    }

    /// `None` when the result would be negative.
    pub fn checked_sub(self, rhs: Self) -> Option<Self> {
        if self.0 >= rhs.0 {
            Some(Self::new(self.0 - rhs.0))
        } else {
            None
        }
    }

    /// Multiplies by a rate and rounds back to two digits.
    pub fn apply_rate(self, rate: Decimal) -> Option<Self> {
        self.0.checked_mul(rate).and_then(Self::checked_new)
    }

    pub fn clamp_between(self, min: Money, max: Option<Money>) -> Self {
        let floored = self.max(min);
        match max {
            Some(max) if floored > max => max,
            _ => floored,
        }
    }
}

impl Default for Money {
    fn default() -> Self {
        Self::ZERO
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
