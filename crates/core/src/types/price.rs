//! Type-safe money representation using decimal arithmetic.
//!
//! Amounts keep full precision while they are being accumulated. Rounding to
//! the currency's two minor digits happens only when a value is displayed or
//! persisted, via [`Price::rounded`].

use core::fmt;

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Number of minor-unit digits used for every supported currency.
pub const CURRENCY_SCALE: u32 = 2;

/// A monetary amount with currency information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    /// Amount in the currency's standard unit (e.g., dollars, not cents).
    pub amount: Decimal,
    /// ISO 4217 currency code.
    pub currency_code: CurrencyCode,
}

impl Price {
    /// Create a new price.
    #[must_use]
    pub const fn new(amount: Decimal, currency_code: CurrencyCode) -> Self {
        Self {
            amount,
            currency_code,
        }
    }

    /// Create a price from an integer number of minor units (cents).
    #[must_use]
    pub fn from_cents(cents: i64, currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::new(cents, CURRENCY_SCALE), currency_code)
    }

    /// A zero amount in the given currency.
    #[must_use]
    pub const fn zero(currency_code: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency_code)
    }

    /// Round half-up (away from zero) to two decimal places.
    #[must_use]
    pub fn rounded(&self) -> Self {
        Self::new(round_currency(self.amount), self.currency_code)
    }

    /// Whether the amount is exactly zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rounded = round_currency(self.amount);
        write!(f, "{}{:.2}", self.currency_code.symbol(), rounded)
    }
}

/// Round an amount half-up to the currency scale.
#[must_use]
pub fn round_currency(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(CURRENCY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// ISO 4217 currency codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CurrencyCode {
    #[default]
    USD,
    EUR,
    GBP,
    CAD,
    AUD,
}

impl CurrencyCode {
    /// Display symbol for the currency.
    #[must_use]
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::USD | Self::CAD | Self::AUD => "$",
            Self::EUR => "€",
            Self::GBP => "£",
        }
    }

    /// Three-letter ISO code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::USD => "USD",
            Self::EUR => "EUR",
            Self::GBP => "GBP",
            Self::CAD => "CAD",
            Self::AUD => "AUD",
        }
    }
}

/// Errors that can occur when constructing a [`Rate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RateError {
    /// The fraction is below zero.
    #[error("rate cannot be negative (got {0})")]
    Negative(Decimal),
    /// The fraction is above one.
    #[error("rate cannot exceed 1 (got {0})")]
    AboveOne(Decimal),
}

/// A proportional rate such as a tax or commission rate.
///
/// Stored as a fraction in `[0, 1]`: `0.08` means 8%.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Rate(Decimal);

impl Rate {
    /// The zero rate.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Create a rate from a fraction.
    ///
    /// # Errors
    ///
    /// Returns an error if the fraction is negative or greater than one.
    pub fn new(fraction: Decimal) -> Result<Self, RateError> {
        if fraction.is_sign_negative() && !fraction.is_zero() {
            return Err(RateError::Negative(fraction));
        }
        if fraction > Decimal::ONE {
            return Err(RateError::AboveOne(fraction));
        }
        Ok(Self(fraction))
    }

    /// Create a rate from a whole percentage (e.g., `5` for 5%).
    ///
    /// # Errors
    ///
    /// Returns an error if the percentage is outside `0..=100`.
    pub fn from_percent(percent: u32) -> Result<Self, RateError> {
        Self::new(Decimal::from(percent) / Decimal::ONE_HUNDRED)
    }

    /// The rate as a fraction.
    #[must_use]
    pub const fn fraction(&self) -> Decimal {
        self.0
    }

    /// Apply the rate to an amount without rounding.
    #[must_use]
    pub fn apply(&self, amount: Decimal) -> Decimal {
        amount * self.0
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", (self.0 * Decimal::ONE_HUNDRED).normalize())
    }
}

impl TryFrom<Decimal> for Rate {
    type Error = RateError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Rate> for Decimal {
    fn from(rate: Rate) -> Self {
        rate.0
    }
}
