//! Decimal money amounts.
//!
//! Catalog prices are stored in the currency's standard unit (dollars, not
//! cents) as `NUMERIC(12,2)`. The payment processor wants integer minor
//! units, so conversion goes through [`Money::to_minor_units`], which refuses
//! amounts that would lose precision.

use core::fmt;
use std::str::FromStr;

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

/// Errors from money arithmetic and conversion.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    #[error("amount cannot be negative: {0}")]
    Negative(Decimal),
    #[error("amount {0} has more than two decimal places")]
    TooPrecise(Decimal),
    #[error("amount {0} does not fit in minor units")]
    Overflow(Decimal),
    #[error("unsupported currency code: {0}")]
    UnknownCurrency(String),
}

/// ISO 4217 currency codes the storefront can charge in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum CurrencyCode {
    #[default]
    AUD,
    NZD,
    USD,
}

impl CurrencyCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AUD => "AUD",
            Self::NZD => "NZD",
            Self::USD => "USD",
        }
    }

    /// Lower-case code as the payment processor expects it.
    #[must_use]
    pub const fn processor_code(self) -> &'static str {
        match self {
            Self::AUD => "aud",
            Self::NZD => "nzd",
            Self::USD => "usd",
        }
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CurrencyCode {
    type Err = MoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUD" => Ok(Self::AUD),
            "NZD" => Ok(Self::NZD),
            "USD" => Ok(Self::USD),
            other => Err(MoneyError::UnknownCurrency(other.to_owned())),
        }
    }
}

/// An amount in a currency's standard unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    pub amount: Decimal,
    pub currency: CurrencyCode,
}

impl Money {
    #[must_use]
    pub const fn new(amount: Decimal, currency: CurrencyCode) -> Self {
        Self { amount, currency }
    }

    #[must_use]
    pub const fn zero(currency: CurrencyCode) -> Self {
        Self::new(Decimal::ZERO, currency)
    }

    /// Unit price multiplied by a whole quantity.
    #[must_use]
    pub fn times(self, quantity: u32) -> Self {
        Self::new(self.amount * Decimal::from(quantity), self.currency)
    }

    /// Convert to integer minor units (cents).
    ///
    /// # Errors
    ///
    /// Fails for negative amounts, amounts with sub-cent precision, and
    /// amounts too large for an `i64` count of cents.
    pub fn to_minor_units(&self) -> Result<i64, MoneyError> {
        let amount = self.amount.normalize();
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative(self.amount));
        }
        if amount.scale() > 2 {
            return Err(MoneyError::TooPrecise(self.amount));
        }
        (amount * Decimal::ONE_HUNDRED)
            .to_i64()
            .ok_or(MoneyError::Overflow(self.amount))
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {:.2}", self.currency, self.amount)
    }
}
