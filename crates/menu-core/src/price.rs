//! Precision-safe price types.
//!
//! Prices arrive on the push channel as JSON numbers and are converted to
//! `rust_decimal` right at the parse boundary so that sorting, comparison
//! and display never touch floating point.

use crate::error::{CoreError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Price value with exact decimal precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl Price {
    pub const ZERO: Self = Self(Decimal::ZERO);

    #[inline]
    pub fn new(value: Decimal) -> Self {
        Self(value)
    }

    #[inline]
    pub fn inner(&self) -> Decimal {
        self.0
    }

    #[inline]
    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Parse from the textual form of a JSON number (`"12"`, `"4.2"`, `"1e3"`).
    pub fn from_json_number(raw: &str) -> Result<Self> {
        let value = if raw.contains(|c: char| c == 'e' || c == 'E') {
            Decimal::from_scientific(raw)?
        } else {
            raw.parse::<Decimal>()?
        };
        Ok(Self(value.normalize()))
    }
}

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Price {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_json_number(s.trim())
    }
}

impl From<Decimal> for Price {
    fn from(d: Decimal) -> Self {
        Self(d)
    }
}

/// A price together with its currency code.
///
/// The currency is kept as the raw code from the stream (`"CZK"`, `"EUR"`);
/// unknown codes are legal and are rendered verbatim by the formatter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Money {
    pub value: Price,
    pub currency: String,
}

impl Money {
    pub fn new(value: Price, currency: impl Into<String>) -> Self {
        Self {
            value,
            currency: currency.into(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_price_from_json_number() {
        assert_eq!(Price::from_json_number("12").unwrap(), Price::new(dec!(12)));
        assert_eq!(
            Price::from_json_number("4.20").unwrap(),
            Price::new(dec!(4.2))
        );
        assert_eq!(
            Price::from_json_number("1.5e2").unwrap(),
            Price::new(dec!(150))
        );
        assert!(Price::from_json_number("abc").is_err());
    }

    #[test]
    fn test_price_ordering_is_numeric() {
        let small: Price = "9.99".parse().unwrap();
        let large: Price = "10".parse().unwrap();
        assert!(small < large);
    }

    #[test]
    fn test_money_display() {
        let money = Money::new(Price::new(dec!(4.2)), "EUR");
        assert_eq!(money.to_string(), "4.2 EUR");
    }
}
