//! Type-safe monetary value with embedded currency.

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

use crate::error::DomainError;

/// ISO-4217 style three-letter currency code, always upper case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(try_from = "String", into = "String")]
#[schema(value_type = String, example = "USD")]
pub struct CurrencyCode(String);

impl CurrencyCode {
    /// Parses and normalizes a currency code.
    pub fn parse(code: &str) -> Result<Self, DomainError> {
        let code = code.trim();
        if code.len() != 3 || !code.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(DomainError::validation(format!(
                "Invalid currency code: {}",
                code
            )));
        }
        Ok(Self(code.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<CurrencyCode> for String {
    fn from(code: CurrencyCode) -> Self {
        code.0
    }
}

impl std::str::FromStr for CurrencyCode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for CurrencyCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Type-safe money representation with embedded currency.
///
/// Amount is stored in the smallest unit of the currency (cents, paisa, etc.)
/// to avoid floating-point precision issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    amount: i64,
    currency: CurrencyCode,
}

impl Money {
    /// Creates a new Money value.
    pub fn new(amount: i64, currency: CurrencyCode) -> Result<Self, DomainError> {
        if amount < 0 {
            return Err(DomainError::NegativeAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Creates a strictly positive Money value (payment amounts).
    pub fn positive(amount: i64, currency: CurrencyCode) -> Result<Self, DomainError> {
        if amount <= 0 {
            return Err(DomainError::NonPositiveAmount);
        }
        Ok(Self { amount, currency })
    }

    /// Creates a zero-value Money for the given currency.
    pub fn zero(currency: CurrencyCode) -> Self {
        Self {
            amount: 0,
            currency,
        }
    }

    /// Returns the amount in smallest currency unit.
    pub fn amount(&self) -> i64 {
        self.amount
    }

    /// Returns the currency.
    pub fn currency(&self) -> &CurrencyCode {
        &self.currency
    }

    /// Checked addition - returns error if currencies don't match.
    pub fn checked_add(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        Ok(Money {
            amount: self.amount.saturating_add(other.amount),
            currency: self.currency.clone(),
        })
    }

    /// Checked subtraction - returns error if currencies don't match or result would be negative.
    pub fn checked_sub(&self, other: &Money) -> Result<Money, DomainError> {
        self.ensure_same_currency(other)?;
        if self.amount < other.amount {
            return Err(DomainError::InsufficientFunds {
                available: self.amount,
                requested: other.amount,
            });
        }
        Ok(Money {
            amount: self.amount - other.amount,
            currency: self.currency.clone(),
        })
    }

    fn ensure_same_currency(&self, other: &Money) -> Result<(), DomainError> {
        if self.currency != other.currency {
            return Err(DomainError::CurrencyMismatch {
                expected: self.currency.clone(),
                got: other.currency.clone(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let major = self.amount / 100;
        let minor = (self.amount % 100).abs();
        write!(f, "{}.{:02} {}", major, minor, self.currency)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usd() -> CurrencyCode {
        CurrencyCode::parse("usd").unwrap()
    }

    #[test]
    fn test_currency_code_normalizes() {
        assert_eq!(usd().as_str(), "USD");
        assert!(CurrencyCode::parse("US").is_err());
        assert!(CurrencyCode::parse("U5D").is_err());
    }

    #[test]
    fn test_currency_code_deserialize_validates() {
        let ok: CurrencyCode = serde_json::from_str("\"npr\"").unwrap();
        assert_eq!(ok.as_str(), "NPR");
        assert!(serde_json::from_str::<CurrencyCode>("\"dollars\"").is_err());
    }

    #[test]
    fn test_negative_money_fails() {
        let result = Money::new(-100, usd());
        assert!(matches!(result, Err(DomainError::NegativeAmount)));
        assert!(matches!(
            Money::positive(0, usd()),
            Err(DomainError::NonPositiveAmount)
        ));
    }

    #[test]
    fn test_money_arithmetic() {
        let a = Money::new(100, usd()).unwrap();
        let b = Money::new(50, usd()).unwrap();
        assert_eq!(a.checked_add(&b).unwrap().amount(), 150);
        assert_eq!(a.checked_sub(&b).unwrap().amount(), 50);
        assert!(matches!(
            b.checked_sub(&a),
            Err(DomainError::InsufficientFunds {
                available: 50,
                requested: 100
            })
        ));
    }

    #[test]
    fn test_currency_mismatch() {
        let usd = Money::new(100, usd()).unwrap();
        let eur = Money::new(50, CurrencyCode::parse("EUR").unwrap()).unwrap();
        assert!(matches!(
            usd.checked_add(&eur),
            Err(DomainError::CurrencyMismatch { .. })
        ));
    }

    #[test]
    fn test_money_display() {
        let money = Money::new(1050, usd()).unwrap();
        assert_eq!(format!("{}", money), "10.50 USD");
    }
}
