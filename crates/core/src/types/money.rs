//! Non-negative monetary amounts using decimal arithmetic.
//!
//! The shop runs in a single currency, so a `Money` is only an amount. It
//! is stored as `NUMERIC(12, 2)` and serialized as a decimal string
//! (`"19.99"`), matching how prices travel over the JSON API.

use core::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Errors that can occur when constructing a [`Money`] value.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// The amount is below zero.
    #[error("amount cannot be negative")]
    Negative,
    /// The amount does not fit in `NUMERIC(12, 2)`.
    #[error("amount must be less than {max}")]
    TooLarge {
        /// Exclusive upper bound.
        max: Decimal,
    },
}

/// A non-negative amount rounded to two decimal places.
///
/// ```
/// use cheap_electra_core::Money;
/// use rust_decimal::Decimal;
///
/// let price = Money::new(Decimal::new(1999, 2)).unwrap();
/// assert_eq!(price.to_string(), "19.99");
/// assert!(Money::new(Decimal::NEGATIVE_ONE).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(Decimal::ZERO);

    /// Exclusive upper bound imposed by the `NUMERIC(12, 2)` column.
    #[must_use]
    pub fn max_exclusive() -> Decimal {
        Decimal::new(10_000_000_000, 0)
    }

    /// Create a new amount, rounding to cents.
    ///
    /// # Errors
    ///
    /// Returns `MoneyError::Negative` for amounts below zero and
    /// `MoneyError::TooLarge` for amounts that overflow the column.
    pub fn new(amount: Decimal) -> Result<Self, MoneyError> {
        if amount.is_sign_negative() && !amount.is_zero() {
            return Err(MoneyError::Negative);
        }
        let mut rounded = amount.round_dp(2);
        rounded.rescale(2);
        // Compare after rounding: 9999999999.995 rounds up past the column
        let max = Self::max_exclusive();
        if rounded >= max {
            return Err(MoneyError::TooLarge { max });
        }
        Ok(Self(rounded))
    }

    /// Returns the underlying decimal amount.
    #[must_use]
    pub const fn amount(&self) -> Decimal {
        self.0
    }

    /// Returns true if the amount is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

impl TryFrom<Decimal> for Money {
    type Error = MoneyError;

    fn try_from(value: Decimal) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Money> for Decimal {
    fn from(money: Money) -> Self {
        money.0
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Money {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <Decimal as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <Decimal as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Money {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let amount = <Decimal as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Column carries a CHECK (>= 0) constraint
        Ok(Self(amount))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Money {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <Decimal as sqlx::Encode<sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_is_allowed() {
        let zero = Money::new(Decimal::ZERO).unwrap();
        assert!(zero.is_zero());
        assert_eq!(zero.to_string(), "0.00");
    }

    #[test]
    fn test_negative_rejected() {
        assert_eq!(Money::new(Decimal::new(-1, 2)), Err(MoneyError::Negative));
    }

    #[test]
    fn test_rounds_to_cents() {
        let money = Money::new(Decimal::new(12_346, 3)).unwrap();
        assert_eq!(money.to_string(), "12.35");
    }

    #[test]
    fn test_too_large_rejected() {
        assert!(matches!(
            Money::new(Money::max_exclusive()),
            Err(MoneyError::TooLarge { .. })
        ));
    }

    #[test]
    fn test_serializes_as_string_and_accepts_numbers() {
        let money = Money::new(Decimal::new(1999, 2)).unwrap();
        assert_eq!(serde_json::to_string(&money).unwrap(), "\"19.99\"");

        let from_number: Money = serde_json::from_str("0").unwrap();
        assert!(from_number.is_zero());
        let from_string: Money = serde_json::from_str("\"89.99\"").unwrap();
        assert_eq!(from_string.to_string(), "89.99");
        assert!(serde_json::from_str::<Money>("\"-5\"").is_err());
    }

    #[test]
    fn test_rounding_up_to_bound_rejected() {
        // 9999999999.995
        let amount = Decimal::new(9_999_999_999_995, 3);
        assert!(matches!(
            Money::new(amount),
            Err(MoneyError::TooLarge { .. })
        ));

        let largest = Money::new(Decimal::new(9_999_999_999_994, 3)).unwrap();
        assert_eq!(largest.to_string(), "9999999999.99");
        assert!(largest.amount() < Money::max_exclusive());
    }
}
