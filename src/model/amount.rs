//! Amount type for handling monetary values that arrive as decimal text.
//!
//! Frollo sends every amount as a string, e.g. `"-12.50"`. These must be canonical decimals: no
//! currency symbols, no thousands separators. Anything else is rejected so that a malformed value
//! can never be silently imported as zero.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::error::Error;
use std::fmt;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// Represents a signed monetary amount.
///
/// # Examples
///
/// ```
/// # use frollo_sync::model::Amount;
/// # use std::str::FromStr;
/// let amount = Amount::from_str("-1250.5").unwrap();
/// assert_eq!(amount.to_string(), "-1,250.50");
/// assert!(Amount::from_str("$5.00").is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount {
    value: Decimal,
}

impl Amount {
    pub const ZERO: Amount = Amount::new(Decimal::ZERO);

    pub const fn new(value: Decimal) -> Self {
        Self { value }
    }

    /// Returns the underlying Decimal value.
    pub fn value(&self) -> Decimal {
        self.value
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        !self.is_zero() && self.value.is_sign_negative()
    }
}

/// An error that can occur when parsing a non-canonical string into an `Amount`.
pub struct AmountError {
    input: String,
    source: Option<rust_decimal::Error>,
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "AmountError({:?})", self.input)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a canonical decimal amount", self.input)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.source.as_ref().map(|e| e as &(dyn Error + 'static))
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |source| AmountError {
            input: s.to_string(),
            source,
        };

        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('-').unwrap_or(trimmed);
        let canonical = !digits.is_empty()
            && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
            && digits.chars().filter(|c| *c == '.').count() <= 1
            && !digits.starts_with('.')
            && !digits.ends_with('.');
        if !canonical {
            return Err(error(None));
        }

        let value = Decimal::from_str(trimmed).map_err(|e| error(Some(e)))?;
        Ok(Amount { value })
    }
}

impl Display for Amount {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let sign = if self.is_negative() { "-" } else { "" };
        let num = self.value.abs();
        write!(
            f,
            "{sign}{}",
            format_num::format_num!(",.2", num.to_f64().unwrap_or_default())
        )
    }
}

impl Serialize for Amount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.value.to_string())
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl From<Decimal> for Amount {
    fn from(value: Decimal) -> Self {
        Amount::new(value)
    }
}

impl From<Amount> for Decimal {
    fn from(amount: Amount) -> Self {
        amount.value()
    }
}
