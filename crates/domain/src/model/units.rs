use std::fmt;
use std::str::FromStr;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::{BigDecimal, ToPrimitive, Zero};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

const ETHER_DECIMALS: i64 = 18;
const GWEI_DECIMALS: i64 = 9;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AmountError {
    #[error("invalid hex quantity `{0}`")]
    InvalidQuantity(String),
    #[error("invalid decimal amount `{0}`")]
    InvalidDecimal(String),
    #[error("amount must not be negative")]
    Negative,
}

/// Exact on-chain amount in the smallest native denomination.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Wei(BigInt);

impl Wei {
    pub fn zero() -> Self {
        Self(BigInt::zero())
    }

    pub fn from_u128(value: u128) -> Self {
        Self(BigInt::from(value))
    }

    /// Parses a JSON-RPC quantity such as `0x1bc16d674ec80000`.
    pub fn from_hex_quantity(raw: &str) -> Result<Self, AmountError> {
        let digits = raw
            .strip_prefix("0x")
            .ok_or_else(|| AmountError::InvalidQuantity(raw.to_string()))?;
        if digits.is_empty() {
            return Err(AmountError::InvalidQuantity(raw.to_string()));
        }
        BigInt::parse_bytes(digits.as_bytes(), 16)
            .map(Self)
            .ok_or_else(|| AmountError::InvalidQuantity(raw.to_string()))
    }

    /// Parses the base-10 representation used by the storage layer.
    pub fn from_decimal_str(raw: &str) -> Result<Self, AmountError> {
        let value = BigInt::from_str(raw.trim())
            .map_err(|_| AmountError::InvalidDecimal(raw.to_string()))?;
        if value < BigInt::zero() {
            return Err(AmountError::Negative);
        }
        Ok(Self(value))
    }

    /// Converts an ether-denominated decimal into wei, truncating anything
    /// below one wei.
    pub fn from_ether(ether: &BigDecimal) -> Result<Self, AmountError> {
        if ether < &BigDecimal::zero() {
            return Err(AmountError::Negative);
        }
        let scaled = ether * BigDecimal::new(BigInt::from(1), -ETHER_DECIMALS);
        let (digits, _) = scaled.with_scale(0).into_bigint_and_exponent();
        Ok(Self(digits))
    }

    pub fn to_ether(&self) -> BigDecimal {
        BigDecimal::new(self.0.clone(), ETHER_DECIMALS)
    }

    pub fn to_unit(&self, unit: FeeUnit) -> BigDecimal {
        match unit {
            FeeUnit::Wei => BigDecimal::new(self.0.clone(), 0),
            FeeUnit::Gwei => BigDecimal::new(self.0.clone(), GWEI_DECIMALS),
            FeeUnit::Ether => self.to_ether(),
        }
    }

    pub fn as_bigint(&self) -> &BigInt {
        &self.0
    }
}

impl fmt::Display for Wei {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Display unit for fee indicators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, EnumString, Display, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum FeeUnit {
    Wei,
    #[default]
    Gwei,
    Ether,
}

/// Lossy conversion used only for informational values (fee charts, quote
/// currency amounts). Never use the result for threshold decisions.
pub fn display_value(value: &BigDecimal) -> f64 {
    value.to_f64().unwrap_or(f64::NAN)
}

/// Parses a registrant threshold expressed in the native unit.
pub fn parse_threshold(raw: &str) -> Result<BigDecimal, AmountError> {
    let value =
        BigDecimal::from_str(raw.trim()).map_err(|_| AmountError::InvalidDecimal(raw.to_string()))?;
    if value < BigDecimal::zero() {
        return Err(AmountError::Negative);
    }
    Ok(value)
}
