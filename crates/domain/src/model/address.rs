use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of raw bytes in an account address.
pub const ADDRESS_BYTES: usize = 20;

/// Errors emitted when an address string fails validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressFormatError {
    #[error("address must be exactly {} hex characters", ADDRESS_BYTES * 2)]
    WrongLength,
    #[error("address contains non-hex characters")]
    NonHex,
}

/// Account address normalized to lowercase `0x`-prefixed hex so that every
/// comparison in the pipeline is a plain string equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressFormatError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if digits.len() != ADDRESS_BYTES * 2 {
            return Err(AddressFormatError::WrongLength);
        }

        let bytes = hex::decode(digits).map_err(|_| AddressFormatError::NonHex)?;
        Ok(Self(format!("0x{}", hex::encode(bytes))))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressFormatError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}
