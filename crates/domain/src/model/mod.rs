//! Data structures and helpers shared across the storage and monitor crates.

mod address;
mod units;

use bigdecimal::BigDecimal;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum_macros::{AsRefStr, Display, EnumString};

pub use address::{Address, AddressFormatError, ADDRESS_BYTES};
pub use units::{display_value, parse_threshold, AmountError, FeeUnit, Wei};

/// Identifier of a registrant (account) owned by the external registry.
pub type OwnerId = i32;
/// Row id assigned to a persisted transaction.
pub type TransactionId = i32;
/// Row id assigned to an alert dispatch record.
pub type DispatchId = i32;

/// Kind of a transaction as seen from its envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    ContractCreation,
    ContractCall,
    Transfer,
}

impl TxKind {
    /// Classifies a transaction from the presence of a recipient and a call
    /// payload. `""` and `"0x"` count as an empty payload.
    pub fn classify(recipient_present: bool, payload: &str) -> Self {
        if !recipient_present {
            return Self::ContractCreation;
        }
        if payload_is_empty(payload) {
            Self::Transfer
        } else {
            Self::ContractCall
        }
    }
}

fn payload_is_empty(payload: &str) -> bool {
    let trimmed = payload.trim();
    trimmed.is_empty() || trimmed == "0x" || trimmed == "0X"
}

/// Which side of a transaction a watched address was matched on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Outgoing,
    Incoming,
}

/// One registry entry, joined with the owner's contact channel.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedAddress {
    pub owner_id: OwnerId,
    pub contact: String,
    pub address: Address,
    pub display_name: String,
    pub threshold: BigDecimal,
    pub alerts_enabled: bool,
}

/// Registry entry as written by the management surface.
#[derive(Debug, Clone, PartialEq)]
pub struct NewWatchedAddress {
    pub owner_id: OwnerId,
    pub address: Address,
    pub display_name: String,
    pub threshold: BigDecimal,
    pub alerts_enabled: bool,
}

/// Transaction observed on chain and about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
    pub hash: String,
    pub from: Address,
    pub to: Option<Address>,
    pub value: Wei,
    pub value_quote: Option<f64>,
    pub gas_price: Wei,
    pub block_height: u64,
    pub observed_at: DateTime<Utc>,
    pub kind: TxKind,
    pub is_large: bool,
}

impl NewTransaction {
    pub fn into_record(self, id: TransactionId) -> TransactionRecord {
        TransactionRecord {
            id,
            hash: self.hash,
            from: self.from,
            to: self.to,
            value: self.value,
            value_quote: self.value_quote,
            gas_price: self.gas_price,
            block_height: self.block_height,
            observed_at: self.observed_at,
            kind: self.kind,
            is_large: self.is_large,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub hash: String,
    pub from: Address,
    pub to: Option<Address>,
    pub value: Wei,
    pub value_quote: Option<f64>,
    pub gas_price: Wei,
    pub block_height: u64,
    pub observed_at: DateTime<Utc>,
    pub kind: TxKind,
    pub is_large: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeeSample {
    pub value: f64,
    pub unit: FeeUnit,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewDispatchRecord {
    pub owner_id: OwnerId,
    pub transaction_id: TransactionId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRecord {
    pub id: DispatchId,
    pub owner_id: OwnerId,
    pub transaction_id: TransactionId,
    pub dispatched: bool,
    pub created_at: DateTime<Utc>,
    pub dispatched_at: Option<DateTime<Utc>>,
}

/// Highest block height whose transaction and dispatch work is fully
/// committed. Only moves forward, except through [`Cursor::reset_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cursor(u64);

impl Cursor {
    pub fn at(height: u64) -> Self {
        Self(height)
    }

    pub fn height(self) -> u64 {
        self.0
    }

    /// First height that still needs processing.
    pub fn next_height(self) -> u64 {
        self.0.saturating_add(1)
    }

    /// Advances to `height` once that block is committed. Lower heights are
    /// ignored so a stale caller can never move the watermark back.
    pub fn advance(&mut self, height: u64) -> bool {
        if height > self.0 {
            self.0 = height;
            true
        } else {
            false
        }
    }

    /// Operator reset; the only path that may lower the watermark.
    pub fn reset_to(&mut self, height: u64) {
        self.0 = height;
    }
}
