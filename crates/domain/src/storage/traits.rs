use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{
    DispatchId, DispatchRecord, FeeSample, NewDispatchRecord, NewTransaction, OwnerId,
    TransactionId, TransactionRecord, WatchedAddress,
};

/// Common result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(String),
    #[error("record already exists")]
    Conflict,
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl StorageError {
    pub fn from_source(err: impl std::fmt::Display) -> Self {
        Self::Database(err.to_string())
    }

    pub fn corrupt(err: impl std::fmt::Display) -> Self {
        Self::Corrupt(err.to_string())
    }
}

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Inserts the transaction unless its hash is already stored. Either way
    /// the id of the stored row is returned.
    async fn upsert_transaction(&self, tx: NewTransaction) -> StorageResult<TransactionId>;
    async fn find_transaction(&self, hash: &str) -> StorageResult<Option<TransactionRecord>>;
    async fn recent_transactions(&self, limit: u64) -> StorageResult<Vec<TransactionRecord>>;
}

#[async_trait]
pub trait FeeHistoryStore: Send + Sync {
    async fn insert_fee_sample(&self, sample: FeeSample) -> StorageResult<()>;
    async fn recent_fee_samples(&self, limit: u64) -> StorageResult<Vec<FeeSample>>;
}

#[async_trait]
pub trait WatchlistStore: Send + Sync {
    /// Returns every entry with alerts enabled, joined with its owner contact.
    async fn watched_addresses(&self) -> StorageResult<Vec<WatchedAddress>>;
}

#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn find_dispatch_record(
        &self,
        owner_id: OwnerId,
        transaction_id: TransactionId,
    ) -> StorageResult<Option<DispatchRecord>>;

    async fn dispatch_record_exists(
        &self,
        owner_id: OwnerId,
        transaction_id: TransactionId,
    ) -> StorageResult<bool> {
        Ok(self
            .find_dispatch_record(owner_id, transaction_id)
            .await?
            .is_some())
    }

    /// Creates the dedup record for an (owner, transaction) pair, failing
    /// with [`StorageError::Conflict`] when one already exists.
    async fn insert_dispatch_record(&self, record: NewDispatchRecord)
        -> StorageResult<DispatchId>;

    async fn mark_dispatched(&self, id: DispatchId, at: DateTime<Utc>) -> StorageResult<()>;

    /// Drops an undispatched record so a later pass can retry the alert.
    /// Dispatched records are never removed.
    async fn release_dispatch_record(&self, id: DispatchId) -> StorageResult<()>;
}

#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn load_cursor(&self) -> StorageResult<Option<u64>>;
    async fn store_cursor(&self, height: u64) -> StorageResult<()>;
}

/// Everything the scan loop needs from the persistence gateway.
pub trait MonitorStorage:
    TransactionStore + FeeHistoryStore + WatchlistStore + DispatchStore + CursorStore
{
}

impl<T> MonitorStorage for T where
    T: TransactionStore + FeeHistoryStore + WatchlistStore + DispatchStore + CursorStore
{
}
