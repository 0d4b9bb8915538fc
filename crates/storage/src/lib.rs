//! SeaORM-backed storage adapters that satisfy the domain storage traits while
//! keeping the database backend swappable (SQLite by default, PostgreSQL via
//! feature flag).

mod builder;
mod cursor_store;
mod dispatch_store;
mod entity;
mod errors;
mod fee_store;
mod migration;
mod transaction_store;
mod watchlist_store;

use std::sync::Arc;
use std::time::Duration;

pub use builder::StorageBuilder;
use errors::StorageError;
use migration::run_migrations;
use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use whalewatch_domain::storage::StorageResult;

/// Upper bound on waiting for a pooled connection or opening a new one.
pub const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared, pooled storage handle injected into the scan loop.
#[derive(Clone)]
pub struct SeaOrmStorage {
    db: Arc<DatabaseConnection>,
}

impl SeaOrmStorage {
    /// Connects to the provided database URL and ensures the schema is present.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        Self::builder().database_url(database_url).build().await
    }

    pub fn builder() -> StorageBuilder {
        StorageBuilder::new()
    }

    pub(crate) fn from_connection(db: DatabaseConnection) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        self.db.as_ref()
    }
}

pub(crate) async fn open_connection(options: ConnectOptions) -> StorageResult<DatabaseConnection> {
    let db = Database::connect(options)
        .await
        .map_err(StorageError::from_source)?;
    prepare_connection(&db).await?;
    Ok(db)
}

pub(crate) async fn prepare_connection(db: &DatabaseConnection) -> StorageResult<()> {
    run_migrations(db).await
}

pub(crate) fn height_to_db(height: u64) -> StorageResult<i64> {
    i64::try_from(height).map_err(|_| StorageError::corrupt(format!("height {height} overflows")))
}

pub(crate) fn height_from_db(height: i64) -> StorageResult<u64> {
    u64::try_from(height).map_err(|_| StorageError::corrupt(format!("negative height {height}")))
}
