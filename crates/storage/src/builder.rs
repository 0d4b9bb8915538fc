use std::time::Duration;

use sea_orm::ConnectOptions;
use whalewatch_domain::storage::StorageResult;

use crate::{errors::StorageError, open_connection, SeaOrmStorage, DEFAULT_ACQUIRE_TIMEOUT};

#[derive(Default)]
pub struct StorageBuilder {
    database_url: Option<String>,
    max_connections: Option<u32>,
    acquire_timeout: Option<Duration>,
}

impl StorageBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = Some(max.max(1));
        self
    }

    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    pub async fn build(self) -> StorageResult<SeaOrmStorage> {
        let url = self
            .database_url
            .ok_or_else(|| StorageError::Database("missing database url".into()))?;
        let timeout = self.acquire_timeout.unwrap_or(DEFAULT_ACQUIRE_TIMEOUT);

        let mut options = ConnectOptions::new(url);
        options
            .connect_timeout(timeout)
            .acquire_timeout(timeout)
            .sqlx_logging(false);
        if let Some(max) = self.max_connections {
            options.max_connections(max);
        }

        let db = open_connection(options).await?;
        Ok(SeaOrmStorage::from_connection(db))
    }
}
