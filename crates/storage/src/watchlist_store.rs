use std::collections::HashMap;

use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use tracing::warn;
use whalewatch_domain::model::{
    parse_threshold, Address, NewWatchedAddress, OwnerId, WatchedAddress,
};
use whalewatch_domain::storage::{StorageResult, WatchlistStore};

use crate::entity::{owners, watched_addresses};
use crate::errors::StorageError;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl WatchlistStore for SeaOrmStorage {
    async fn watched_addresses(&self) -> StorageResult<Vec<WatchedAddress>> {
        let rows = watched_addresses::Entity::find()
            .filter(watched_addresses::Column::AlertsEnabled.eq(true))
            .order_by_asc(watched_addresses::Column::Id)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let owner_ids: Vec<OwnerId> = rows.iter().map(|row| row.owner_id).collect();
        let contacts: HashMap<OwnerId, String> = owners::Entity::find()
            .filter(owners::Column::Id.is_in(owner_ids))
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(|owner| (owner.id, owner.contact))
            .collect();

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let Some(contact) = contacts.get(&row.owner_id) else {
                warn!(owner_id = row.owner_id, "watched address without owner, skipping");
                continue;
            };
            match watched_to_entry(row, contact.clone()) {
                Ok(entry) => entries.push(entry),
                Err(err) => warn!(error = %err, "skipping malformed watched address"),
            }
        }
        Ok(entries)
    }
}

/// Registry writes. The management surface owns these in production; the
/// monitor only uses them for seeding and tests.
impl SeaOrmStorage {
    pub async fn insert_owner(&self, contact: &str) -> StorageResult<OwnerId> {
        let result = owners::Entity::insert(owners::ActiveModel {
            contact: Set(contact.trim().to_string()),
            ..Default::default()
        })
        .exec(self.connection())
        .await
        .map_err(StorageError::from_source)?;
        Ok(result.last_insert_id)
    }

    /// Registers an address for an owner; a second registration of the same
    /// (owner, address) pair fails with [`StorageError::Conflict`].
    pub async fn insert_watched_address(&self, entry: NewWatchedAddress) -> StorageResult<()> {
        let model = watched_addresses::ActiveModel {
            owner_id: Set(entry.owner_id),
            address: Set(entry.address.into_inner()),
            display_name: Set(entry.display_name),
            threshold: Set(entry.threshold.to_string()),
            alerts_enabled: Set(entry.alerts_enabled),
            created_at: Set(chrono::Utc::now()),
            ..Default::default()
        };
        let inserted = watched_addresses::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    watched_addresses::Column::OwnerId,
                    watched_addresses::Column::Address,
                ])
                .do_nothing()
                .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        if inserted == 0 {
            return Err(StorageError::Conflict);
        }
        Ok(())
    }

    pub async fn remove_watched_address(
        &self,
        owner_id: OwnerId,
        address: &Address,
    ) -> StorageResult<bool> {
        let result = watched_addresses::Entity::delete_many()
            .filter(watched_addresses::Column::OwnerId.eq(owner_id))
            .filter(watched_addresses::Column::Address.eq(address.as_str()))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(result.rows_affected > 0)
    }
}

fn watched_to_entry(model: watched_addresses::Model, contact: String) -> StorageResult<WatchedAddress> {
    Ok(WatchedAddress {
        owner_id: model.owner_id,
        contact,
        address: Address::parse(&model.address).map_err(StorageError::corrupt)?,
        display_name: model.display_name,
        threshold: parse_threshold(&model.threshold).map_err(StorageError::corrupt)?,
        alerts_enabled: model.alerts_enabled,
    })
}
