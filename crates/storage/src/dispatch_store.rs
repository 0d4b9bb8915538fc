use chrono::{DateTime, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, Set};
use whalewatch_domain::model::{
    DispatchId, DispatchRecord, NewDispatchRecord, OwnerId, TransactionId,
};
use whalewatch_domain::storage::{DispatchStore, StorageResult};

use crate::entity::alert_dispatches;
use crate::errors::StorageError;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl DispatchStore for SeaOrmStorage {
    async fn find_dispatch_record(
        &self,
        owner_id: OwnerId,
        transaction_id: TransactionId,
    ) -> StorageResult<Option<DispatchRecord>> {
        let maybe = alert_dispatches::Entity::find()
            .filter(alert_dispatches::Column::OwnerId.eq(owner_id))
            .filter(alert_dispatches::Column::TransactionId.eq(transaction_id))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(maybe.map(dispatch_to_record))
    }

    async fn insert_dispatch_record(
        &self,
        record: NewDispatchRecord,
    ) -> StorageResult<DispatchId> {
        let model = alert_dispatches::ActiveModel {
            owner_id: Set(record.owner_id),
            transaction_id: Set(record.transaction_id),
            dispatched: Set(false),
            created_at: Set(Utc::now()),
            dispatched_at: Set(None),
            ..Default::default()
        };
        let inserted = alert_dispatches::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([
                    alert_dispatches::Column::OwnerId,
                    alert_dispatches::Column::TransactionId,
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

        self.find_dispatch_record(record.owner_id, record.transaction_id)
            .await?
            .map(|stored| stored.id)
            .ok_or_else(|| StorageError::Database("dispatch record vanished".into()))
    }

    async fn mark_dispatched(&self, id: DispatchId, at: DateTime<Utc>) -> StorageResult<()> {
        let model = alert_dispatches::ActiveModel {
            dispatched: Set(true),
            dispatched_at: Set(Some(at)),
            ..Default::default()
        };
        let result = alert_dispatches::Entity::update_many()
            .set(model)
            .filter(alert_dispatches::Column::Id.eq(id))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        if result.rows_affected == 0 {
            return Err(StorageError::Database(format!(
                "dispatch record {id} not found"
            )));
        }
        Ok(())
    }

    async fn release_dispatch_record(&self, id: DispatchId) -> StorageResult<()> {
        alert_dispatches::Entity::delete_many()
            .filter(alert_dispatches::Column::Id.eq(id))
            .filter(alert_dispatches::Column::Dispatched.eq(false))
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }
}

fn dispatch_to_record(model: alert_dispatches::Model) -> DispatchRecord {
    DispatchRecord {
        id: model.id,
        owner_id: model.owner_id,
        transaction_id: model.transaction_id,
        dispatched: model.dispatched,
        created_at: model.created_at,
        dispatched_at: model.dispatched_at,
    }
}
