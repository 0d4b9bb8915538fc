use sea_orm::{EntityTrait, QueryOrder, QuerySelect, Set};
use whalewatch_domain::model::{FeeSample, FeeUnit};
use whalewatch_domain::storage::{FeeHistoryStore, StorageResult};

use crate::entity::fee_samples;
use crate::errors::StorageError;
use crate::SeaOrmStorage;

#[async_trait::async_trait]
impl FeeHistoryStore for SeaOrmStorage {
    async fn insert_fee_sample(&self, sample: FeeSample) -> StorageResult<()> {
        let model = fee_samples::ActiveModel {
            value: Set(sample.value),
            unit: Set(sample.unit.as_ref().to_string()),
            recorded_at: Set(sample.recorded_at),
            ..Default::default()
        };
        fee_samples::Entity::insert(model)
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }

    async fn recent_fee_samples(&self, limit: u64) -> StorageResult<Vec<FeeSample>> {
        fee_samples::Entity::find()
            .order_by_desc(fee_samples::Column::RecordedAt)
            .order_by_desc(fee_samples::Column::Id)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(|model| {
                Ok(FeeSample {
                    value: model.value,
                    unit: model
                        .unit
                        .parse::<FeeUnit>()
                        .map_err(StorageError::corrupt)?,
                    recorded_at: model.recorded_at,
                })
            })
            .collect()
    }
}
