use sea_orm::{sea_query::OnConflict, EntityTrait, Set};
use whalewatch_domain::storage::{CursorStore, StorageResult};

use crate::entity::monitor_state;
use crate::errors::StorageError;
use crate::{height_from_db, height_to_db, SeaOrmStorage};

const CURSOR_KEY: &str = "scan_cursor";

#[async_trait::async_trait]
impl CursorStore for SeaOrmStorage {
    async fn load_cursor(&self) -> StorageResult<Option<u64>> {
        let maybe = monitor_state::Entity::find_by_id(CURSOR_KEY.to_string())
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(|model| height_from_db(model.value_int)).transpose()
    }

    async fn store_cursor(&self, height: u64) -> StorageResult<()> {
        let active = monitor_state::ActiveModel {
            key: Set(CURSOR_KEY.to_string()),
            value_int: Set(height_to_db(height)?),
        };
        monitor_state::Entity::insert(active)
            .on_conflict(
                OnConflict::column(monitor_state::Column::Key)
                    .update_column(monitor_state::Column::ValueInt)
                    .to_owned(),
            )
            .exec(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        Ok(())
    }
}
