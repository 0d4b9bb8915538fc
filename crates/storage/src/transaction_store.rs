use sea_orm::sea_query::OnConflict;
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};
use whalewatch_domain::model::{
    Address, NewTransaction, TransactionId, TransactionRecord, TxKind, Wei,
};
use whalewatch_domain::storage::{StorageResult, TransactionStore};

use crate::entity::transactions;
use crate::errors::StorageError;
use crate::{height_from_db, height_to_db, SeaOrmStorage};

#[async_trait::async_trait]
impl TransactionStore for SeaOrmStorage {
    async fn upsert_transaction(&self, tx: NewTransaction) -> StorageResult<TransactionId> {
        let hash = tx.hash.to_ascii_lowercase();
        let model = transactions::ActiveModel {
            tx_hash: Set(hash.clone()),
            from_address: Set(tx.from.into_inner()),
            to_address: Set(tx.to.map(Address::into_inner)),
            value_wei: Set(tx.value.to_string()),
            value_quote: Set(tx.value_quote),
            gas_price_wei: Set(tx.gas_price.to_string()),
            block_height: Set(height_to_db(tx.block_height)?),
            observed_at: Set(tx.observed_at),
            tx_kind: Set(tx.kind.as_ref().to_string()),
            is_large: Set(tx.is_large),
            ..Default::default()
        };
        let inserted = transactions::Entity::insert(model)
            .on_conflict(
                OnConflict::column(transactions::Column::TxHash)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        if inserted == 0 {
            tracing::debug!(tx_hash = %hash, "transaction already stored");
        }

        let stored = transactions::Entity::find()
            .filter(transactions::Column::TxHash.eq(hash.as_str()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .ok_or_else(|| StorageError::Database(format!("transaction {hash} vanished")))?;
        Ok(stored.id)
    }

    async fn find_transaction(&self, hash: &str) -> StorageResult<Option<TransactionRecord>> {
        let maybe = transactions::Entity::find()
            .filter(transactions::Column::TxHash.eq(hash.to_ascii_lowercase()))
            .one(self.connection())
            .await
            .map_err(StorageError::from_source)?;
        maybe.map(transaction_to_record).transpose()
    }

    async fn recent_transactions(&self, limit: u64) -> StorageResult<Vec<TransactionRecord>> {
        transactions::Entity::find()
            .order_by_desc(transactions::Column::BlockHeight)
            .order_by_desc(transactions::Column::Id)
            .limit(limit)
            .all(self.connection())
            .await
            .map_err(StorageError::from_source)?
            .into_iter()
            .map(transaction_to_record)
            .collect()
    }
}

fn transaction_to_record(model: transactions::Model) -> StorageResult<TransactionRecord> {
    let from = Address::parse(&model.from_address).map_err(StorageError::corrupt)?;
    let to = model
        .to_address
        .as_deref()
        .map(Address::parse)
        .transpose()
        .map_err(StorageError::corrupt)?;

    Ok(TransactionRecord {
        id: model.id,
        hash: model.tx_hash,
        from,
        to,
        value: Wei::from_decimal_str(&model.value_wei).map_err(StorageError::corrupt)?,
        value_quote: model.value_quote,
        gas_price: Wei::from_decimal_str(&model.gas_price_wei).map_err(StorageError::corrupt)?,
        block_height: height_from_db(model.block_height)?,
        observed_at: model.observed_at,
        kind: model
            .tx_kind
            .parse::<TxKind>()
            .map_err(StorageError::corrupt)?,
        is_large: model.is_large,
    })
}
