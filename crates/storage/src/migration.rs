use sea_orm::sea_query::{
    ColumnDef, Expr, ForeignKey, ForeignKeyAction, Index, IndexCreateStatement, Table,
    TableCreateStatement,
};
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection};

use crate::entity::{
    alert_dispatches, fee_samples, monitor_state, owners, transactions, watched_addresses,
};
use whalewatch_domain::storage::StorageResult;

pub async fn run_migrations(db: &DatabaseConnection) -> StorageResult<()> {
    let backend = db.get_database_backend();

    let owners_table = Table::create()
        .table(owners::Entity)
        .col(
            ColumnDef::new(owners::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(owners::Column::Contact).string().not_null())
        .to_owned();
    create_table(db, backend, owners_table).await?;

    let watched_table = Table::create()
        .table(watched_addresses::Entity)
        .col(
            ColumnDef::new(watched_addresses::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(watched_addresses::Column::OwnerId)
                .integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(watched_addresses::Column::Address)
                .string_len(42)
                .not_null(),
        )
        .col(
            ColumnDef::new(watched_addresses::Column::DisplayName)
                .string()
                .not_null(),
        )
        .col(
            ColumnDef::new(watched_addresses::Column::Threshold)
                .string_len(80)
                .not_null(),
        )
        .col(
            ColumnDef::new(watched_addresses::Column::AlertsEnabled)
                .boolean()
                .not_null()
                .default(true),
        )
        .col(
            ColumnDef::new(watched_addresses::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_watched_addresses_owner")
                .from(watched_addresses::Entity, watched_addresses::Column::OwnerId)
                .to(owners::Entity, owners::Column::Id)
                .on_delete(ForeignKeyAction::Cascade),
        )
        .to_owned();
    create_table(db, backend, watched_table).await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("ux_watched_addresses_owner_address")
            .table(watched_addresses::Entity)
            .col(watched_addresses::Column::OwnerId)
            .col(watched_addresses::Column::Address)
            .unique()
            .to_owned(),
    )
    .await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("ix_watched_addresses_address")
            .table(watched_addresses::Entity)
            .col(watched_addresses::Column::Address)
            .to_owned(),
    )
    .await?;

    let transactions_table = Table::create()
        .table(transactions::Entity)
        .col(
            ColumnDef::new(transactions::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(transactions::Column::TxHash)
                .string_len(66)
                .not_null()
                .unique_key(),
        )
        .col(
            ColumnDef::new(transactions::Column::FromAddress)
                .string_len(42)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::ToAddress)
                .string_len(42)
                .null(),
        )
        .col(
            ColumnDef::new(transactions::Column::ValueWei)
                .string_len(80)
                .not_null(),
        )
        .col(ColumnDef::new(transactions::Column::ValueQuote).double().null())
        .col(
            ColumnDef::new(transactions::Column::GasPriceWei)
                .string_len(80)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::BlockHeight)
                .big_integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::ObservedAt)
                .date_time()
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::TxKind)
                .string_len(32)
                .not_null(),
        )
        .col(
            ColumnDef::new(transactions::Column::IsLarge)
                .boolean()
                .not_null()
                .default(false),
        )
        .to_owned();
    create_table(db, backend, transactions_table).await?;

    let fee_table = Table::create()
        .table(fee_samples::Entity)
        .col(
            ColumnDef::new(fee_samples::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new(fee_samples::Column::Value).double().not_null())
        .col(
            ColumnDef::new(fee_samples::Column::Unit)
                .string_len(16)
                .not_null(),
        )
        .col(
            ColumnDef::new(fee_samples::Column::RecordedAt)
                .date_time()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, fee_table).await?;

    let dispatch_table = Table::create()
        .table(alert_dispatches::Entity)
        .col(
            ColumnDef::new(alert_dispatches::Column::Id)
                .integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(
            ColumnDef::new(alert_dispatches::Column::OwnerId)
                .integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(alert_dispatches::Column::TransactionId)
                .integer()
                .not_null(),
        )
        .col(
            ColumnDef::new(alert_dispatches::Column::Dispatched)
                .boolean()
                .not_null()
                .default(false),
        )
        .col(
            ColumnDef::new(alert_dispatches::Column::CreatedAt)
                .date_time()
                .not_null()
                .default(Expr::current_timestamp()),
        )
        .col(
            ColumnDef::new(alert_dispatches::Column::DispatchedAt)
                .date_time()
                .null(),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_alert_dispatches_transaction")
                .from(
                    alert_dispatches::Entity,
                    alert_dispatches::Column::TransactionId,
                )
                .to(transactions::Entity, transactions::Column::Id),
        )
        .to_owned();
    create_table(db, backend, dispatch_table).await?;
    create_index(
        db,
        backend,
        Index::create()
            .name("ux_alert_dispatches_owner_transaction")
            .table(alert_dispatches::Entity)
            .col(alert_dispatches::Column::OwnerId)
            .col(alert_dispatches::Column::TransactionId)
            .unique()
            .to_owned(),
    )
    .await?;

    let monitor_table = Table::create()
        .table(monitor_state::Entity)
        .col(
            ColumnDef::new(monitor_state::Column::Key)
                .string_len(64)
                .not_null()
                .primary_key(),
        )
        .col(
            ColumnDef::new(monitor_state::Column::ValueInt)
                .big_integer()
                .not_null(),
        )
        .to_owned();
    create_table(db, backend, monitor_table).await?;

    Ok(())
}

async fn create_table(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: TableCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(crate::errors::StorageError::from_source)?;
    Ok(())
}

async fn create_index(
    db: &DatabaseConnection,
    backend: DatabaseBackend,
    mut statement: IndexCreateStatement,
) -> StorageResult<()> {
    statement.if_not_exists();
    db.execute(backend.build(&statement))
        .await
        .map_err(crate::errors::StorageError::from_source)?;
    Ok(())
}
