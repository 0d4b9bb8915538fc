use std::sync::Arc;
use std::time::Duration;

use metrics::counter;
use tracing::{debug, warn};
use whalewatch_domain::model::{
    Address, FeeSample, FeeUnit, NewTransaction, TransactionId, TxKind,
};
use whalewatch_domain::storage::{MonitorStorage, StorageResult};

use crate::alerts::{evaluate_alerts, qualifies, AlertContext, AlertOutcome};
use crate::fees::record_fee_sample;
use crate::matcher::RegistrySnapshot;
use crate::notify::NotificationDispatcher;
use crate::quote::QuoteHandle;
use crate::rpc::{ChainBlock, ChainTransaction};

/// What happened to one transaction of a block.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactionOutcome {
    /// Neither side is watched; nothing was stored.
    Unwatched,
    /// An address failed validation; the transaction was skipped.
    Malformed,
    Recorded {
        transaction_id: TransactionId,
        kind: TxKind,
        alerts: Vec<AlertOutcome>,
    },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BlockSummary {
    pub height: u64,
    pub transactions_seen: usize,
    pub recorded: usize,
    pub fee_sample: Option<FeeSample>,
    pub alerts: Vec<AlertOutcome>,
}

/// Per-block ingestion: fee sample, registry snapshot, then every
/// transaction in block order.
#[derive(Clone)]
pub struct Pipeline {
    dispatcher: Arc<dyn NotificationDispatcher>,
    quotes: QuoteHandle,
    fee_unit: FeeUnit,
    call_timeout: Duration,
}

impl Pipeline {
    pub fn new(
        dispatcher: Arc<dyn NotificationDispatcher>,
        quotes: QuoteHandle,
        fee_unit: FeeUnit,
        call_timeout: Duration,
    ) -> Self {
        Self {
            dispatcher,
            quotes,
            fee_unit,
            call_timeout,
        }
    }

    /// Processes one block. Any storage error aborts the block so the caller
    /// can retry it without moving the cursor.
    pub async fn process_block<S>(&self, storage: &S, block: &ChainBlock) -> StorageResult<BlockSummary>
    where
        S: MonitorStorage + ?Sized,
    {
        let fee_sample = record_fee_sample(storage, block, self.fee_unit).await?;
        let snapshot = RegistrySnapshot::load(storage).await?;

        let mut summary = BlockSummary {
            height: block.height,
            transactions_seen: block.transactions.len(),
            fee_sample,
            ..BlockSummary::default()
        };
        if snapshot.is_empty() {
            debug!(height = block.height, "registry empty, skipping transactions");
            return Ok(summary);
        }

        for tx in &block.transactions {
            if let TransactionOutcome::Recorded { alerts, .. } =
                self.process_transaction(storage, &snapshot, block, tx).await?
            {
                summary.recorded += 1;
                summary.alerts.extend(alerts);
            }
        }
        Ok(summary)
    }

    /// Classifies, matches, persists and evaluates a single transaction.
    pub async fn process_transaction<S>(
        &self,
        storage: &S,
        snapshot: &RegistrySnapshot,
        block: &ChainBlock,
        tx: &ChainTransaction,
    ) -> StorageResult<TransactionOutcome>
    where
        S: MonitorStorage + ?Sized,
    {
        let Some((from, to)) = normalize_parties(tx) else {
            counter!("monitor_transactions_skipped_total", "reason" => "bad_address")
                .increment(1);
            warn!(tx_hash = %tx.hash, height = block.height, "skipping transaction with invalid address");
            return Ok(TransactionOutcome::Malformed);
        };

        let matches = snapshot.matches(&from, to.as_ref());
        if matches.is_empty() {
            return Ok(TransactionOutcome::Unwatched);
        }

        let kind = TxKind::classify(to.is_some(), &tx.payload);
        let is_large = matches.iter().any(|m| qualifies(m.entry, &tx.value));
        let new_tx = NewTransaction {
            hash: tx.hash.to_ascii_lowercase(),
            from: from.clone(),
            to: to.clone(),
            value: tx.value.clone(),
            value_quote: self.quotes.value_of(&tx.value),
            gas_price: tx.gas_price.clone(),
            block_height: block.height,
            observed_at: block.timestamp,
            kind,
            is_large,
        };
        let transaction_id = storage.upsert_transaction(new_tx.clone()).await?;
        counter!("monitor_transactions_recorded_total", "kind" => kind.as_ref().to_string())
            .increment(1);
        let record = new_tx.into_record(transaction_id);

        let ctx = AlertContext {
            dispatcher: self.dispatcher.as_ref(),
            send_timeout: self.call_timeout,
            quote_currency: Some(self.quotes.currency()),
        };
        let alerts = evaluate_alerts(storage, &ctx, &matches, &record).await?;
        debug!(
            tx_hash = %record.hash,
            matched = matches.len(),
            alerts = alerts.len(),
            "transaction recorded"
        );

        Ok(TransactionOutcome::Recorded {
            transaction_id,
            kind,
            alerts,
        })
    }
}

fn normalize_parties(tx: &ChainTransaction) -> Option<(Address, Option<Address>)> {
    let from = Address::parse(&tx.from).ok()?;
    let to = match tx.to.as_deref() {
        Some(raw) => Some(Address::parse(raw).ok()?),
        None => None,
    };
    Some((from, to))
}
