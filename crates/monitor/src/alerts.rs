use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use strum_macros::AsRefStr;
use tracing::{debug, info, warn};
use whalewatch_domain::model::{
    Direction, NewDispatchRecord, OwnerId, TransactionRecord, WatchedAddress, Wei,
};
use whalewatch_domain::storage::{DispatchStore, StorageError, StorageResult};

use crate::matcher::Match;
use crate::notify::{AlertPayload, NotificationDispatcher};
use crate::retry::bounded;

/// Result of one alert attempt for a qualifying registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum DispatchOutcome {
    Sent,
    /// Delivery failed; the claim was released so a later pass retries.
    Failed,
    AlreadyDispatched,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlertOutcome {
    pub owner_id: OwnerId,
    pub direction: Direction,
    pub outcome: DispatchOutcome,
}

/// Everything the evaluator needs besides storage.
pub struct AlertContext<'a> {
    pub dispatcher: &'a dyn NotificationDispatcher,
    pub send_timeout: Duration,
    pub quote_currency: Option<&'a str>,
}

/// True when `value` reaches the entry's threshold, compared exactly in
/// ether.
pub fn qualifies(entry: &WatchedAddress, value: &Wei) -> bool {
    value.to_ether() >= entry.threshold
}

/// Applies per-entry thresholds and dispatches at most one alert per
/// (owner, transaction). Only qualifying entries produce an outcome.
/// Storage failures abort the evaluation; delivery failures do not.
///
/// An existing dispatch record, sent or not, always suppresses a resend.
/// Failed deliveries delete their record so a later pass can retry.
pub async fn evaluate_alerts<S>(
    storage: &S,
    ctx: &AlertContext<'_>,
    matches: &[Match<'_>],
    tx: &TransactionRecord,
) -> StorageResult<Vec<AlertOutcome>>
where
    S: DispatchStore + ?Sized,
{
    let mut outcomes = Vec::new();
    for m in matches {
        if !qualifies(m.entry, &tx.value) {
            debug!(
                owner_id = m.entry.owner_id,
                tx_hash = %tx.hash,
                threshold = %m.entry.threshold,
                "below threshold"
            );
            continue;
        }

        let outcome = dispatch_once(storage, ctx, m, tx).await?;
        counter!("monitor_alerts_total", "outcome" => outcome.as_ref().to_string()).increment(1);
        outcomes.push(AlertOutcome {
            owner_id: m.entry.owner_id,
            direction: m.direction,
            outcome,
        });
    }
    Ok(outcomes)
}

async fn dispatch_once<S>(
    storage: &S,
    ctx: &AlertContext<'_>,
    m: &Match<'_>,
    tx: &TransactionRecord,
) -> StorageResult<DispatchOutcome>
where
    S: DispatchStore + ?Sized,
{
    let owner_id = m.entry.owner_id;
    let claim = NewDispatchRecord {
        owner_id,
        transaction_id: tx.id,
    };
    let record_id = match storage.insert_dispatch_record(claim).await {
        Ok(id) => id,
        Err(StorageError::Conflict) => return Ok(DispatchOutcome::AlreadyDispatched),
        Err(err) => return Err(err),
    };

    let payload = AlertPayload::new(m.entry, m.direction, tx, ctx.quote_currency);
    match bounded(
        ctx.send_timeout,
        ctx.dispatcher.send(&m.entry.contact, &payload),
    )
    .await
    {
        Ok(()) => {
            storage.mark_dispatched(record_id, Utc::now()).await?;
            info!(
                owner_id,
                tx_hash = %tx.hash,
                direction = %m.direction,
                "alert dispatched"
            );
            Ok(DispatchOutcome::Sent)
        }
        Err(err) => {
            warn!(
                owner_id,
                tx_hash = %tx.hash,
                error = %err,
                "alert dispatch failed, releasing claim"
            );
            storage.release_dispatch_record(record_id).await?;
            Ok(DispatchOutcome::Failed)
        }
    }
}
