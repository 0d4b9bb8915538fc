use metrics::gauge;
use tracing::debug;
use whalewatch_domain::model::{display_value, FeeSample, FeeUnit};
use whalewatch_domain::storage::{FeeHistoryStore, StorageResult};

use crate::rpc::ChainBlock;

/// Fee sample for `block` in `unit`, stamped with the block timestamp.
/// Blocks without a base fee yield nothing.
pub fn fee_sample(block: &ChainBlock, unit: FeeUnit) -> Option<FeeSample> {
    let indicator = block.fee_indicator.as_ref()?;
    Some(FeeSample {
        value: display_value(&indicator.to_unit(unit)),
        unit,
        recorded_at: block.timestamp,
    })
}

pub async fn record_fee_sample<S>(
    storage: &S,
    block: &ChainBlock,
    unit: FeeUnit,
) -> StorageResult<Option<FeeSample>>
where
    S: FeeHistoryStore + ?Sized,
{
    let Some(sample) = fee_sample(block, unit) else {
        debug!(height = block.height, "block carries no base fee");
        return Ok(None);
    };
    storage.insert_fee_sample(sample.clone()).await?;
    gauge!("monitor_base_fee", "unit" => unit.as_ref().to_string()).set(sample.value);
    Ok(Some(sample))
}
