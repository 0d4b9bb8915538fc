use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use whalewatch_domain::model::Wei;

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<T> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'static str,
    pub params: T,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// `eth_getBlockByNumber` payload with full transaction objects. Each
/// transaction stays raw JSON so one bad entry cannot poison the block.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub number: String,
    pub timestamp: String,
    #[serde(default)]
    pub base_fee_per_gas: Option<String>,
    #[serde(default)]
    pub transactions: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcTransaction {
    pub hash: String,
    pub from: String,
    #[serde(default)]
    pub to: Option<String>,
    pub value: String,
    #[serde(default)]
    pub input: String,
    #[serde(default)]
    pub gas_price: Option<String>,
}

/// Block contents as consumed by the scan loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainBlock {
    pub height: u64,
    pub timestamp: DateTime<Utc>,
    /// Base fee per gas; absent on pre-London blocks.
    pub fee_indicator: Option<Wei>,
    pub transactions: Vec<ChainTransaction>,
}

/// Transaction envelope in block order. Addresses are kept as delivered by
/// the node and normalized by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainTransaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: Wei,
    pub payload: String,
    pub gas_price: Wei,
}
