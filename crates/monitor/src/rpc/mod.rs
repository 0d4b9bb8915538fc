use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::warn;
use whalewatch_domain::model::Wei;

mod types;

pub use types::{
    ChainBlock, ChainTransaction, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcBlock,
    RpcTransaction,
};

/// Failures reported by a chain connector, split by whether retrying the
/// same call can help.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("chain node unavailable: {0}")]
    Transient(String),
    #[error("malformed chain data: {0}")]
    Malformed(String),
}

impl ChainError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<tokio::time::error::Elapsed> for ChainError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Transient("call timed out".into())
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(value: reqwest::Error) -> Self {
        Self::Transient(value.to_string())
    }
}

#[async_trait]
pub trait ChainConnector: Send + Sync {
    async fn tip_height(&self) -> Result<u64, ChainError>;
    async fn block(&self, height: u64) -> Result<ChainBlock, ChainError>;
}

/// Ethereum JSON-RPC connector over HTTP.
pub struct JsonRpcConnector {
    client: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl JsonRpcConnector {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, ChainError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| ChainError::Transient(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call<P, R>(&self, method: &'static str, params: P) -> Result<Option<R>, ChainError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        let envelope: JsonRpcResponse<Value> = response.json().await?;

        if let Some(err) = envelope.error {
            counter!("monitor_rpc_calls_total", "method" => method, "result" => "rpc_error")
                .increment(1);
            return Err(rpc_error(method, &err));
        }
        counter!("monitor_rpc_calls_total", "method" => method, "result" => "ok").increment(1);

        match envelope.result {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|err| ChainError::Malformed(format!("{method}: {err}"))),
        }
    }
}

/// Parse errors, invalid requests and invalid params fail the same way on
/// every retry. Everything else, including method-not-found and the
/// `-32000..-32099` server range, is treated as the node's problem.
fn rpc_error(method: &str, err: &JsonRpcError) -> ChainError {
    let detail = format!("{method} failed ({}): {}", err.code, err.message);
    match err.code {
        -32700 | -32600 | -32602 => ChainError::Malformed(detail),
        _ => ChainError::Transient(detail),
    }
}

#[async_trait]
impl ChainConnector for JsonRpcConnector {
    async fn tip_height(&self) -> Result<u64, ChainError> {
        let raw: String = self
            .call("eth_blockNumber", json!([]))
            .await?
            .ok_or_else(|| ChainError::Transient("eth_blockNumber returned null".into()))?;
        parse_quantity(&raw)
    }

    async fn block(&self, height: u64) -> Result<ChainBlock, ChainError> {
        let raw: RpcBlock = self
            .call("eth_getBlockByNumber", json!([format!("{height:#x}"), true]))
            .await?
            .ok_or_else(|| ChainError::Transient(format!("block {height} not available yet")))?;
        convert_block(raw)
    }
}

fn parse_quantity(raw: &str) -> Result<u64, ChainError> {
    raw.strip_prefix("0x")
        .and_then(|digits| u64::from_str_radix(digits, 16).ok())
        .ok_or_else(|| ChainError::Malformed(format!("invalid quantity `{raw}`")))
}

fn parse_wei(raw: &str) -> Result<Wei, ChainError> {
    Wei::from_hex_quantity(raw).map_err(|err| ChainError::Malformed(err.to_string()))
}

pub(crate) fn convert_block(raw: RpcBlock) -> Result<ChainBlock, ChainError> {
    let height = parse_quantity(&raw.number)?;
    let seconds = parse_quantity(&raw.timestamp)?;
    let timestamp = i64::try_from(seconds)
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
        .ok_or_else(|| ChainError::Malformed(format!("block {height} timestamp out of range")))?;
    let fee_indicator = raw.base_fee_per_gas.as_deref().map(parse_wei).transpose()?;

    let mut transactions = Vec::with_capacity(raw.transactions.len());
    for (index, value) in raw.transactions.into_iter().enumerate() {
        match convert_transaction(value) {
            Ok(tx) => transactions.push(tx),
            Err(err) => {
                counter!("monitor_transactions_skipped_total", "reason" => "malformed")
                    .increment(1);
                warn!(height, index, error = %err, "skipping malformed transaction");
            }
        }
    }

    Ok(ChainBlock {
        height,
        timestamp,
        fee_indicator,
        transactions,
    })
}

fn convert_transaction(value: Value) -> Result<ChainTransaction, ChainError> {
    let raw: RpcTransaction =
        serde_json::from_value(value).map_err(|err| ChainError::Malformed(err.to_string()))?;
    let gas_price = match raw.gas_price.as_deref() {
        Some(price) => parse_wei(price)?,
        None => Wei::zero(),
    };

    Ok(ChainTransaction {
        value: parse_wei(&raw.value)?,
        gas_price,
        hash: raw.hash,
        from: raw.from,
        to: raw.to,
        payload: raw.input,
    })
}
