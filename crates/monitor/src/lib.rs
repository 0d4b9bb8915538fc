//! Whale-wallet monitor: tails an Ethereum node block by block, records
//! transactions touching watched addresses, and alerts registrants whose
//! thresholds are met. The binary in `main.rs` wires these pieces from the
//! environment; embedders can assemble a [`Scanner`] directly.

pub mod alerts;
pub mod fees;
pub mod matcher;
pub mod notify;
pub mod pipeline;
pub mod quote;
pub mod retry;
pub mod rpc;
pub mod worker;

#[cfg(test)]
mod tests;

pub use alerts::{evaluate_alerts, AlertOutcome, DispatchOutcome};
pub use matcher::RegistrySnapshot;
pub use notify::{build_dispatcher, AlertPayload, NotificationDispatcher};
pub use pipeline::{BlockSummary, Pipeline, TransactionOutcome};
pub use quote::{spawn_refresher, CoinGeckoQuoteSource, PriceOracle, QuoteHandle, QuoteSource};
pub use rpc::{ChainBlock, ChainConnector, ChainError, ChainTransaction, JsonRpcConnector};
pub use worker::{MonitorError, Scanner, ScannerSettings, TickReport};
