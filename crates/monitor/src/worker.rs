use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use whalewatch_domain::{
    config::{ConfigError, MonitorConfig},
    model::Cursor,
    services::telemetry::TelemetryError,
    storage::{MonitorStorage, StorageError},
};

use crate::{
    notify::DispatchError,
    pipeline::{BlockSummary, Pipeline},
    quote::QuoteError,
    retry::{bounded, Backoff},
    rpc::{ChainConnector, ChainError},
};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),
    #[error("telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),
    #[error("quote error: {0}")]
    Quote(#[from] QuoteError),
    #[error("dispatcher error: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("scan task failed: {0}")]
    Task(String),
}

/// Loop timing knobs, lifted out of [`MonitorConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannerSettings {
    pub start_height: Option<u64>,
    pub poll_interval: Duration,
    pub call_timeout: Duration,
    pub backoff_initial: Duration,
    pub backoff_max: Duration,
}

impl ScannerSettings {
    pub fn from_config(config: &MonitorConfig) -> Self {
        Self {
            start_height: config.start_height(),
            poll_interval: config.poll_interval(),
            call_timeout: config.call_timeout(),
            backoff_initial: config.backoff_initial(),
            backoff_max: config.backoff_max(),
        }
    }
}

/// Work done by one tick of the scan loop.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    pub tip: u64,
    pub blocks: Vec<BlockSummary>,
    /// Heights that arrived undecodable and were stepped over.
    pub skipped: Vec<u64>,
}

pub struct Scanner<S, C> {
    storage: S,
    connector: C,
    pipeline: Pipeline,
    settings: ScannerSettings,
}

impl<S, C> Scanner<S, C>
where
    S: MonitorStorage,
    C: ChainConnector,
{
    pub fn new(storage: S, connector: C, pipeline: Pipeline, settings: ScannerSettings) -> Self {
        Self {
            storage,
            connector,
            pipeline,
            settings,
        }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Persisted cursor, else the block before the configured start height,
    /// else the current tip.
    pub async fn initial_cursor(&self) -> Result<Cursor, MonitorError> {
        if let Some(height) = self.storage.load_cursor().await? {
            return Ok(Cursor::at(height));
        }
        if let Some(start) = self.settings.start_height {
            return Ok(Cursor::at(start.saturating_sub(1)));
        }
        let tip = bounded(self.settings.call_timeout, self.connector.tip_height()).await?;
        info!(tip, "no stored cursor, starting from chain tip");
        Ok(Cursor::at(tip))
    }

    /// Overwrites the persisted cursor. The only path that moves it back.
    pub async fn reset_cursor(&self, height: u64) -> Result<Cursor, MonitorError> {
        let mut cursor = self.initial_cursor().await?;
        let previous = cursor.height();
        cursor.reset_to(height);
        self.storage.store_cursor(height).await?;
        warn!(previous, height, "cursor reset by operator");
        Ok(cursor)
    }

    /// Processes every block between the cursor and the tip in ascending
    /// order, persisting the cursor after each one. Stops early between
    /// blocks once shutdown is requested.
    pub async fn tick(
        &self,
        cursor: &mut Cursor,
        shutdown: &watch::Receiver<bool>,
    ) -> Result<TickReport, MonitorError> {
        let timeout = self.settings.call_timeout;
        let tip = match bounded(timeout, self.connector.tip_height()).await {
            Ok(tip) => tip,
            Err(err) => {
                counter!("monitor_rpc_calls_total", "method" => "tip_height", "result" => "error")
                    .increment(1);
                return Err(err.into());
            }
        };
        gauge!("monitor_chain_tip").set(tip as f64);

        let mut report = TickReport {
            tip,
            ..TickReport::default()
        };
        while cursor.next_height() <= tip {
            if shutdown_requested(shutdown) {
                debug!(cursor = cursor.height(), "shutdown requested, leaving tick");
                break;
            }
            let height = cursor.next_height();
            let processed = match bounded(timeout, self.connector.block(height)).await {
                Ok(block) => {
                    let summary = self.pipeline.process_block(&self.storage, &block).await?;
                    debug!(
                        height,
                        seen = summary.transactions_seen,
                        recorded = summary.recorded,
                        alerts = summary.alerts.len(),
                        "block processed"
                    );
                    report.blocks.push(summary);
                    true
                }
                Err(ChainError::Malformed(reason)) => {
                    counter!("monitor_blocks_skipped_total").increment(1);
                    warn!(height, %reason, "skipping undecodable block");
                    report.skipped.push(height);
                    false
                }
                Err(err) => {
                    counter!("monitor_rpc_calls_total", "method" => "block", "result" => "error")
                        .increment(1);
                    return Err(err.into());
                }
            };

            self.storage.store_cursor(height).await?;
            cursor.advance(height);
            if processed {
                counter!("monitor_blocks_processed_total").increment(1);
            }
            gauge!("monitor_cursor_height").set(height as f64);
        }
        Ok(report)
    }

    /// Runs ticks until shutdown. Tick failures back off and retry; the loop
    /// only returns once shutdown is observed.
    pub async fn run(
        &self,
        mut cursor: Cursor,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Cursor, MonitorError> {
        let mut backoff = Backoff::new(self.settings.backoff_initial, self.settings.backoff_max);
        info!(cursor = cursor.height(), "scan loop started");

        while !shutdown_requested(&shutdown) {
            let started = Instant::now();
            let delay = match self.tick(&mut cursor, &shutdown).await {
                Ok(report) => {
                    backoff.reset();
                    let elapsed = started.elapsed();
                    histogram!("monitor_tick_seconds").record(elapsed.as_secs_f64());
                    if !report.blocks.is_empty() || !report.skipped.is_empty() {
                        info!(
                            cursor = cursor.height(),
                            tip = report.tip,
                            blocks = report.blocks.len(),
                            skipped = report.skipped.len(),
                            "tick complete"
                        );
                    }
                    self.settings.poll_interval.saturating_sub(elapsed)
                }
                Err(err) => {
                    counter!("monitor_tick_failures_total").increment(1);
                    let delay = backoff.next_delay();
                    warn!(
                        error = %err,
                        cursor = cursor.height(),
                        retry_in_ms = delay.as_millis() as u64,
                        "tick failed, backing off"
                    );
                    delay
                }
            };
            if wait_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        info!(cursor = cursor.height(), "scan loop stopped");
        Ok(cursor)
    }
}

/// A dropped sender counts as a shutdown request.
fn shutdown_requested(shutdown: &watch::Receiver<bool>) -> bool {
    let flagged = *shutdown.borrow();
    flagged || shutdown.has_changed().is_err()
}

async fn wait_or_shutdown(delay: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    if delay.is_zero() {
        return shutdown_requested(shutdown);
    }
    tokio::select! {
        _ = sleep(delay) => shutdown_requested(shutdown),
        changed = shutdown.changed() => changed.is_err() || shutdown_requested(shutdown),
    }
}
