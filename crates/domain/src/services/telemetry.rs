use std::{env, net::SocketAddr, sync::Arc};

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::hydrate_env_file;

const DEFAULT_LOG_FILTER: &str = "info";
const TICK_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static SUBSCRIBER_INSTALLED: OnceCell<()> = OnceCell::new();
static METRICS_HANDLE: OnceCell<Arc<PrometheusHandle>> = OnceCell::new();

/// Observability options read from `<PREFIX>_LOG_FILTER` and
/// `<PREFIX>_METRICS_ADDRESS`.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    service: String,
    log_filter: String,
    metrics_address: Option<String>,
}

impl TelemetryConfig {
    pub fn from_env(prefix: &str) -> Self {
        let _ = hydrate_env_file();
        let service = prefix.trim().to_ascii_lowercase();
        let upper = service.to_ascii_uppercase();

        Self {
            log_filter: non_blank_var(&format!("{upper}_LOG_FILTER"))
                .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            metrics_address: non_blank_var(&format!("{upper}_METRICS_ADDRESS")),
            service,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    pub fn metrics_address(&self) -> Option<&str> {
        self.metrics_address.as_deref()
    }
}

fn non_blank_var(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Keeps the Prometheus handle alive for the lifetime of the binary.
#[derive(Clone)]
pub struct TelemetryGuard {
    metrics: Arc<PrometheusHandle>,
}

impl TelemetryGuard {
    pub fn render_metrics(&self) -> String {
        self.metrics.render()
    }
}

/// Installs the tracing subscriber and the Prometheus recorder. Later calls
/// reuse whatever the first call installed.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<TelemetryGuard, TelemetryError> {
    install_tracing(config)?;
    let metrics = install_metrics(config)?;
    describe_monitor_metrics();

    Ok(TelemetryGuard { metrics })
}

fn install_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    if SUBSCRIBER_INSTALLED.get().is_some() {
        return Ok(());
    }

    let env_filter = EnvFilter::try_new(config.log_filter())
        .map_err(|err| TelemetryError::InvalidLogFilter(err.to_string()))?;

    if SUBSCRIBER_INSTALLED.set(()).is_ok() {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()
            .map_err(|err| TelemetryError::Tracing(err.to_string()))?;
    }

    Ok(())
}

fn install_metrics(config: &TelemetryConfig) -> Result<Arc<PrometheusHandle>, TelemetryError> {
    METRICS_HANDLE
        .get_or_try_init(|| {
            let builder = PrometheusBuilder::new()
                .add_global_label("service", config.service())
                .set_buckets_for_metric(
                    Matcher::Full("monitor_tick_seconds".to_string()),
                    TICK_BUCKETS,
                )
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;

            let Some(addr) = config.metrics_address() else {
                return builder
                    .install_recorder()
                    .map(Arc::new)
                    .map_err(|err| TelemetryError::Metrics(err.to_string()));
            };
            let socket: SocketAddr = addr.parse().map_err(|err: std::net::AddrParseError| {
                TelemetryError::InvalidMetricsAddress(addr.to_string(), err.to_string())
            })?;
            let runtime = Handle::try_current().map_err(|_| TelemetryError::NoRuntime)?;

            // `build` binds the listener; the returned future serves scrapes.
            let (recorder, exporter) = builder
                .with_http_listener(socket)
                .build()
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
            let handle = recorder.handle();
            metrics::set_global_recorder(recorder)
                .map_err(|err| TelemetryError::Metrics(err.to_string()))?;
            runtime.spawn(async move {
                if let Err(err) = exporter.await {
                    error!(error = ?err, "prometheus exporter stopped");
                }
            });
            info!(%socket, "serving prometheus metrics");

            Ok(Arc::new(handle))
        })
        .cloned()
}

fn describe_monitor_metrics() {
    describe_counter!(
        "monitor_blocks_processed_total",
        "Blocks whose work was committed and cursor persisted."
    );
    describe_counter!(
        "monitor_blocks_skipped_total",
        "Blocks that arrived undecodable and were stepped over."
    );
    describe_counter!(
        "monitor_transactions_recorded_total",
        "Watched transactions persisted, by kind."
    );
    describe_counter!(
        "monitor_transactions_skipped_total",
        "Transactions dropped for malformed fields."
    );
    describe_counter!("monitor_alerts_total", "Alert evaluations by outcome.");
    describe_counter!("monitor_rpc_calls_total", "Chain node calls by method and result.");
    describe_counter!("monitor_quote_refresh_total", "Quote refresh attempts by result.");
    describe_counter!("monitor_tick_failures_total", "Scan ticks that ended in backoff.");
    describe_gauge!("monitor_cursor_height", "Highest fully committed block height.");
    describe_gauge!("monitor_chain_tip", "Chain tip observed at the last tick.");
    describe_gauge!("monitor_base_fee", "Base fee of the last processed block.");
    describe_histogram!(
        "monitor_tick_seconds",
        Unit::Seconds,
        "Wall time of successful scan ticks."
    );
}

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("invalid log filter: {0}")]
    InvalidLogFilter(String),
    #[error("failed to install tracing subscriber: {0}")]
    Tracing(String),
    #[error("invalid metrics address `{0}`: {1}")]
    InvalidMetricsAddress(String, String),
    #[error("failed to install metrics recorder: {0}")]
    Metrics(String),
    #[error("metrics listener requires a running tokio runtime")]
    NoRuntime,
}
