//! Monitor binary that tails an Ethereum node for whale-wallet activity.

use std::io;
use std::sync::Arc;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use whalewatch_domain::config::MonitorConfig;
use whalewatch_domain::services::telemetry::{init_telemetry, TelemetryConfig};
use whalewatch_domain::services::InMemoryQuoteCache;
use whalewatch_monitor::retry::bounded;
use whalewatch_monitor::rpc::ChainConnector;
use whalewatch_monitor::{
    build_dispatcher, spawn_refresher, CoinGeckoQuoteSource, JsonRpcConnector, MonitorError,
    Pipeline, PriceOracle, Scanner, ScannerSettings,
};
use whalewatch_storage::SeaOrmStorage;

/// Whale-wallet monitor
#[derive(Debug, Parser)]
#[command(name = "whalewatch-monitor")]
#[command(about = "Tail an Ethereum node and alert on large transfers touching watched wallets")]
struct Args {
    /// Overwrite the persisted cursor with this height before scanning
    #[arg(long, value_name = "HEIGHT")]
    reset_cursor: Option<u64>,
}

#[tokio::main]
async fn main() -> io::Result<()> {
    let args = Args::parse();
    if let Err(err) = bootstrap(args).await {
        eprintln!("[monitor] bootstrap failed: {err}");
        return Err(io::Error::other(err.to_string()));
    }

    Ok(())
}

async fn bootstrap(args: Args) -> Result<(), MonitorError> {
    let config = MonitorConfig::load_from_env()?;
    let telemetry_config = TelemetryConfig::from_env("MONITOR");
    let _telemetry = init_telemetry(&telemetry_config)?;

    let storage = SeaOrmStorage::builder()
        .database_url(config.database_url())
        .acquire_timeout(config.call_timeout())
        .build()
        .await?;

    let connector = JsonRpcConnector::new(config.chain_rpc_url(), config.call_timeout())?;
    let tip = bounded(config.call_timeout(), connector.tip_height()).await?;
    info!(tip, rpc = config.chain_rpc_url(), "chain node reachable");

    let quote_config = config.quote();
    let cache = Arc::new(InMemoryQuoteCache::default());
    let source = CoinGeckoQuoteSource::new(quote_config, config.call_timeout())?;
    let oracle = Arc::new(PriceOracle::new(
        Arc::new(source),
        cache,
        quote_config.currency.as_str(),
    ));
    if oracle.refresh().await.is_none() {
        warn!("no initial quote, values will be recorded without a quote");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let refresher = spawn_refresher(
        Arc::clone(&oracle),
        quote_config.refresh_interval,
        shutdown_rx.clone(),
    );

    let dispatcher = build_dispatcher(config.dispatcher(), config.call_timeout())?;
    let pipeline = Pipeline::new(
        dispatcher,
        oracle.handle(),
        config.fee_unit(),
        config.call_timeout(),
    );
    let scanner = Scanner::new(
        storage,
        connector,
        pipeline,
        ScannerSettings::from_config(&config),
    );

    let cursor = match args.reset_cursor {
        Some(height) => scanner.reset_cursor(height).await?,
        None => scanner.initial_cursor().await?,
    };

    let mut scan = tokio::spawn(async move { scanner.run(cursor, shutdown_rx).await });
    let result = tokio::select! {
        joined = &mut scan => joined,
        signal = tokio::signal::ctrl_c() => {
            if let Err(err) = signal {
                error!(error = %err, "failed to listen for ctrl-c");
            }
            info!("shutdown requested, finishing current block");
            let _ = shutdown_tx.send(true);
            scan.await
        }
    };
    let _ = shutdown_tx.send(true);
    let _ = refresher.await;

    let cursor = result.map_err(|err| MonitorError::Task(err.to_string()))??;
    info!(cursor = cursor.height(), "monitor stopped");
    Ok(())
}
