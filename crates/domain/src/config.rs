//! Environment-driven configuration structures shared by all binaries.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::model::FeeUnit;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(12);
pub const DEFAULT_QUOTE_REFRESH_INTERVAL: Duration = Duration::from_secs(300);
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_BACKOFF_INITIAL: Duration = Duration::from_millis(1_000);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(60);
pub const DEFAULT_QUOTE_API_URL: &str = "https://api.coingecko.com/api/v3/simple/price";
pub const DEFAULT_QUOTE_ASSET_ID: &str = "ethereum";
pub const DEFAULT_QUOTE_CURRENCY: &str = "usd";

/// Scan loop configuration derived from `.env`/process variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorConfig {
    database_url: String,
    chain_rpc_url: String,
    start_height: Option<u64>,
    poll_interval: Duration,
    call_timeout: Duration,
    backoff_initial: Duration,
    backoff_max: Duration,
    quote: QuoteConfig,
    fee_unit: FeeUnit,
    dispatcher: DispatcherConfig,
}

/// Where the informational price quote comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuoteConfig {
    pub api_url: String,
    pub asset_id: String,
    pub currency: String,
    pub refresh_interval: Duration,
}

/// Notification channel credentials. A missing webhook falls back to the
/// log-only dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DispatcherConfig {
    pub webhook_url: Option<String>,
    pub webhook_token: Option<String>,
}

impl MonitorConfig {
    /// Loads configuration by hydrating `.env` (if present) and reading the
    /// process variables. Missing or malformed entries surface as
    /// `ConfigError` so the binary can refuse to start.
    pub fn load_from_env() -> Result<Self, ConfigError> {
        hydrate_env_file()?;

        let backoff_initial =
            get_duration_millis("MONITOR_BACKOFF_INITIAL_MS", DEFAULT_BACKOFF_INITIAL)?;
        let backoff_max = get_duration_secs("MONITOR_BACKOFF_MAX_SECS", DEFAULT_BACKOFF_MAX)?;

        Ok(Self {
            database_url: get_required_var("DATABASE_URL")?,
            chain_rpc_url: get_required_var("CHAIN_RPC_URL")?,
            start_height: get_number("MONITOR_START_HEIGHT")?,
            poll_interval: get_duration_secs("MONITOR_POLL_INTERVAL_SECS", DEFAULT_POLL_INTERVAL)?,
            call_timeout: get_duration_secs("MONITOR_CALL_TIMEOUT_SECS", DEFAULT_CALL_TIMEOUT)?,
            backoff_initial,
            backoff_max: backoff_max.max(backoff_initial),
            quote: QuoteConfig {
                api_url: get_optional_var("QUOTE_API_URL")
                    .unwrap_or_else(|| DEFAULT_QUOTE_API_URL.to_string()),
                asset_id: get_optional_var("QUOTE_ASSET_ID")
                    .unwrap_or_else(|| DEFAULT_QUOTE_ASSET_ID.to_string()),
                currency: get_optional_var("QUOTE_CURRENCY")
                    .map(|value| value.to_ascii_lowercase())
                    .unwrap_or_else(|| DEFAULT_QUOTE_CURRENCY.to_string()),
                refresh_interval: get_duration_secs(
                    "QUOTE_REFRESH_INTERVAL_SECS",
                    DEFAULT_QUOTE_REFRESH_INTERVAL,
                )?,
            },
            fee_unit: match get_optional_var("FEE_DISPLAY_UNIT") {
                Some(raw) => FeeUnit::from_str(&raw).map_err(|_| ConfigError::InvalidUnit {
                    key: "FEE_DISPLAY_UNIT",
                    value: raw,
                })?,
                None => FeeUnit::default(),
            },
            dispatcher: DispatcherConfig {
                webhook_url: get_optional_var("DISPATCH_WEBHOOK_URL"),
                webhook_token: get_optional_var("DISPATCH_WEBHOOK_TOKEN"),
            },
        })
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    pub fn chain_rpc_url(&self) -> &str {
        &self.chain_rpc_url
    }

    pub fn start_height(&self) -> Option<u64> {
        self.start_height
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    pub fn backoff_initial(&self) -> Duration {
        self.backoff_initial
    }

    pub fn backoff_max(&self) -> Duration {
        self.backoff_max
    }

    pub fn quote(&self) -> &QuoteConfig {
        &self.quote
    }

    pub fn fee_unit(&self) -> FeeUnit {
        self.fee_unit
    }

    pub fn dispatcher(&self) -> &DispatcherConfig {
        &self.dispatcher
    }
}

fn get_required_var(key: &'static str) -> Result<String, ConfigError> {
    get_optional_var(key).ok_or(ConfigError::MissingVar { key })
}

fn get_optional_var(key: &'static str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn get_number(key: &'static str) -> Result<Option<u64>, ConfigError> {
    get_optional_var(key)
        .map(|value| {
            value
                .parse()
                .map_err(|source| ConfigError::InvalidNumber { key, source })
        })
        .transpose()
}

fn get_duration_secs(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match get_number(key)? {
        Some(0) => Err(ConfigError::ZeroDuration { key }),
        Some(secs) => Ok(Duration::from_secs(secs)),
        None => Ok(default),
    }
}

fn get_duration_millis(key: &'static str, default: Duration) -> Result<Duration, ConfigError> {
    match get_number(key)? {
        Some(0) => Err(ConfigError::ZeroDuration { key }),
        Some(millis) => Ok(Duration::from_millis(millis)),
        None => Ok(default),
    }
}

pub fn hydrate_env_file() -> Result<(), ConfigError> {
    if env::var_os("WHALEWATCH_SKIP_DOTENV").is_some() {
        return Ok(());
    }
    match dotenvy::dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => return Err(ConfigError::Dotenv { source: err }),
    }

    Ok(())
}

/// Errors emitted when `.env` hydration or environment parsing fails.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable `{key}`")]
    MissingVar { key: &'static str },
    #[error("invalid integer in `{key}`: {source}")]
    InvalidNumber {
        key: &'static str,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("`{key}` must be greater than zero")]
    ZeroDuration { key: &'static str },
    #[error("unknown unit `{value}` in `{key}`")]
    InvalidUnit { key: &'static str, value: String },
    #[error("failed to load .env file: {source}")]
    Dotenv {
        #[from]
        source: dotenvy::Error,
    },
}
