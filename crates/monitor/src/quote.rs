use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use metrics::counter;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use whalewatch_domain::config::QuoteConfig;
use whalewatch_domain::model::{display_value, Wei};
use whalewatch_domain::services::{Quote, QuoteCache};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum QuoteError {
    #[error("quote request failed: {0}")]
    Request(String),
    #[error("quote response missing {asset}/{currency}")]
    Missing { asset: String, currency: String },
    #[error("quote is not a usable price: {0}")]
    Invalid(f64),
}

impl From<reqwest::Error> for QuoteError {
    fn from(value: reqwest::Error) -> Self {
        Self::Request(value.to_string())
    }
}

/// Source of the native asset's price in the configured currency.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn fetch(&self, currency: &str) -> Result<f64, QuoteError>;
}

/// CoinGecko `simple/price` endpoint.
pub struct CoinGeckoQuoteSource {
    client: reqwest::Client,
    api_url: String,
    asset_id: String,
}

impl CoinGeckoQuoteSource {
    pub fn new(config: &QuoteConfig, timeout: Duration) -> Result<Self, QuoteError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            asset_id: config.asset_id.clone(),
        })
    }
}

#[async_trait]
impl QuoteSource for CoinGeckoQuoteSource {
    async fn fetch(&self, currency: &str) -> Result<f64, QuoteError> {
        let prices: HashMap<String, HashMap<String, f64>> = self
            .client
            .get(&self.api_url)
            .query(&[("ids", self.asset_id.as_str()), ("vs_currencies", currency)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        prices
            .get(&self.asset_id)
            .and_then(|by_currency| by_currency.get(currency))
            .copied()
            .ok_or_else(|| QuoteError::Missing {
                asset: self.asset_id.clone(),
                currency: currency.to_string(),
            })
    }
}

/// Refreshes the quote cache from a [`QuoteSource`]. A failed refresh keeps
/// whatever quote was cached before.
pub struct PriceOracle {
    source: Arc<dyn QuoteSource>,
    cache: Arc<dyn QuoteCache>,
    currency: String,
}

impl PriceOracle {
    pub fn new(
        source: Arc<dyn QuoteSource>,
        cache: Arc<dyn QuoteCache>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            source,
            cache,
            currency: currency.into().to_ascii_lowercase(),
        }
    }

    pub async fn refresh(&self) -> Option<Quote> {
        let fetched = self.source.fetch(&self.currency).await.and_then(|price| {
            if price.is_finite() && price >= 0.0 {
                Ok(price)
            } else {
                Err(QuoteError::Invalid(price))
            }
        });

        match fetched {
            Ok(price) => {
                let quote = Quote::new(self.currency.as_str(), price, Utc::now());
                self.cache.store(quote.clone());
                counter!("monitor_quote_refresh_total", "result" => "ok").increment(1);
                debug!(currency = %self.currency, price, "quote refreshed");
                Some(quote)
            }
            Err(err) => {
                counter!("monitor_quote_refresh_total", "result" => "error").increment(1);
                let retained = self.current();
                warn!(
                    error = %err,
                    retained_price = retained.as_ref().map(|q| q.price),
                    "quote refresh failed, keeping last known quote"
                );
                retained
            }
        }
    }

    pub fn current(&self) -> Option<Quote> {
        self.cache.latest(&self.currency)
    }

    pub fn handle(&self) -> QuoteHandle {
        QuoteHandle {
            cache: Arc::clone(&self.cache),
            currency: self.currency.clone(),
        }
    }
}

/// Read side of the quote cache handed to the scan loop.
#[derive(Clone)]
pub struct QuoteHandle {
    cache: Arc<dyn QuoteCache>,
    currency: String,
}

impl QuoteHandle {
    pub fn new(cache: Arc<dyn QuoteCache>, currency: impl Into<String>) -> Self {
        Self {
            cache,
            currency: currency.into().to_ascii_lowercase(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Value of `amount` in the quote currency, or `None` before the first
    /// successful refresh.
    pub fn value_of(&self, amount: &Wei) -> Option<f64> {
        let quote = self.cache.latest(&self.currency)?;
        Some(display_value(&amount.to_ether()) * quote.price)
    }
}

/// Refreshes on `interval` until `shutdown` flips to `true`.
pub fn spawn_refresher(
    oracle: Arc<PriceOracle>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The first tick fires immediately; the caller already refreshed once.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    oracle.refresh().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("quote refresher stopped");
    })
}
