use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bigdecimal::RoundingMode;
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use whalewatch_domain::config::DispatcherConfig;
use whalewatch_domain::model::{Direction, OwnerId, TransactionRecord, TxKind, WatchedAddress};

/// Message body delivered to a registrant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlertPayload {
    pub owner_id: OwnerId,
    pub contact: String,
    pub display_name: String,
    pub address: String,
    pub direction: Direction,
    pub tx_hash: String,
    pub kind: TxKind,
    pub block_height: u64,
    /// Native amount, four decimal places.
    pub value: String,
    pub value_quote: Option<f64>,
    pub quote_currency: Option<String>,
    pub counterparty: Option<String>,
}

impl AlertPayload {
    pub fn new(
        entry: &WatchedAddress,
        direction: Direction,
        tx: &TransactionRecord,
        quote_currency: Option<&str>,
    ) -> Self {
        let counterparty = match direction {
            Direction::Outgoing => tx.to.as_ref().map(|addr| addr.to_string()),
            Direction::Incoming => Some(tx.from.to_string()),
        };
        Self {
            owner_id: entry.owner_id,
            contact: entry.contact.clone(),
            display_name: entry.display_name.clone(),
            address: entry.address.to_string(),
            direction,
            tx_hash: tx.hash.clone(),
            kind: tx.kind,
            block_height: tx.block_height,
            value: tx
                .value
                .to_ether()
                .with_scale_round(4, RoundingMode::HalfUp)
                .to_string(),
            value_quote: tx.value_quote,
            quote_currency: tx
                .value_quote
                .and(quote_currency)
                .map(str::to_ascii_uppercase),
            counterparty,
        }
    }

    pub fn subject(&self) -> String {
        format!(
            "{} {} {} ETH ({})",
            self.display_name, self.direction, self.value, self.tx_hash
        )
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("dispatch transport failed: {0}")]
    Transport(String),
    #[error("dispatch rejected with status {0}")]
    Rejected(u16),
    #[error("dispatch timed out")]
    Timeout,
}

impl From<tokio::time::error::Elapsed> for DispatchError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        Self::Timeout
    }
}

impl From<reqwest::Error> for DispatchError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(value.to_string())
        }
    }
}

/// Delivery channel for registrant alerts.
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    async fn send(&self, contact: &str, payload: &AlertPayload) -> Result<(), DispatchError>;
}

#[derive(Serialize)]
struct WebhookBody<'a> {
    contact: &'a str,
    subject: String,
    alert: &'a AlertPayload,
}

/// POSTs each alert as JSON; anything other than a 2xx is a failure.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
    token: Option<String>,
}

impl WebhookDispatcher {
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, DispatchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            token,
        })
    }
}

#[async_trait]
impl NotificationDispatcher for WebhookDispatcher {
    async fn send(&self, contact: &str, payload: &AlertPayload) -> Result<(), DispatchError> {
        let body = WebhookBody {
            contact,
            subject: payload.subject(),
            alert: payload,
        };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let status = request.send().await?.status();
        if !status.is_success() {
            return Err(DispatchError::Rejected(status.as_u16()));
        }
        Ok(())
    }
}

/// Writes alerts to the log only. Used when no webhook is configured.
#[derive(Debug, Default)]
pub struct LogDispatcher;

#[async_trait]
impl NotificationDispatcher for LogDispatcher {
    async fn send(&self, contact: &str, payload: &AlertPayload) -> Result<(), DispatchError> {
        info!(
            contact,
            tx_hash = %payload.tx_hash,
            direction = %payload.direction,
            value = %payload.value,
            "{}",
            payload.subject()
        );
        Ok(())
    }
}

pub fn build_dispatcher(
    config: &DispatcherConfig,
    timeout: Duration,
) -> Result<Arc<dyn NotificationDispatcher>, DispatchError> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookDispatcher::new(
            url.clone(),
            config.webhook_token.clone(),
            timeout,
        )?)),
        None => Ok(Arc::new(LogDispatcher)),
    }
}
