use chrono::{DateTime, Utc};
use moka::sync::Cache;

/// Exchange rate of the native asset in a quote currency.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub currency: String,
    pub price: f64,
    pub fetched_at: DateTime<Utc>,
}

impl Quote {
    pub fn new(currency: impl Into<String>, price: f64, fetched_at: DateTime<Utc>) -> Self {
        let mut currency = currency.into();
        currency.make_ascii_lowercase();
        Self {
            currency,
            price,
            fetched_at,
        }
    }
}

/// Trait describing the last-known-good quote store.
pub trait QuoteCache: Send + Sync {
    /// Returns the last successful quote for `currency`, however old.
    fn latest(&self, currency: &str) -> Option<Quote>;

    /// Replaces the cached quote for the quote's currency.
    fn store(&self, quote: Quote);
}

/// Keeps quotes with no expiry: a stale quote is preferred over none.
#[derive(Debug)]
pub struct InMemoryQuoteCache {
    quotes: Cache<String, Quote>,
}

impl InMemoryQuoteCache {
    pub const DEFAULT_CAPACITY: u64 = 64;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: u64) -> Self {
        Self {
            quotes: Cache::builder().max_capacity(capacity.max(1)).build(),
        }
    }
}

impl Default for InMemoryQuoteCache {
    fn default() -> Self {
        Self::new()
    }
}

impl QuoteCache for InMemoryQuoteCache {
    fn latest(&self, currency: &str) -> Option<Quote> {
        self.quotes.get(&currency.to_ascii_lowercase())
    }

    fn store(&self, quote: Quote) {
        self.quotes.insert(quote.currency.clone(), quote);
    }
}
