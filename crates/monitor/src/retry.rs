use std::future::Future;
use std::time::Duration;

use tokio::time::error::Elapsed;

/// Runs `fut` with an upper bound on its duration, folding a timeout into
/// the caller's error type.
pub async fn bounded<T, E, F>(limit: Duration, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: From<Elapsed>,
{
    tokio::time::timeout(limit, fut).await?
}

const MIN_BACKOFF: Duration = Duration::from_millis(1);

/// Exponential backoff: doubles from `initial` up to `max`, back to
/// `initial` after [`Backoff::reset`]. Never yields a zero delay.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        let initial = initial.max(MIN_BACKOFF);
        let max = max.max(initial);
        Self {
            initial,
            max,
            current: initial,
        }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
