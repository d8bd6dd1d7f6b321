//! Bounded exponential backoff for store operations

use super::error::StoreError;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    current_attempt: u32,
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration, retries: u32) -> Self {
        Self {
            initial_delay: initial,
            max_delay: max,
            max_retries: retries,
            current_attempt: 0,
        }
    }

    /// Backoff allowing `max_attempts` total tries (so `max_attempts - 1` sleeps)
    pub fn for_attempts(initial: Duration, max_attempts: u32) -> Self {
        Self::new(initial, Duration::from_secs(30), max_attempts.saturating_sub(1))
    }

    /// Delay before retry number `retry` (0-based): initial * 2^retry, capped
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2_u32.checked_pow(retry).unwrap_or(u32::MAX);
        std::cmp::min(self.initial_delay.saturating_mul(factor), self.max_delay)
    }

    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if self.current_attempt >= self.max_retries {
            return Err(MaxRetriesExceeded);
        }

        let delay = self.delay_for(self.current_attempt);

        log::warn!(
            "⏳ Retry attempt {} of {} in {}ms",
            self.current_attempt + 1,
            self.max_retries,
            delay.as_millis()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Final failure of a retried operation
#[derive(Debug)]
pub struct RetryError {
    /// Attempts made, first try included
    pub attempts: u32,
    /// Last underlying error
    pub source: StoreError,
}

/// Run `op` until it succeeds, fails terminally, or the backoff runs out
///
/// Only `StoreError::Transient` is retried; every other error returns at once.
pub async fn retry_transient<T, F, Fut>(
    operation: &str,
    mut backoff: ExponentialBackoff,
    mut op: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;

        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() => {
                log::warn!("⚠️  {} failed on attempt {}: {}", operation, attempts, err);
                if backoff.sleep().await.is_err() {
                    return Err(RetryError {
                        attempts,
                        source: err,
                    });
                }
            }
            Err(err) => {
                return Err(RetryError {
                    attempts,
                    source: err,
                })
            }
        }
    }
}
