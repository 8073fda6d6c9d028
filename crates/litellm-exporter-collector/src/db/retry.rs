//! Retry policy for query execution
//!
//! Applied per query call: every attempt is independent and gets its own
//! pooled connection.

use std::future::Future;
use std::time::Duration;

use litellm_exporter_common::QUERY_MAX_ATTEMPTS;
use tracing::{debug, warn};

use super::error::QueryError;

/// Exponential backoff with a capped number of attempts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
    /// Backoff multiplier (2.0 doubles the delay each time)
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: QUERY_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Single attempt, no retries
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO, 1.0)
    }

    /// Delay to wait after the given failed attempt (1-based)
    ///
    /// initial_delay * multiplier^(attempt - 1), capped at max_delay.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let delay_ms = (self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent))
            .min(self.max_delay.as_millis() as f64);
        Duration::from_millis(delay_ms.max(0.0) as u64)
    }

    /// Run `op` until it succeeds, fails with a non-retryable error, or
    /// the attempt budget is spent
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T, QueryError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, QueryError>>,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) if attempt >= self.max_attempts => {
                    warn!(operation, attempts = attempt, error = %err, "Retries exhausted");
                    return Err(if attempt == 1 {
                        err
                    } else {
                        QueryError::RetriesExhausted {
                            attempts: attempt,
                            last: Box::new(err),
                        }
                    });
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        operation,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Query attempt failed, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
