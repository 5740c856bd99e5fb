//! Bounded retry with exponential backoff
//!
//! Used for the two remote operations that can fail transiently: opening the
//! database connection and uploading the archive. Everything else fails fast.
//!
//! ```rust,ignore
//! let policy = RetryPolicy::default();
//! let conn = execute_with_backoff(&policy, "connect", |_| connector.connect()).await?;
//! ```

use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{
    DEFAULT_RETRY_ATTEMPTS, DEFAULT_RETRY_BASE_DELAY_MS, DEFAULT_RETRY_MAX_DELAY_MS,
};

/// How many times to try and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_attempts: u32,
    /// Wait after failed attempt `n` is `base_delay * 2^n`, capped at `max_delay`
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_RETRY_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_RETRY_BASE_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_RETRY_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Retry without waiting
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO, Duration::ZERO)
    }

    /// Wait before the attempt following failed attempt `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// The last error once every attempt has failed
#[derive(Error, Debug)]
#[error("gave up after {attempts} attempts: {source}")]
pub struct RetryError<E>
where
    E: std::error::Error + 'static,
{
    pub attempts: u32,
    #[source]
    pub source: E,
}

/// Run `operation` until it succeeds or the policy's attempts are used up.
///
/// The closure receives the 1-based attempt number.
pub async fn execute_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    name: &str,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        debug!(operation = name, attempt, max_attempts, "Starting attempt");

        match operation(attempt).await {
            Ok(value) => {
                if attempt > 1 {
                    info!(operation = name, attempt, "Succeeded after retrying");
                }
                return Ok(value);
            },
            Err(e) if attempt < max_attempts => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = name,
                    attempt,
                    max_attempts,
                    error = %e,
                    "Attempt failed, retrying in {:?}",
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            },
            Err(e) => {
                warn!(operation = name, attempts = attempt, error = %e, "Giving up");
                return Err(RetryError {
                    attempts: attempt,
                    source: e,
                });
            },
        }
    }
}
