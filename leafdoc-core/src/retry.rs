//! Exponential backoff with jitter around fallible async operations.
//!
//! Every inference call goes through [`RetryExecutor::execute`]. The delay
//! before retry `i` is `base_delay * 2^i` plus uniform jitter in
//! `[0, max_jitter]`. The final failure is handed back untouched.
//!
//! Retried operations are not assumed idempotent; a call that reached the
//! upstream before failing may be repeated.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::config::{RetryConfig, RetryMode};
use crate::error::Result;

/// Retries an async operation with exponential backoff and jitter.
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    max_attempts: u32,
    base_delay: Duration,
    max_jitter: Duration,
    mode: RetryMode,
}

impl Default for RetryExecutor {
    fn default() -> Self {
        Self::new(&RetryConfig::default())
    }
}

impl RetryExecutor {
    pub fn new(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
            mode: config.mode,
        }
    }

    /// Maximum number of attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Deterministic part of the delay after failed attempt `attempt`.
    pub fn delay_floor(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Full delay after failed attempt `attempt`: floor plus jitter.
    pub fn delay(&self, attempt: u32) -> Duration {
        let jitter_ms = self.max_jitter.as_millis() as u64;
        let jitter = if jitter_ms == 0 {
            Duration::ZERO
        } else {
            Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms))
        };
        self.delay_floor(attempt).saturating_add(jitter)
    }

    /// Run `operation` until it succeeds or the attempt budget is spent.
    ///
    /// With [`RetryMode::All`] every error is retried. With
    /// [`RetryMode::TransientOnly`] a non-transient error is returned on the
    /// attempt that produced it.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::debug!(attempts = attempt + 1, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    let exhausted = attempt + 1 >= self.max_attempts;
                    let fatal = self.mode == RetryMode::TransientOnly && !err.is_transient();
                    if exhausted || fatal {
                        tracing::debug!(
                            attempts = attempt + 1,
                            exhausted,
                            error = %err,
                            "Giving up on operation"
                        );
                        return Err(err);
                    }

                    let delay = self.delay(attempt);
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
