//! Fixed-delay retry policy
//!
//! Wraps an async operation and re-runs it on failure after a constant delay,
//! up to a fixed number of attempts. The final failure is returned to the
//! caller unchanged.

use crate::config::RetryConfig;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy with a constant inter-attempt delay
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; an attempt ceiling of zero still runs the operation once
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.attempts, Duration::from_millis(config.delay_ms))
    }

    /// Execute an async operation with retry logic
    ///
    /// Worst-case added latency is `(attempts - 1) * delay`; no sleep follows
    /// the final attempt.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1u32;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) if attempt >= self.attempts => {
                    warn!(attempts = attempt, error = %err, "Retries exhausted");
                    return Err(err);
                }
                Err(err) => {
                    debug!(
                        attempt,
                        max_attempts = self.attempts,
                        delay_ms = self.delay.as_millis(),
                        error = %err,
                        "Retrying after failure"
                    );
                    tokio::time::sleep(self.delay).await;
                    attempt += 1;
                }
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}
