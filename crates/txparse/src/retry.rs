//! Retry executor with capped exponential backoff.

use log::warn;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::error::TransportError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failure of attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_delay.min(self.max_delay);
        for _ in 1..attempt {
            delay = self.next_delay(delay);
        }
        delay
    }

    /// Saturates at `max_delay`, including when the product is not a
    /// representable duration.
    fn next_delay(&self, delay: Duration) -> Duration {
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff_factor.max(0.0))
            .map_or(self.max_delay, |d| d.min(self.max_delay))
    }
}

/// Errors that can tell a throttling failure apart from the rest.
pub trait Retryable {
    fn is_rate_limited(&self) -> bool;
}

impl Retryable for TransportError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, TransportError::RateLimited(_))
    }
}

/// Run `op` until it succeeds or `policy.max_attempts` is spent; the last
/// error is returned unchanged. No sleep follows the final attempt.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut delay = policy.initial_delay.min(policy.max_delay);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt >= max_attempts => return Err(e),
            Err(e) => {
                if e.is_rate_limited() {
                    warn!(
                        "{} rate_limited, backing off {}ms (attempt {}/{})",
                        label,
                        delay.as_millis(),
                        attempt,
                        max_attempts
                    );
                } else {
                    warn!(
                        "{} failed: {}, retrying in {}ms (attempt {}/{})",
                        label,
                        e,
                        delay.as_millis(),
                        attempt,
                        max_attempts
                    );
                }
                sleep(delay).await;
                delay = policy.next_delay(delay);
                attempt += 1;
            }
        }
    }
}
