//! Exponential backoff retry utility
//!
//! Attempts are numbered from 1. The delay slept after a failed attempt `n`
//! is `base * 2^(n-1)`, optionally capped and jittered; nothing is slept
//! before the first attempt or after the last one.
//!
//! # Examples
//!
//! ```
//! use catalog_gateway_core::retry::{retry_with_backoff, RetryPolicy};
//!
//! async fn fallible_operation(attempt: u32) -> Result<String, std::io::Error> {
//!     Ok(format!("succeeded on attempt {}", attempt))
//! }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let result = retry_with_backoff(
//!     |attempt| fallible_operation(attempt),
//!     RetryPolicy::default(),
//!     |err: &std::io::Error| err.kind() == std::io::ErrorKind::ConnectionRefused,
//! )
//! .await?;
//! # Ok(())
//! # }
//! ```

use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration for exponential backoff
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one (minimum 1)
    pub max_attempts: u32,

    /// Delay in milliseconds after the first failed attempt
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds to cap exponential growth
    pub max_delay_ms: u64,

    /// Whether to add up to 30% random jitter to each delay
    pub jitter: bool,
}

impl Default for RetryPolicy {
    /// - max_attempts: 3
    /// - base_delay_ms: 1000
    /// - max_delay_ms: 30000
    /// - jitter: false
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// Creates a new retry policy with custom parameters
    ///
    /// ```
    /// use catalog_gateway_core::retry::RetryPolicy;
    ///
    /// let policy = RetryPolicy::new(5, 200, 10000, true);
    /// assert_eq!(policy.max_attempts, 5);
    /// assert_eq!(policy.base_delay_ms, 200);
    /// ```
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64, jitter: bool) -> Self {
        Self {
            max_attempts,
            base_delay_ms,
            max_delay_ms,
            jitter,
        }
    }

    /// Deterministic doubling backoff with no cap beyond `u64` saturation
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: base_delay.as_millis() as u64,
            max_delay_ms: u64::MAX,
            jitter: false,
        }
    }

    /// Delay to sleep after failed attempt number `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let exponential_delay = self
            .base_delay_ms
            .saturating_mul(2_u64.saturating_pow(exponent));

        let capped_delay = exponential_delay.min(self.max_delay_ms);

        let final_delay = if self.jitter {
            let jitter_range = (capped_delay as f64 * 0.3) as u64;
            let jitter = if jitter_range > 0 {
                rand::thread_rng().gen_range(0..=jitter_range)
            } else {
                0
            };
            capped_delay.saturating_add(jitter)
        } else {
            capped_delay
        };

        Duration::from_millis(final_delay)
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Retries an async operation with exponential backoff
///
/// `operation` receives the 1-based attempt number. Only errors for which
/// `is_retryable` returns true trigger another attempt; the last observed
/// error is returned once the attempt budget is spent.
pub async fn retry_with_backoff<F, Fut, T, E, P>(
    mut operation: F,
    policy: RetryPolicy,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: Fn(&E) -> bool,
{
    let max_attempts = policy.attempts();
    let mut attempt = 1;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                tracing::debug!(attempt = attempt, "Operation succeeded");
                return Ok(result);
            }
            Err(error) => {
                if !is_retryable(&error) {
                    tracing::debug!(
                        attempt = attempt,
                        "Error is not retryable, failing immediately"
                    );
                    return Err(error);
                }

                if attempt >= max_attempts {
                    tracing::warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        "All retry attempts exhausted"
                    );
                    return Err(error);
                }

                let delay = policy.delay_after(attempt);
                tracing::debug!(
                    attempt = attempt,
                    delay_ms = delay.as_millis() as u64,
                    max_attempts = max_attempts,
                    "Retrying after delay"
                );

                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
