//! Exponential backoff retry for network operations.
//!
//! Every remote call goes through [`with_retry`]. A failed attempt is retried
//! only when [`ScoutError::is_retryable`](crate::error::ScoutError::is_retryable) says so; the delay before retry
//! number `n` is `base_delay * 2^(n-1)` with no jitter and no cap, so three
//! attempts at a one second base wait 1s then 2s.

use std::future::Future;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{error, warn};

use crate::config::ScoutConfig;
use crate::error::ScoutResult;

/// Attempt budget for one logical call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Values below 1 are treated as 1.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles afterwards.
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &ScoutConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.retry_base_delay_ms),
        )
    }

    /// Delay slept after failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay.saturating_mul(1u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// the attempt budget is spent. The last error is returned unchanged.
///
/// `operation` receives the 1-based attempt number.
pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, label: &str, mut operation: F) -> ScoutResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = ScoutResult<T>>,
{
    let max = policy.max_attempts.max(1);
    let total_t0 = Instant::now();
    let mut attempt = 1u32;

    loop {
        let attempt_t0 = Instant::now();
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) => {
                let attempt_dt = attempt_t0.elapsed();
                let total_dt = total_t0.elapsed();

                if attempt >= max || !e.is_retryable() {
                    error!(
                        label,
                        attempt,
                        max,
                        retryable = e.is_retryable(),
                        elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                        elapsed_ms_total = total_dt.as_millis() as u64,
                        error = %e,
                        "call failed; giving up"
                    );
                    return Err(e);
                }

                let delay = policy.delay_for(attempt);
                warn!(
                    label,
                    attempt,
                    max,
                    elapsed_ms_attempt = attempt_dt.as_millis() as u64,
                    elapsed_ms_total = total_dt.as_millis() as u64,
                    ?delay,
                    error = %e,
                    "attempt failed; backing off"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
