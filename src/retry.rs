use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::config::{MAX_RETRIES, RETRY_DELAY};

/// Linear backoff: after failed attempt `k` the wrapper sleeps `delay * k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: MAX_RETRIES,
            delay: RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn backoff(&self, attempt: usize) -> Duration {
        self.delay.saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }
}

// Saturates instead of truncating for delays past u64::MAX milliseconds.
fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

/// Runs `op` until it succeeds or `policy.max_attempts` attempts have failed, in which case the
/// last error is returned as-is.
pub async fn retry<T, E, F, Fut>(policy: RetryPolicy, what: &str, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: usize = 0;
    loop {
        attempt = attempt.saturating_add(1);
        match op().await {
            Ok(v) => return Ok(v),
            Err(err) if attempt < policy.max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    what,
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_ms = millis(delay),
                    error = %err,
                    "attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                warn!(what, attempt, error = %err, "giving up");
                return Err(err);
            }
        }
    }
}
