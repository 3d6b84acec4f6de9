//! Timeout and backoff for remote calls.

use crate::error::{MetricsError, MetricsResult};
use rand::Rng;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Longest wait between attempts. A rate-limit hint beyond it is not waited
/// out; the error surfaces with the hint attached.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, Debug)]
pub struct RetryPolicy {
    pub max_retries: u32,
    /// Applied to every attempt separately.
    pub timeout: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, timeout: Duration) -> Self {
        Self {
            max_retries,
            timeout,
        }
    }

    /// Runs `call` until it succeeds, fails with a non-retryable error, or
    /// runs out of retries. A timed-out attempt is fatal.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> MetricsResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = MetricsResult<T>>,
    {
        let mut retries = 0;

        loop {
            let result = match tokio::time::timeout(self.timeout, call()).await {
                Ok(result) => result,
                Err(_) => {
                    return Err(MetricsError::Timeout {
                        operation: operation.to_string(),
                        after: self.timeout,
                    })
                }
            };

            match result {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && retries < self.max_retries && !waits_too_long(&e) => {
                    retries += 1;
                    let backoff = backoff_for(&e, retries);

                    warn!(
                        operation,
                        error = %e,
                        retry = retries,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        "retrying request"
                    );

                    tokio::time::sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn waits_too_long(error: &MetricsError) -> bool {
    matches!(
        error,
        MetricsError::RateLimited { retry_after: Some(retry_after) } if *retry_after > MAX_BACKOFF
    )
}

/// Wait hinted by a rate-limited response.
///
/// `Retry-After` (delta seconds) wins. Otherwise, once `x-ratelimit-remaining`
/// hits zero, the wait runs until the `x-ratelimit-reset` epoch.
pub(crate) fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    if let Some(seconds) = header_u64(headers, RETRY_AFTER.as_str()) {
        return Some(Duration::from_secs(seconds));
    }
    if header_u64(headers, "x-ratelimit-remaining") == Some(0) {
        let reset = header_u64(headers, "x-ratelimit-reset")?;
        let now = chrono::Utc::now().timestamp().max(0) as u64;
        return Some(Duration::from_secs(reset.saturating_sub(now)));
    }
    None
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

fn backoff_for(error: &MetricsError, retries: u32) -> Duration {
    match error {
        MetricsError::RateLimited {
            retry_after: Some(retry_after),
        } => {
            let base_ms = (*retry_after).min(MAX_BACKOFF).as_millis() as u64;
            let jitter_factor: f64 = rand::thread_rng().gen_range(0.9_f64..=1.1_f64);
            let jittered_ms = ((base_ms as f64) * jitter_factor).round() as u64;
            Duration::from_millis(jittered_ms.max(100))
        }
        _ => {
            let base_backoff = Duration::from_secs(1 << retries.min(5)).min(MAX_BACKOFF);
            let jittered_ms = rand::thread_rng().gen_range(0..=base_backoff.as_millis() as u64);
            Duration::from_millis(jittered_ms.max(10))
        }
    }
}
