//! Retry classification (spec §4.4, §7): the Router retries on retryable transport
//! errors using exponential backoff up to `maxRetries`; it never retries on
//! validation, broker-reject, or (after a single refresh attempt) auth errors.

use crate::error::GatewayErrorKind;
use std::future::Future;
use std::time::Duration;

/// Mirrors spec §6: `broker.<kind>.maxRetries` (default 3),
/// `broker.<kind>.retryBaseDelay` (default 200 ms).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

/// Runs `attempt` until it succeeds, exhausts `max_retries`, or fails with a
/// non-retryable error. Backoff doubles each attempt, capped at `max_delay`, except a
/// `RateLimited` error with a `retry_after` honors that duration instead (spec §7).
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut attempt: F) -> Result<T, GatewayErrorKind>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayErrorKind>>,
{
    let mut delay = policy.base_delay;
    let mut tries = 0;
    loop {
        match attempt().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && tries < policy.max_retries => {
                tries += 1;
                let wait = match &err {
                    GatewayErrorKind::RateLimited {
                        retry_after: Some(retry_after),
                    } => (*retry_after).min(policy.max_delay),
                    _ => delay,
                };
                tracing::warn!(attempt = tries, delay_ms = wait.as_millis() as u64, "retrying after {err}");
                tokio::time::sleep(wait).await;
                delay = (delay * 2).min(policy.max_delay);
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_after_retryable_failures_within_budget() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        };
        let result = retry_with_backoff(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(GatewayErrorKind::transport(true, "timeout"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert!(matches!(result, Ok(42)));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn never_retries_validation_errors() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::default();
        let result: Result<(), GatewayErrorKind> = retry_with_backoff(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayErrorKind::validation("bad qty")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_rate_limited_errors_honoring_retry_after() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_millis(5),
        };
        let result = retry_with_backoff(&policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(GatewayErrorKind::RateLimited {
                        retry_after: Some(Duration::from_millis(1)),
                    })
                } else {
                    Ok(7)
                }
            }
        })
        .await;
        assert!(matches!(result, Ok(7)));
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn gives_up_after_max_retries_exhausted() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        };
        let result: Result<(), GatewayErrorKind> = retry_with_backoff(&policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(GatewayErrorKind::transport(true, "still down")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3); // initial + 2 retries
    }
}
