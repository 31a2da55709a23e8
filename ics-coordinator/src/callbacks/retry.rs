//! Callback retry policies
//!
//! Retries are scoped to a single callback, never to a whole fan-out.
//!
//! **Policies:**
//! - `None`: one attempt
//! - `FixedDelay`: `retries` re-attempts, `delay` apart
//! - `Backoff`: `retries` re-attempts, delay doubling from `base`

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryPolicy {
    None,
    FixedDelay { retries: u32, delay: Duration },
    Backoff { retries: u32, base: Duration },
}

impl RetryPolicy {
    /// Re-attempts allowed after the first call
    pub fn max_retries(&self) -> u32 {
        match self {
            RetryPolicy::None => 0,
            RetryPolicy::FixedDelay { retries, .. } | RetryPolicy::Backoff { retries, .. } => *retries,
        }
    }

    /// Delay before re-attempt number `retry` (1-based)
    pub fn delay_before(&self, retry: u32) -> Duration {
        match self {
            RetryPolicy::None => Duration::ZERO,
            RetryPolicy::FixedDelay { delay, .. } => *delay,
            RetryPolicy::Backoff { base, .. } => {
                let exponent = retry.saturating_sub(1).min(16);
                base.saturating_mul(1 << exponent)
            }
        }
    }
}

/// Run `operation` until it succeeds or `policy` is exhausted.
///
/// Returns the last error once every attempt failed.
pub async fn retry<F, Fut, T, E>(operation_name: &str, policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_retries = policy.max_retries();
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::debug!(operation = operation_name, attempt = attempt + 1, "Callback succeeded after retry");
                }
                return Ok(result);
            }
            Err(err) => {
                if attempt >= max_retries {
                    return Err(err);
                }
                attempt += 1;

                let delay = policy.delay_before(attempt);
                tracing::debug!(
                    operation = operation_name,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Callback failed, will retry after delay"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_delays_double() {
        let policy = RetryPolicy::Backoff {
            retries: 3,
            base: Duration::from_secs(1),
        };
        assert_eq!(policy.delay_before(1), Duration::from_secs(1));
        assert_eq!(policy.delay_before(2), Duration::from_secs(2));
        assert_eq!(policy.delay_before(3), Duration::from_secs(4));
    }

    #[tokio::test]
    async fn test_succeeds_first_attempt() {
        let result = retry("test_op", &RetryPolicy::None, || async { Ok::<i32, String>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::FixedDelay {
            retries: 3,
            delay: Duration::from_millis(1),
        };

        let result = retry("test_op", &policy, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("refused".to_string())
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_retries() {
        let attempts = AtomicU32::new(0);
        let policy = RetryPolicy::Backoff {
            retries: 3,
            base: Duration::from_millis(1),
        };

        let result: Result<(), String> = retry("test_op", &policy, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("refused".to_string()) }
        })
        .await;

        assert_eq!(result.unwrap_err(), "refused");
        // First call plus three retries
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_no_retry_policy_single_attempt() {
        let attempts = AtomicU32::new(0);
        let result: Result<(), String> = retry("test_op", &RetryPolicy::None, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err("refused".to_string()) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
