//! Bounded retry with exponential backoff
//!
//! Wraps a fallible async operation: retryable failures sleep
//! `base_delay * 2^attempt` and try again, anything else surfaces
//! immediately. The last failure is returned once attempts are exhausted.

use log::warn;
use std::future::Future;
use std::time::Duration;

/// Retry parameters.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Policy applied to remote-browser session creation: 3 attempts,
    /// 2s base delay (2s, then 4s between attempts).
    #[must_use]
    pub fn session_creation() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
        }
    }
}

/// Failure-message substrings considered transient by default.
const RETRYABLE_NEEDLES: &[&str] = &[
    "proxy",
    "timeout",
    "network",
    "connection refused",
    "etimedout",
];

/// Default retryable predicate: case-insensitive substring match against
/// the known transient failure markers.
#[must_use]
pub fn default_retryable(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_NEEDLES.iter().any(|needle| lower.contains(needle))
}

/// Run `op` under `policy`, retrying failures accepted by `retryable`.
///
/// Attempt `k` (0-indexed) sleeps `base_delay * 2^k` after a retryable
/// failure. Non-retryable failures and the final attempt's failure are
/// returned as-is.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: RetryPolicy,
    retryable: P,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let attempts = policy.max_attempts.max(1);
    for attempt in 0..attempts {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < attempts && retryable(&err) => {
                let delay = policy.base_delay * 2u32.pow(attempt);
                warn!(
                    "Attempt {}/{} failed ({err}); retrying in {delay:?}",
                    attempt + 1,
                    attempts
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
    unreachable!("retry loop always returns from its final attempt")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn quick_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay: Duration::from_millis(1),
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<u32, String> =
            retry_with_backoff(quick_policy(3), |e: &String| default_retryable(e), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result.expect("operation succeeds"), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn retries_transient_failures_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<&str, String> =
            retry_with_backoff(quick_policy(3), |e: &String| default_retryable(e), move || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err("connection refused by upstream".to_string())
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;
        assert_eq!(result.expect("third attempt succeeds"), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_failure_surfaces_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), String> =
            retry_with_backoff(quick_policy(3), |e: &String| default_retryable(e), move || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err("invalid api key".to_string())
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhaustion_returns_last_failure() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), String> =
            retry_with_backoff(quick_policy(3), |e: &String| default_retryable(e), move || {
                let counter = Arc::clone(&counter);
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    Err(format!("ETIMEDOUT attempt {n}"))
                }
            })
            .await;
        assert_eq!(result.expect_err("all attempts fail"), "ETIMEDOUT attempt 2");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn default_predicate_is_case_insensitive() {
        assert!(default_retryable("Proxy handshake failed"));
        assert!(default_retryable("request TIMEOUT after 30s"));
        assert!(default_retryable("ETIMEDOUT"));
        assert!(!default_retryable("401 unauthorized"));
    }
}
