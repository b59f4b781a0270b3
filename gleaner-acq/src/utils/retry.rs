//! Bounded retry helpers
//!
//! Two flavors share one backoff curve (10ms doubling, capped at 1000ms):
//! - [`retry_on_lock`]: SQLite writes, retried only on "database is locked"
//!   until a wall-clock budget is spent.
//! - [`retry_with_timeout`]: external interactions (automation surface, image
//!   downloads), each attempt bounded by a timeout, retried a fixed number of
//!   times on retryable errors.

use gleaner_common::{Error, Result};
use std::future::Future;
use std::time::{Duration, Instant};

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

fn next_backoff(current_ms: u64) -> u64 {
    (current_ms * 2).min(MAX_BACKOFF_MS)
}

fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => db_err.to_string().contains("database is locked"),
        _ => false,
    }
}

/// Retry a database operation while SQLite reports a lock, up to `max_wait_ms`
///
/// Non-lock errors are returned immediately.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let budget = Duration::from_millis(max_wait_ms);
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Database operation succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_lock_error(&err) {
            return Err(err);
        }

        let elapsed = started.elapsed();
        if elapsed >= budget {
            tracing::error!(
                operation = operation_name,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                max_wait_ms,
                "Database still locked, giving up"
            );
            return Err(Error::Internal(format!(
                "{}: database locked after {} attempts ({} ms)",
                operation_name,
                attempt,
                elapsed.as_millis()
            )));
        }

        tracing::warn!(
            operation = operation_name,
            attempt,
            backoff_ms,
            "Database locked, retrying"
        );
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = next_backoff(backoff_ms);
    }
}

/// Errors that can drive [`retry_with_timeout`]
pub trait Retryable: Sized {
    /// Whether another attempt may succeed
    fn is_retryable(&self) -> bool;

    /// Error reported when a single attempt exceeds its timeout
    fn timed_out(operation: &str, after: Duration) -> Self;
}

/// Run `operation` up to `retries + 1` times, each attempt bounded by `timeout`
///
/// Timeouts count as retryable failures. A non-retryable error is returned
/// at once; otherwise the last error is returned after the final attempt.
pub async fn retry_with_timeout<F, Fut, T, E>(
    operation_name: &str,
    retries: u32,
    timeout: Duration,
    mut operation: F,
) -> std::result::Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let attempts = retries.saturating_add(1);
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        let err = match tokio::time::timeout(timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) => err,
            Err(_) => E::timed_out(operation_name, timeout),
        };

        if !err.is_retryable() || attempt >= attempts {
            if attempt > 1 {
                tracing::warn!(
                    operation = operation_name,
                    attempt,
                    error = %err,
                    "Giving up after retries"
                );
            }
            return Err(err);
        }

        tracing::warn!(
            operation = operation_name,
            attempt,
            max_attempts = attempts,
            backoff_ms,
            error = %err,
            "Operation failed, retrying"
        );
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = next_backoff(backoff_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, PartialEq)]
    enum TestError {
        Transient,
        Permanent,
        Timeout,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{:?}", self)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            !matches!(self, TestError::Permanent)
        }

        fn timed_out(_operation: &str, _after: Duration) -> Self {
            TestError::Timeout
        }
    }

    #[test]
    fn test_backoff_caps() {
        assert_eq!(next_backoff(10), 20);
        assert_eq!(next_backoff(600), 1000);
        assert_eq!(next_backoff(1000), 1000);
    }

    #[tokio::test]
    async fn test_retry_on_lock_passes_through_other_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<()> = retry_on_lock("test_op", 5000, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::NotFound("row".into()))
            }
        })
        .await;

        assert!(matches!(result, Err(Error::NotFound(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_with_timeout_recovers_from_transient() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = retry_with_timeout("flaky", 3, Duration::from_secs(1), || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(TestError::Transient)
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_with_timeout_stops_on_permanent() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: std::result::Result<(), TestError> =
            retry_with_timeout("broken", 5, Duration::from_secs(1), || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Permanent)
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Permanent));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_with_timeout_bounds_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: std::result::Result<(), TestError> =
            retry_with_timeout("slow", 1, Duration::from_millis(20), || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    Ok(())
                }
            })
            .await;

        assert_eq!(result, Err(TestError::Timeout));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
