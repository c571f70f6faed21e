//! Retry policies for transient failures.
//!
//! The startup ticket fetch is retried a bounded number of times, a fixed
//! delay apart, and only while the failure is a network failure.
//!
//! # Example
//!
//! ```rust
//! use queuepass_runtime::retry::{RetryPolicy, retry_with_predicate};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::fixed(3, Duration::from_secs(1));
//!
//! let ticket = retry_with_predicate(
//!     policy,
//!     || async { Ok::<_, String>("WAITING") },
//!     |err: &String| err.starts_with("network"),
//! )
//! .await?;
//! # let _ = ticket;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Retry policy configuration.
///
/// The default is three retries one second apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first call
    pub max_retries: usize,
    /// Pause before every retry
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_secs(1))
    }
}

impl RetryPolicy {
    /// Policy that waits the same `delay` before every retry.
    #[must_use]
    pub const fn fixed(max_retries: usize, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

/// Retry an async operation while `is_retryable` accepts the error.
///
/// Errors rejected by the predicate are returned immediately.
///
/// # Errors
///
/// Returns the first non-retryable error, or the final error when all
/// attempts fail.
pub async fn retry_with_predicate<F, Fut, T, E, P>(
    policy: RetryPolicy,
    mut operation: F,
    is_retryable: P,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(attempt, "Operation succeeded after retry");
                }
                return Ok(result);
            },
            Err(err) => {
                if !is_retryable(&err) {
                    tracing::debug!(error = %err, "Error is not retryable, failing immediately");
                    return Err(err);
                }

                if attempt >= policy.max_retries {
                    tracing::warn!(attempt, error = %err, "Operation failed after max retries");
                    return Err(err);
                }

                tracing::warn!(
                    attempt,
                    delay_ms = u64::try_from(policy.delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Operation failed, retrying"
                );

                sleep(policy.delay).await;
                attempt += 1;
            },
        }
    }
}
