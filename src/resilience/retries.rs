//! Bounded retries for secondary operations.
//!
//! The gateway never retries a client's request. This helper is for callers
//! doing their own follow-up work (a backend retrying a database call, a
//! readiness probe) where an error classified as transient, such as an
//! elapsed deadline, is worth another attempt. Validation failures and other
//! permanent errors return immediately.

use std::future::Future;
use std::time::Duration;

use crate::resilience::backoff::calculate_backoff;

/// How an error should be treated by [`retry_with_backoff`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Permanent,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out.
pub async fn retry_with_backoff<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    mut op: F,
    classify: C,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> ErrorClass,
    E: std::fmt::Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < max_attempts && classify(&e) == ErrorClass::Transient => {
                let delay = calculate_backoff(attempt, policy.base_delay, policy.max_delay);
                tracing::debug!(attempt, delay = ?delay, error = %e, "Retrying after transient error");
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Classifier treating only elapsed deadlines as transient.
pub fn deadline_is_transient(_: &tokio::time::error::Elapsed) -> ErrorClass {
    ErrorClass::Transient
}
