//! Bounded retry with exponential backoff for external lookups.

use crate::error::LookupError;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `failures` (1-based): `base * 2^(failures-1)`,
    /// capped at `max_delay`.
    pub fn backoff(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Runs `operation` until it succeeds, fails with a non-retriable error,
    /// or the attempt budget is spent. Returns the last error in the latter
    /// two cases.
    pub async fn run<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T, LookupError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LookupError>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut failures = 0;

        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retriable() && failures + 1 < max_attempts => {
                    failures += 1;
                    let delay = self.backoff(failures);
                    debug!(what, attempt = failures, ?delay, error = %err, "Retrying lookup");
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
        assert_eq!(policy.backoff(10), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn retries_transient_failures_within_budget() {
        let calls = AtomicU32::new(0);
        let result = fast()
            .run("character", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LookupError::Timeout)
                } else {
                    Ok("Pilot")
                }
            })
            .await;

        assert_eq!(result, Ok("Pilot"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run("corporation", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LookupError::Http { status: 502 })
            })
            .await;

        assert_eq!(result, Err(LookupError::Http { status: 502 }));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn not_found_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast()
            .run("alliance", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(LookupError::NotFound)
            })
            .await;

        assert_eq!(result, Err(LookupError::NotFound));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
