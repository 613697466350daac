//! Bounded exponential backoff for feed requests

use std::future::Future;
use std::time::Duration;
use tracing::warn;
use vulnsync_common::RetryConfig;
use vulnsync_core::Result;

/// Retry policy for transient feed failures.
///
/// Only errors where [`Error::is_retryable`] holds are retried; everything
/// else (parse failures, storage errors) is returned on the first attempt.
///
/// [`Error::is_retryable`]: vulnsync_core::Error::is_retryable
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first
    pub max_attempts: u32,
    /// Delay before retry `n` is `multiplier * 2^(n-1)` seconds
    pub multiplier: f64,
    pub min_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            multiplier: 2.0,
            min_backoff: Duration::from_secs(5),
            max_backoff: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            multiplier: config.multiplier,
            min_backoff: Duration::from_secs(config.min_backoff_seconds),
            max_backoff: Duration::from_secs(config.max_backoff_seconds),
        }
    }

    /// Retry up to `max_attempts` times without sleeping in between
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            multiplier: 0.0,
            min_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (1-based), clamped to `[min, max]`
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63) as i32;
        let secs = self.multiplier * 2f64.powi(exponent);
        let min = self.min_backoff.as_secs_f64();
        let max = self.max_backoff.as_secs_f64().max(min);
        Duration::from_secs_f64(secs.max(min).min(max))
    }

    /// Run `op`, retrying transient failures with backoff.
    ///
    /// Returns the first success, the first non-retryable error, or the
    /// last error once attempts are exhausted.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        attempt,
                        max_attempts,
                        code = e.code(),
                        "Retrying NVD request in {:?} after attempt {} failed: {}",
                        delay,
                        attempt,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;
    use vulnsync_core::Error;

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy::default();
        let secs: Vec<u64> = (1..=8).map(|n| policy.backoff(n).as_secs()).collect();

        assert_eq!(secs, vec![5, 5, 8, 16, 32, 64, 120, 120]);
    }

    #[test]
    fn test_backoff_extreme_retry_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(u32::MAX), Duration::from_secs(120));
        assert_eq!(RetryPolicy::immediate(3).backoff(4), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_from_transient_failures() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let start = Instant::now();

        let result = policy
            .run(|| async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(Error::Transport(String::from("connection reset")))
                } else {
                    Ok(42)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Http {
                    status: 503,
                    message: String::from("unavailable"),
                })
            })
            .await;

        assert!(matches!(result, Err(Error::Http { status: 503, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_parse_errors_are_not_retried() {
        let policy = RetryPolicy::immediate(5);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Parse(String::from("unexpected token")))
            })
            .await;

        assert!(matches!(result, Err(Error::Parse(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_single_attempt_policy() {
        let policy = RetryPolicy::immediate(0);
        let calls = AtomicU32::new(0);

        let result: Result<()> = policy
            .run(|| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Transport(String::from("down")))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_from_config() {
        let policy = RetryPolicy::from_config(&RetryConfig {
            max_attempts: 3,
            multiplier: 1.0,
            min_backoff_seconds: 1,
            max_backoff_seconds: 4,
        });

        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.backoff(1), Duration::from_secs(1));
        assert_eq!(policy.backoff(5), Duration::from_secs(4));
    }
}
