//! Sliding-window request limiter
//!
//! NVD enforces its quota over a rolling 30 second window (50 requests with an
//! API key, 5 without). The limiter keeps the grant times inside the current
//! window and makes callers wait until the oldest one ages out.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

/// Length of the NVD rate-limit window
pub const RATE_WINDOW: Duration = Duration::from_secs(30);

/// Rolling-window rate limiter, safe to share between tasks
#[derive(Debug)]
pub struct RateLimiter {
    max_per_window: usize,
    window: Duration,
    grants: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Allow at most `max_per_30s` grants in any 30 second span (minimum 1)
    pub fn new(max_per_30s: u32) -> Self {
        Self::with_window(max_per_30s, RATE_WINDOW)
    }

    /// Allow at most `max` grants in any `window` span (minimum 1)
    pub fn with_window(max: u32, window: Duration) -> Self {
        let max_per_window = max.max(1) as usize;
        Self {
            max_per_window,
            window,
            grants: Mutex::new(VecDeque::with_capacity(max_per_window)),
        }
    }

    pub fn max_per_window(&self) -> usize {
        self.max_per_window
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Wait until a request is permitted, then record it.
    ///
    /// The lock is held while sleeping, so concurrent callers queue up
    /// behind each other instead of all waking on the same expiry.
    pub async fn acquire(&self) {
        let mut grants = self.grants.lock().await;

        loop {
            let now = Instant::now();
            while let Some(&oldest) = grants.front() {
                if oldest + self.window <= now {
                    grants.pop_front();
                } else {
                    break;
                }
            }

            if grants.len() < self.max_per_window {
                break;
            }

            let Some(&oldest) = grants.front() else {
                break;
            };
            let ready_at = oldest + self.window;
            debug!(
                "Rate limit reached ({} per {:?}), waiting {:?}",
                self.max_per_window,
                self.window,
                ready_at.saturating_duration_since(now)
            );
            tokio::time::sleep_until(ready_at).await;
        }

        grants.push_back(Instant::now());
    }

    /// Number of grants still inside the window
    pub async fn in_flight(&self) -> usize {
        let grants = self.grants.lock().await;
        let now = Instant::now();
        grants
            .iter()
            .filter(|&&t| t + self.window > now)
            .count()
    }
}
