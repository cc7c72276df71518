//! Sliding-window rate limiter for external calls.
//!
//! Each component that talks to an external service (similarity store for
//! embeddings, summarizer for completions) owns one limiter instance, built
//! from configuration and shared by `Arc` if several components must share
//! a quota. There is no process-wide limiter.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Allows at most `max_requests` calls in any trailing `window`.
#[derive(Debug)]
pub struct RateLimiter {
    max_requests: usize,
    window: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    pub fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests: max_requests.max(1),
            window,
            calls: Mutex::new(VecDeque::new()),
        }
    }

    /// A limiter that never blocks.
    pub fn unlimited() -> Self {
        Self::new(usize::MAX, Duration::ZERO)
    }

    /// Record a call if within limits. Returns `true` if allowed.
    pub fn check(&self) -> bool {
        self.try_reserve().is_ok()
    }

    /// Wait until a slot is free, then record the call.
    pub async fn acquire(&self) {
        loop {
            match self.try_reserve() {
                Ok(()) => return,
                Err(wait) => {
                    tracing::debug!(wait_ms = wait.as_millis() as u64, "Rate limit reached, waiting");
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    /// Either records a call, or returns how long until the oldest call leaves the window.
    fn try_reserve(&self) -> Result<(), Duration> {
        if self.window.is_zero() {
            return Ok(());
        }
        let now = Instant::now();
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());

        // Remove expired timestamps
        while calls
            .front()
            .is_some_and(|t| now.duration_since(*t) >= self.window)
        {
            calls.pop_front();
        }

        if calls.len() >= self.max_requests {
            let oldest = calls.front().copied().unwrap_or(now);
            return Err(self.window.saturating_sub(now.duration_since(oldest)));
        }

        calls.push_back(now);
        Ok(())
    }
}
