//! Fixed-window request budgeting for polite harvesting.
//!
//! Each source publishes a request budget per time window (e.g. 20 requests
//! per 10 seconds). [`RateLimiter`] keeps one [`RateWindow`] per source and
//! grants or denies requests against it. The limiter is advisory: window
//! edges allow short bursts of up to twice the budget, and the source's own
//! 429 responses are honored separately by the pagination driver.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use gleaner_core::rate_limit::{RateLimit, RateLimiter};
//!
//! let limiter = RateLimiter::new("derpibooru", RateLimit::new(20, Duration::from_secs(10)));
//! let decision = limiter.try_acquire();
//! if !decision.granted {
//!     println!("wait {:?}", decision.retry_after);
//! }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;

/// Static request budget for one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Requests allowed per window.
    pub requests: u32,
    /// Window length.
    pub interval: Duration,
}

impl RateLimit {
    pub const fn new(requests: u32, interval: Duration) -> Self {
        Self { requests, interval }
    }
}

/// Outcome of a single acquire attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Acquire {
    pub granted: bool,
    /// Time left in the current window when denied; zero when granted.
    pub retry_after: Duration,
}

/// Mutable window state. Only the limiter touches it.
#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    requests_in_window: u32,
}

/// Thread-safe fixed-window counter for one source.
///
/// Clones share the same window, so concurrent callers never exceed the
/// granted-request count for a window.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    source: String,
    limit: RateLimit,
    window: Arc<Mutex<RateWindow>>,
}

impl RateLimiter {
    pub fn new(source: impl Into<String>, limit: RateLimit) -> Self {
        Self {
            source: source.into(),
            limit,
            window: Arc::new(Mutex::new(RateWindow {
                window_start: Instant::now(),
                requests_in_window: 0,
            })),
        }
    }

    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    fn lock_window(&self) -> std::sync::MutexGuard<'_, RateWindow> {
        self.window.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(source = %self.source, "Recovered from poisoned rate window");
            poisoned.into_inner()
        })
    }

    /// Try to take one request from the current window.
    pub fn try_acquire(&self) -> Acquire {
        self.try_acquire_at(Instant::now())
    }

    /// Same as [`try_acquire`](Self::try_acquire) with an explicit clock reading.
    pub fn try_acquire_at(&self, now: Instant) -> Acquire {
        let mut window = self.lock_window();

        let elapsed = now.saturating_duration_since(window.window_start);
        if elapsed >= self.limit.interval {
            window.window_start = now;
            window.requests_in_window = 0;
        }

        if window.requests_in_window < self.limit.requests {
            window.requests_in_window += 1;
            Acquire {
                granted: true,
                retry_after: Duration::ZERO,
            }
        } else {
            let elapsed = now.saturating_duration_since(window.window_start);
            Acquire {
                granted: false,
                retry_after: self.limit.interval.saturating_sub(elapsed),
            }
        }
    }

    /// Return one request to the current window.
    ///
    /// Used when the source itself throttled the request: the remote
    /// authority's wait replaces the local accounting for it.
    pub fn refund(&self) {
        let mut window = self.lock_window();
        window.requests_in_window = window.requests_in_window.saturating_sub(1);
    }

    /// Wait until a request is granted, sleeping out denied windows.
    pub async fn acquire(&self, cancel: &CancellationToken) -> Result<(), AppError> {
        loop {
            let decision = self.try_acquire();
            if decision.granted {
                return Ok(());
            }
            tracing::debug!(
                source = %self.source,
                sleep_ms = %decision.retry_after.as_millis(),
                "Rate budget exhausted, waiting for next window"
            );
            // A zero wait would spin; the window resets on the next reading.
            let wait = decision.retry_after.max(Duration::from_millis(1));
            tokio::select! {
                () = tokio::time::sleep(wait) => {}
                () = cancel.cancelled() => return Err(AppError::Cancelled),
            }
        }
    }
}
