//! Concurrency gate and request pacing for polite crawling.
//!
//! A [`RateLimiter`] enforces three independent limits on outbound fetches:
//!
//! - at most `max_concurrent` permits outstanding at once,
//! - successive dispatches spaced by at least `request_delay`, measured
//!   from the previous dispatch (not its completion),
//! - a daily quota of `max_daily_requests` over a rolling 24h window.
//!
//! Exhausting the quota fails `acquire` immediately instead of suspending
//! the caller.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use tunecrawl_core::rate_limit::{RateLimiter, RateLimitConfig};
//!
//! # async fn run() -> Result<(), tunecrawl_core::AppError> {
//! let limiter = RateLimiter::new(RateLimitConfig {
//!     max_concurrent: 3,
//!     request_delay: Duration::from_millis(500),
//!     max_daily_requests: 1_000,
//! });
//! let permit = limiter.acquire().await?;
//! // ... perform the request ...
//! limiter.release(permit);
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::Instant;

use crate::config::CrawlerConfig;
use crate::error::AppError;

pub const QUOTA_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_concurrent: usize,
    pub request_delay: Duration,
    /// `0` disables the quota.
    pub max_daily_requests: u32,
}

impl From<&CrawlerConfig> for RateLimitConfig {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent,
            request_delay: config.request_delay,
            max_daily_requests: config.max_daily_requests,
        }
    }
}

/// The right to perform one fetch. Dropping it frees the slot.
#[derive(Debug)]
pub struct Permit {
    _slot: OwnedSemaphorePermit,
    dispatched_at: Instant,
}

impl Permit {
    pub fn dispatched_at(&self) -> Instant {
        self.dispatched_at
    }
}

#[derive(Debug)]
struct DailyQuota {
    window_start: Instant,
    used: u32,
}

/// Bounds in-flight fetches, paces dispatches and meters the daily quota.
#[derive(Clone)]
pub struct RateLimiter {
    config: RateLimitConfig,
    slots: Arc<Semaphore>,
    /// Time of the last dispatch. Held across the pacing sleep so that
    /// dispatches are serialised.
    last_dispatch: Arc<tokio::sync::Mutex<Option<Instant>>>,
    quota: Arc<Mutex<DailyQuota>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        let max_concurrent = config.max_concurrent.max(1);
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent)),
            last_dispatch: Arc::new(tokio::sync::Mutex::new(None)),
            quota: Arc::new(Mutex::new(DailyQuota {
                window_start: Instant::now(),
                used: 0,
            })),
            config,
        }
    }

    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// Wait for a free slot and the pacing delay, then hand out a permit.
    ///
    /// Fails with [`AppError::QuotaExceeded`] without waiting once the
    /// daily quota is used up.
    pub async fn acquire(&self) -> Result<Permit, AppError> {
        self.consume_quota()?;

        let slot = Arc::clone(&self.slots)
            .acquire_owned()
            .await
            .map_err(|_| AppError::Generic("rate limiter closed".into()))?;

        let mut last = self.last_dispatch.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.config.request_delay;
            let now = Instant::now();
            if now < ready_at {
                tracing::debug!(
                    sleep_ms = %(ready_at - now).as_millis(),
                    "Pacing request"
                );
                tokio::time::sleep_until(ready_at).await;
            }
        }
        let dispatched_at = Instant::now();
        *last = Some(dispatched_at);

        Ok(Permit {
            _slot: slot,
            dispatched_at,
        })
    }

    /// Give a permit back. Equivalent to dropping it.
    pub fn release(&self, permit: Permit) {
        drop(permit);
    }

    pub fn available_permits(&self) -> usize {
        self.slots.available_permits()
    }

    /// Requests left in the current quota window, `None` when unlimited.
    pub fn quota_remaining(&self) -> Option<u32> {
        if self.config.max_daily_requests == 0 {
            return None;
        }
        let mut quota = self.lock_quota();
        Self::roll_window(&mut quota);
        Some(self.config.max_daily_requests.saturating_sub(quota.used))
    }

    fn consume_quota(&self) -> Result<(), AppError> {
        let limit = self.config.max_daily_requests;
        if limit == 0 {
            return Ok(());
        }
        let mut quota = self.lock_quota();
        Self::roll_window(&mut quota);
        if quota.used >= limit {
            tracing::warn!(limit, "Daily request quota exhausted");
            return Err(AppError::QuotaExceeded { limit });
        }
        quota.used += 1;
        Ok(())
    }

    fn roll_window(quota: &mut DailyQuota) {
        let elapsed = quota.window_start.elapsed();
        if elapsed >= QUOTA_WINDOW {
            let windows = (elapsed.as_secs() / QUOTA_WINDOW.as_secs()) as u32;
            quota.window_start += QUOTA_WINDOW * windows;
            quota.used = 0;
        }
    }

    fn lock_quota(&self) -> std::sync::MutexGuard<'_, DailyQuota> {
        self.quota.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned quota mutex");
            poisoned.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn limiter(max_concurrent: usize, delay_ms: u64, daily: u32) -> RateLimiter {
        RateLimiter::new(RateLimitConfig {
            max_concurrent,
            request_delay: Duration::from_millis(delay_ms),
            max_daily_requests: daily,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn never_exceeds_max_concurrent() {
        let limiter = limiter(2, 0, 0);
        let outstanding = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..3 {
            let limiter = limiter.clone();
            let outstanding = Arc::clone(&outstanding);
            let peak = Arc::clone(&peak);
            tasks.push(tokio::spawn(async move {
                let permit = limiter.acquire().await.unwrap();
                let now = outstanding.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(50)).await;
                outstanding.fetch_sub(1, Ordering::SeqCst);
                limiter.release(permit);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.available_permits(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dispatches_are_spaced_by_request_delay() {
        let limiter = limiter(4, 100, 0);

        let first = limiter.acquire().await.unwrap();
        let second = limiter.acquire().await.unwrap();
        let third = limiter.acquire().await.unwrap();

        assert!(second.dispatched_at() - first.dispatched_at() >= Duration::from_millis(100));
        assert!(third.dispatched_at() - second.dispatched_at() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_is_measured_from_dispatch_not_completion() {
        let limiter = limiter(1, 100, 0);

        let first = limiter.acquire().await.unwrap();
        // Hold the slot longer than the delay.
        tokio::time::sleep(Duration::from_millis(300)).await;
        let released_at = Instant::now();
        limiter.release(first);

        let second = limiter.acquire().await.unwrap();
        assert_eq!(second.dispatched_at(), released_at);
    }

    #[tokio::test(start_paused = true)]
    async fn quota_rejects_without_blocking() {
        let limiter = limiter(1, 0, 2);

        drop(limiter.acquire().await.unwrap());
        drop(limiter.acquire().await.unwrap());
        assert_eq!(limiter.quota_remaining(), Some(0));

        // Even with a slot held elsewhere, rejection is immediate.
        let _held = limiter.slots.clone().acquire_owned().await.unwrap();
        let err = limiter.acquire().await.unwrap_err();
        assert!(matches!(err, AppError::QuotaExceeded { limit: 2 }));
    }

    #[tokio::test(start_paused = true)]
    async fn quota_resets_after_window() {
        let limiter = limiter(1, 0, 1);
        drop(limiter.acquire().await.unwrap());
        assert!(limiter.acquire().await.is_err());

        tokio::time::advance(QUOTA_WINDOW).await;

        assert_eq!(limiter.quota_remaining(), Some(1));
        assert!(limiter.acquire().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_quota_means_unlimited() {
        let limiter = limiter(1, 0, 0);
        for _ in 0..50 {
            drop(limiter.acquire().await.unwrap());
        }
        assert_eq!(limiter.quota_remaining(), None);
    }
}
