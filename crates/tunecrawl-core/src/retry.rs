//! Fetch executor: cache lookup, rate-limited dispatch, timeout and retry.
//!
//! ```text
//! fetch(url)
//!   ├─ cache hit ───────────────────────────────► Page
//!   └─ loop:
//!        acquire permit ─(quota)──────────────────► Err
//!        inner.fetch within timeout, drop permit
//!          ├─ Ok ──► cache.set ──────────────────► Page
//!          ├─ transient, retries left ─► sleep(retry_delay), loop
//!          └─ otherwise ──────────────────────────► Err
//! ```

use std::time::Duration;

use crate::cache::TtlCache;
use crate::config::CrawlerConfig;
use crate::error::AppError;
use crate::models::Page;
use crate::rate_limit::RateLimiter;
use crate::traits::Fetcher;
use crate::util::normalize_url;

/// Events emitted by the executor for monitoring/logging.
#[derive(Debug, Clone)]
pub enum FetchEvent<'a> {
    CacheHit {
        url: &'a str,
    },
    Retrying {
        url: &'a str,
        /// The attempt that just failed, starting at 1.
        attempt: u32,
        error: &'a AppError,
        delay: Duration,
    },
    Succeeded {
        url: &'a str,
        attempts: u32,
    },
    Failed {
        url: &'a str,
        attempts: u32,
        error: &'a AppError,
    },
}

/// Trait for receiving fetch events.
pub trait FetchObserver: Send + Sync {
    fn observe(&self, event: FetchEvent<'_>) {
        let _ = event;
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl FetchObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Upper bound on a single attempt.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    /// TTL of cached pages.
    pub cache_ttl: Duration,
}

impl From<&CrawlerConfig> for RetryPolicy {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            timeout: config.timeout,
            retry_attempts: config.retry_attempts,
            retry_delay: config.retry_delay,
            cache_ttl: config.cache_expiry,
        }
    }
}

/// A [`Fetcher`] wrapped with caching, rate limiting, timeout and retry.
#[derive(Clone)]
pub struct RetryingFetcher<F> {
    inner: F,
    limiter: RateLimiter,
    cache: Option<TtlCache<String, Page>>,
    policy: RetryPolicy,
}

impl<F: Fetcher> RetryingFetcher<F> {
    pub fn new(inner: F, limiter: RateLimiter, policy: RetryPolicy) -> Self {
        Self {
            inner,
            limiter,
            cache: None,
            policy,
        }
    }

    /// Serve repeated URLs from `cache`.
    pub fn with_cache(mut self, cache: TtlCache<String, Page>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn cache(&self) -> Option<&TtlCache<String, Page>> {
        self.cache.as_ref()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Fetch `url`, reporting every outcome to `observer`.
    pub async fn fetch<O>(&self, url: &str, observer: &O) -> Result<Page, AppError>
    where
        O: FetchObserver + ?Sized,
    {
        let key = normalize_url(url);
        if let Some(cache) = &self.cache
            && let Some(page) = cache.get(&key)
        {
            observer.observe(FetchEvent::CacheHit { url });
            return Ok(page);
        }

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match self.attempt(url).await {
                Ok(body) => {
                    let page = Page::new(url, body);
                    if let Some(cache) = &self.cache {
                        cache.set(key, page.clone(), Some(self.policy.cache_ttl));
                    }
                    observer.observe(FetchEvent::Succeeded {
                        url,
                        attempts: attempt,
                    });
                    return Ok(page);
                }
                Err(error) if error.is_retryable() && attempt <= self.policy.retry_attempts => {
                    let delay = self.policy.retry_delay;
                    observer.observe(FetchEvent::Retrying {
                        url,
                        attempt,
                        error: &error,
                        delay,
                    });
                    tokio::time::sleep(delay).await;
                }
                Err(error) => {
                    observer.observe(FetchEvent::Failed {
                        url,
                        attempts: attempt,
                        error: &error,
                    });
                    return Err(error);
                }
            }
        }
    }

    /// One uncached, unretried request. Still takes a permit and a quota
    /// unit.
    pub async fn probe(&self, url: &str) -> Result<String, AppError> {
        self.attempt(url).await
    }

    async fn attempt(&self, url: &str) -> Result<String, AppError> {
        let permit = self.limiter.acquire().await?;
        let result = match tokio::time::timeout(self.policy.timeout, self.inner.fetch(url)).await
        {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(self.policy.timeout.as_millis() as u64)),
        };
        self.limiter.release(permit);
        result
    }
}
