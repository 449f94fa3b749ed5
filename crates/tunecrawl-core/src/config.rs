//! Crawler configuration, read once from the environment at startup.
//!
//! Every field has a documented default and a `CRAWLER_*` variable that
//! overrides it. The configuration is immutable for the life of the process.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use url::Url;

use crate::error::AppError;

pub const DEFAULT_BASE_URL: &str = "https://music.example.com/api";

/// Outbound proxy settings. Credentials never leave this struct through
/// `Debug` or [`CrawlerConfig::public_view`].
#[derive(Clone, Default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Proxy URL without credentials, e.g. `http://proxy.local:8080`.
    pub fn url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("enabled", &self.enabled)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username.as_ref().map(|_| "<redacted>"))
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    // Network identity
    pub base_url: String,
    pub user_agent: String,
    pub proxy: ProxyConfig,

    // Request timing
    pub timeout: Duration,
    pub request_delay: Duration,
    pub max_concurrent: usize,
    pub retry_attempts: u32,
    pub retry_delay: Duration,

    // Quotas
    pub max_songs_per_request: usize,
    /// `0` disables the daily quota.
    pub max_daily_requests: u32,

    // Validation bounds, in characters
    pub min_title_length: usize,
    pub max_title_length: usize,
    pub min_artist_length: usize,
    pub max_artist_length: usize,

    // Error policy
    pub max_errors: u64,
    pub error_threshold: f64,

    // Cache policy
    pub enable_cache: bool,
    pub cache_expiry: Duration,
    pub cache_max_items: usize,
    pub cache_check_period: Duration,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            user_agent: format!("tunecrawl/{}", env!("CARGO_PKG_VERSION")),
            proxy: ProxyConfig::default(),
            timeout: Duration::from_millis(10_000),
            request_delay: Duration::from_millis(1_000),
            max_concurrent: 3,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(2_000),
            max_songs_per_request: 50,
            max_daily_requests: 1_000,
            min_title_length: 1,
            max_title_length: 200,
            min_artist_length: 1,
            max_artist_length: 100,
            max_errors: 10,
            error_threshold: 0.3,
            enable_cache: true,
            cache_expiry: Duration::from_secs(3_600),
            cache_max_items: 1_000,
            cache_check_period: Duration::from_secs(120),
        }
    }
}

impl CrawlerConfig {
    /// Read configuration from `CRAWLER_*` environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    ///
    /// Unset keys fall back to [`CrawlerConfig::default`]; set but
    /// unparsable keys are a [`AppError::ConfigError`].
    pub fn from_lookup<L>(lookup: L) -> Result<Self, AppError>
    where
        L: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let env = EnvReader { lookup };

        let proxy = ProxyConfig {
            enabled: env.parse("CRAWLER_PROXY_ENABLED", false)?,
            host: env.string("CRAWLER_PROXY_HOST", ""),
            port: env.parse("CRAWLER_PROXY_PORT", 8080)?,
            username: env.optional("CRAWLER_PROXY_USERNAME"),
            password: env.optional("CRAWLER_PROXY_PASSWORD"),
        };

        let config = Self {
            base_url: env.string("CRAWLER_BASE_URL", &d.base_url),
            user_agent: env.string("CRAWLER_USER_AGENT", &d.user_agent),
            proxy,
            timeout: env.millis("CRAWLER_TIMEOUT_MS", d.timeout)?,
            request_delay: env.millis("CRAWLER_REQUEST_DELAY_MS", d.request_delay)?,
            max_concurrent: env.parse("CRAWLER_MAX_CONCURRENT", d.max_concurrent)?,
            retry_attempts: env.parse("CRAWLER_RETRY_ATTEMPTS", d.retry_attempts)?,
            retry_delay: env.millis("CRAWLER_RETRY_DELAY_MS", d.retry_delay)?,
            max_songs_per_request: env
                .parse("CRAWLER_MAX_SONGS_PER_REQUEST", d.max_songs_per_request)?,
            max_daily_requests: env.parse("CRAWLER_MAX_DAILY_REQUESTS", d.max_daily_requests)?,
            min_title_length: env.parse("CRAWLER_MIN_TITLE_LENGTH", d.min_title_length)?,
            max_title_length: env.parse("CRAWLER_MAX_TITLE_LENGTH", d.max_title_length)?,
            min_artist_length: env.parse("CRAWLER_MIN_ARTIST_LENGTH", d.min_artist_length)?,
            max_artist_length: env.parse("CRAWLER_MAX_ARTIST_LENGTH", d.max_artist_length)?,
            max_errors: env.parse("CRAWLER_MAX_ERRORS", d.max_errors)?,
            error_threshold: env.parse("CRAWLER_ERROR_THRESHOLD", d.error_threshold)?,
            enable_cache: env.parse("CRAWLER_ENABLE_CACHE", d.enable_cache)?,
            cache_expiry: env.secs("CRAWLER_CACHE_EXPIRY_SECS", d.cache_expiry)?,
            cache_max_items: env.parse("CRAWLER_CACHE_MAX_ITEMS", d.cache_max_items)?,
            cache_check_period: env.secs("CRAWLER_CACHE_CHECK_PERIOD_SECS", d.cache_check_period)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), AppError> {
        let base = Url::parse(&self.base_url).map_err(|e| {
            AppError::ConfigError(format!("Invalid CRAWLER_BASE_URL '{}': {e}", self.base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(AppError::ConfigError(format!(
                "CRAWLER_BASE_URL must be http or https, got '{}'",
                base.scheme()
            )));
        }
        if self.max_concurrent == 0 {
            return Err(AppError::ConfigError(
                "CRAWLER_MAX_CONCURRENT must be at least 1".into(),
            ));
        }
        if self.max_songs_per_request == 0 {
            return Err(AppError::ConfigError(
                "CRAWLER_MAX_SONGS_PER_REQUEST must be at least 1".into(),
            ));
        }
        if self.min_title_length > self.max_title_length {
            return Err(AppError::ConfigError(format!(
                "CRAWLER_MIN_TITLE_LENGTH ({}) exceeds CRAWLER_MAX_TITLE_LENGTH ({})",
                self.min_title_length, self.max_title_length
            )));
        }
        if self.min_artist_length > self.max_artist_length {
            return Err(AppError::ConfigError(format!(
                "CRAWLER_MIN_ARTIST_LENGTH ({}) exceeds CRAWLER_MAX_ARTIST_LENGTH ({})",
                self.min_artist_length, self.max_artist_length
            )));
        }
        if !(0.0..=1.0).contains(&self.error_threshold) {
            return Err(AppError::ConfigError(format!(
                "CRAWLER_ERROR_THRESHOLD must be within [0, 1], got {}",
                self.error_threshold
            )));
        }
        if self.cache_max_items == 0 {
            return Err(AppError::ConfigError(
                "CRAWLER_CACHE_MAX_ITEMS must be at least 1".into(),
            ));
        }
        if self.cache_check_period.is_zero() {
            return Err(AppError::ConfigError(
                "CRAWLER_CACHE_CHECK_PERIOD_SECS must be at least 1".into(),
            ));
        }
        if self.proxy.enabled && self.proxy.host.is_empty() {
            return Err(AppError::ConfigError(
                "CRAWLER_PROXY_HOST must be set when the proxy is enabled".into(),
            ));
        }
        Ok(())
    }

    /// The non-secret subset of the configuration, safe to return to clients.
    pub fn public_view(&self) -> PublicConfig {
        PublicConfig {
            base_url: self.base_url.clone(),
            user_agent: self.user_agent.clone(),
            timeout_ms: self.timeout.as_millis() as u64,
            request_delay_ms: self.request_delay.as_millis() as u64,
            max_concurrent: self.max_concurrent,
            retry_attempts: self.retry_attempts,
            retry_delay_ms: self.retry_delay.as_millis() as u64,
            max_songs_per_request: self.max_songs_per_request,
            max_daily_requests: self.max_daily_requests,
            min_title_length: self.min_title_length,
            max_title_length: self.max_title_length,
            min_artist_length: self.min_artist_length,
            max_artist_length: self.max_artist_length,
            max_errors: self.max_errors,
            error_threshold: self.error_threshold,
            enable_cache: self.enable_cache,
            cache_expiry_secs: self.cache_expiry.as_secs(),
            cache_max_items: self.cache_max_items,
            proxy_enabled: self.proxy.enabled,
        }
    }
}

/// Effective configuration without proxy host or credentials.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicConfig {
    pub base_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub request_delay_ms: u64,
    pub max_concurrent: usize,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_songs_per_request: usize,
    pub max_daily_requests: u32,
    pub min_title_length: usize,
    pub max_title_length: usize,
    pub min_artist_length: usize,
    pub max_artist_length: usize,
    pub max_errors: u64,
    pub error_threshold: f64,
    pub enable_cache: bool,
    pub cache_expiry_secs: u64,
    pub cache_max_items: usize,
    pub proxy_enabled: bool,
}

struct EnvReader<L> {
    lookup: L,
}

impl<L> EnvReader<L>
where
    L: Fn(&str) -> Option<String>,
{
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &str, default: T) -> Result<T, AppError> {
        match self.optional(key) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| {
                AppError::ConfigError(format!("Invalid {key} '{raw}'"))
            }),
        }
    }

    fn millis(&self, key: &str, default: Duration) -> Result<Duration, AppError> {
        let ms = self.parse(key, default.as_millis() as u64)?;
        Ok(Duration::from_millis(ms))
    }

    fn secs(&self, key: &str, default: Duration) -> Result<Duration, AppError> {
        let secs = self.parse(key, default.as_secs())?;
        Ok(Duration::from_secs(secs))
    }
}
