use std::time::Duration;

use reqwest::{Client, Proxy};
use tunecrawl_core::config::CrawlerConfig;
use tunecrawl_core::error::AppError;
use tunecrawl_core::traits::Fetcher;

/// HTTP fetcher using reqwest.
///
/// Sends the configured User-Agent, bounds every request by the configured
/// timeout and optionally routes traffic through an HTTP proxy with basic
/// auth. Non-2xx answers become [`AppError::HttpStatus`].
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout: Duration,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, AppError> {
        Self::from_config(&CrawlerConfig::default())
    }

    pub fn from_config(config: &CrawlerConfig) -> Result<Self, AppError> {
        let mut builder = Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.timeout);

        if config.proxy.enabled {
            let mut proxy = Proxy::all(config.proxy.url())
                .map_err(|e| AppError::ConfigError(format!("Invalid proxy: {e}")))?;
            if let Some(username) = &config.proxy.username {
                proxy = proxy.basic_auth(username, config.proxy.password.as_deref().unwrap_or(""));
            }
            tracing::info!(proxy = %config.proxy.url(), "Routing requests through proxy");
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        Ok(Self {
            client,
            timeout: config.timeout,
        })
    }
}

impl Fetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json, text/html;q=0.9")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(self.timeout.as_millis() as u64)
                } else if e.is_connect() {
                    AppError::NetworkError(format!("Connection failed: {e}"))
                } else {
                    AppError::HttpError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| AppError::NetworkError(format!("Failed to read response body: {e}")))
    }
}
