use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::Router;
use tokio::sync::Semaphore;

use tunecrawl_client::StructuredDataParser;
use tunecrawl_core::{AppError, Crawler, CrawlerConfig, Fetcher, MemoryCatalog, ProxyConfig};
use tunecrawl_server::routes;
use tunecrawl_server::state::AppState;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

pub type TestCrawler = Crawler<StubFetcher, StructuredDataParser, MemoryCatalog>;

/// Serves the same JSON feed for every URL. Requests wait on `gate`, so a
/// test can hold a job in flight by starting with a closed gate.
#[derive(Clone)]
pub struct StubFetcher {
    body: Arc<String>,
    gate: Arc<Semaphore>,
    calls: Arc<AtomicUsize>,
}

impl StubFetcher {
    pub fn serving(songs: usize) -> Self {
        let items: Vec<serde_json::Value> = (1..=songs)
            .map(|i| serde_json::json!({"title": format!("Song {i}"), "artist": format!("Artist {i}")}))
            .collect();
        Self {
            body: Arc::new(serde_json::Value::Array(items).to_string()),
            gate: Arc::new(Semaphore::new(Semaphore::MAX_PERMITS)),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn blocked(songs: usize) -> Self {
        Self {
            gate: Arc::new(Semaphore::new(0)),
            ..Self::serving(songs)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Fetcher for StubFetcher {
    async fn fetch(&self, _url: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| AppError::Generic(e.to_string()))?;
        Ok(self.body.to_string())
    }
}

pub struct TestApp {
    pub router: Router,
    pub crawler: TestCrawler,
    pub catalog: MemoryCatalog,
}

pub fn test_config() -> CrawlerConfig {
    CrawlerConfig {
        request_delay: Duration::ZERO,
        retry_attempts: 0,
        max_daily_requests: 0,
        enable_cache: false,
        proxy: ProxyConfig {
            enabled: true,
            host: "proxy.local".to_string(),
            port: 8080,
            username: Some("crawler".to_string()),
            password: Some("s3cret-proxy-pass".to_string()),
        },
        ..CrawlerConfig::default()
    }
}

pub fn setup_test_app(fetcher: StubFetcher) -> TestApp {
    build_app(fetcher, Some(TEST_ADMIN_TOKEN.to_string()))
}

pub fn setup_test_app_no_auth() -> TestApp {
    build_app(StubFetcher::serving(3), None)
}

fn build_app(fetcher: StubFetcher, admin_token: Option<String>) -> TestApp {
    let catalog = MemoryCatalog::new();
    let crawler = Crawler::new(
        test_config(),
        fetcher,
        StructuredDataParser::new(),
        catalog.clone(),
    );

    let state = Arc::new(AppState {
        crawler: Arc::new(crawler.clone()),
        db: None,
        admin_token,
    });

    TestApp {
        router: routes::router(state),
        crawler,
        catalog,
    }
}
