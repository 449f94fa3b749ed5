use std::sync::Arc;

use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use tunecrawl_client::{ReqwestFetcher, StructuredDataParser};
use tunecrawl_core::{Crawler, CrawlerConfig};
use tunecrawl_db::{Database, DatabaseConfig};
use tunecrawl_server::routes;
use tunecrawl_server::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("tunecrawl=info".parse()?))
        .with_target(false)
        .init();

    let admin_token = std::env::var("TUNECRAWL_ADMIN_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty());
    if admin_token.is_none() {
        tracing::warn!("TUNECRAWL_ADMIN_TOKEN not set; crawler control endpoints are disabled");
    }
    let port = std::env::var("TUNECRAWL_SERVER_PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("0.0.0.0:{port}");

    let config = CrawlerConfig::from_env()?;
    let db = Database::connect(&DatabaseConfig::from_env()?).await?;
    db.migrate().await?;

    let fetcher = ReqwestFetcher::from_config(&config)?;
    let crawler = Crawler::new(
        config,
        fetcher,
        StructuredDataParser::new(),
        db.song_repo(),
    );
    crawler.spawn_maintenance();

    let state = Arc::new(AppState {
        crawler: Arc::new(crawler.clone()),
        db: Some(db.clone()),
        admin_token,
    });

    let app = routes::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    tracing::info!("Starting server on {addr}");
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    crawler.shutdown();
    db.close().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for CTRL+C");
        return std::future::pending().await;
    }
    tracing::info!("Shutdown signal received");
}
