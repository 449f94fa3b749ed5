use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::require_admin_token;
use crate::dto::{
    ConfigResponse, ConnectionTestResponse, DuplicateStatsResponse, HealthResponse, JobResponse,
    ProgressResponse, StartCrawlRequest, StartCrawlResponse, StatsResponse, StopCrawlResponse,
};
use crate::error::StartError;
use crate::openapi::ApiDoc;
use crate::state::AppState;

const MAX_BODY_BYTES: usize = 64 * 1024;

/// Build the full router with all routes and middleware.
pub fn router(state: Arc<AppState>) -> Router {
    let control = Router::new()
        .route("/crawler/start", post(start_crawl))
        .route("/crawler/stop", post(stop_crawl))
        .route("/crawler/test", post(test_connection))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            require_admin_token,
        ));

    let public = Router::new()
        .route("/crawler/progress", get(progress))
        .route("/crawler/stats", get(stats))
        .route("/crawler/duplicate-stats", get(duplicate_stats))
        .route("/crawler/config", get(crawler_config))
        .route("/health", get(health))
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()));

    public
        .merge(control)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Crawl control
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/crawler/start",
    request_body = StartCrawlRequest,
    responses(
        (status = 202, description = "Crawl job accepted", body = StartCrawlResponse),
        (status = 400, description = "Invalid request", body = crate::dto::ErrorResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Crawler control disabled"),
        (status = 409, description = "A job is already running", body = crate::dto::ErrorResponse),
    ),
    security(("bearer" = [])),
    tag = "crawler"
)]
pub async fn start_crawl(
    State(state): State<Arc<AppState>>,
    axum::Json(body): axum::Json<StartCrawlRequest>,
) -> Result<impl IntoResponse, StartError> {
    let request = body.into_request()?;
    let job = state.crawler.start(request)?;

    let response = StartCrawlResponse {
        success: true,
        message: format!(
            "Started {} crawl of {} songs",
            job.crawl_type, job.requested_limit
        ),
        job: JobResponse::from(job),
    };

    Ok((StatusCode::ACCEPTED, axum::Json(response)))
}

#[utoipa::path(
    post,
    path = "/crawler/stop",
    responses(
        (status = 200, description = "Stop outcome", body = StopCrawlResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Crawler control disabled"),
    ),
    security(("bearer" = [])),
    tag = "crawler"
)]
pub async fn stop_crawl(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let response = match state.crawler.stop() {
        Some(job) => StopCrawlResponse {
            stopped: true,
            message: format!("Stopped crawl job {}", job.id),
            job: Some(JobResponse::from(job)),
        },
        None => StopCrawlResponse {
            stopped: false,
            message: "No crawl job is running".to_string(),
            job: None,
        },
    };

    axum::Json(response)
}

#[utoipa::path(
    post,
    path = "/crawler/test",
    responses(
        (status = 200, description = "Connectivity report for the base URL", body = ConnectionTestResponse),
        (status = 401, description = "Unauthorized"),
        (status = 403, description = "Crawler control disabled"),
    ),
    security(("bearer" = [])),
    tag = "crawler"
)]
pub async fn test_connection(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let report = state.crawler.test_connection().await;
    axum::Json(ConnectionTestResponse::from(report))
}

// ---------------------------------------------------------------------------
// Monitoring
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/crawler/progress",
    responses(
        (status = 200, description = "Progress of the current or last job", body = ProgressResponse),
    ),
    tag = "crawler"
)]
pub async fn progress(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(ProgressResponse::from(state.crawler.snapshot()))
}

#[utoipa::path(
    get,
    path = "/crawler/stats",
    responses(
        (status = 200, description = "Cumulative crawl counters", body = StatsResponse),
    ),
    tag = "crawler"
)]
pub async fn stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(StatsResponse::from(state.crawler.stats()))
}

#[utoipa::path(
    get,
    path = "/crawler/duplicate-stats",
    responses(
        (status = 200, description = "Duplicate detection counters", body = DuplicateStatsResponse),
    ),
    tag = "crawler"
)]
pub async fn duplicate_stats(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(DuplicateStatsResponse::from(state.crawler.duplicate_stats()))
}

#[utoipa::path(
    get,
    path = "/crawler/config",
    responses(
        (status = 200, description = "Effective crawler configuration", body = ConfigResponse),
    ),
    tag = "crawler"
)]
pub async fn crawler_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    axum::Json(ConfigResponse::from(state.crawler.config().public_view()))
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse),
    ),
    tag = "system"
)]
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(db) = &state.db else {
        let response = HealthResponse {
            status: "healthy",
            database: "disabled",
        };
        return (StatusCode::OK, axum::Json(response));
    };

    match db.health_check().await {
        Ok(()) => (
            StatusCode::OK,
            axum::Json(HealthResponse {
                status: "healthy",
                database: "ok",
            }),
        ),
        Err(e) => {
            tracing::warn!(error = %e, "Database health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                axum::Json(HealthResponse {
                    status: "degraded",
                    database: "unreachable",
                }),
            )
        }
    }
}
