use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use tunecrawl_core::report::JobDuplicateStats;
use tunecrawl_core::{
    AppError, ConnectionReport, CrawlJob, CrawlRequest, CrawlStats, DuplicateStats,
    ProgressSnapshot, PublicConfig,
};

// ---------------------------------------------------------------------------
// Crawl control
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartCrawlRequest {
    /// One of `recommended`, `popular`, `latest`.
    #[serde(rename = "type")]
    pub crawl_type: String,
    pub limit: usize,
    pub enable_data_optimization: Option<bool>,
    pub enable_duplicate_detection: Option<bool>,
    pub duplicate_threshold: Option<f64>,
}

impl StartCrawlRequest {
    pub fn into_request(self) -> Result<CrawlRequest, AppError> {
        let crawl_type = self.crawl_type.parse().map_err(AppError::ValidationError)?;
        let mut request = CrawlRequest::new(crawl_type, self.limit);
        if let Some(enabled) = self.enable_data_optimization {
            request = request.with_data_optimization(enabled);
        }
        if let Some(enabled) = self.enable_duplicate_detection {
            request = request.with_duplicate_detection(enabled);
        }
        if let Some(threshold) = self.duplicate_threshold {
            request = request.with_duplicate_threshold(threshold);
        }
        request.validate()?;
        Ok(request)
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartCrawlResponse {
    pub success: bool,
    pub message: String,
    pub job: JobResponse,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StopCrawlResponse {
    pub stopped: bool,
    pub message: String,
    pub job: Option<JobResponse>,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobResponse {
    pub id: Uuid,
    pub crawl_type: String,
    pub requested_limit: usize,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub current: u64,
    pub total: u64,
    pub progress: u8,
    pub message: String,
    pub success_count: u64,
    pub duplicate_count: u64,
    pub error_count: u64,
    pub pages_fetched: u64,
}

impl From<CrawlJob> for JobResponse {
    fn from(job: CrawlJob) -> Self {
        let progress = job.progress();
        Self {
            id: job.id,
            crawl_type: job.crawl_type.to_string(),
            requested_limit: job.requested_limit,
            status: job.status.to_string(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            current: job.current,
            total: job.total,
            progress,
            message: job.message,
            success_count: job.success_count,
            duplicate_count: job.duplicate_count,
            error_count: job.error_count,
            pages_fetched: job.pages_fetched,
        }
    }
}

// ---------------------------------------------------------------------------
// Observability
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProgressResponse {
    pub job_id: Option<Uuid>,
    /// `idle` until the first job is started.
    pub status: String,
    pub progress: u8,
    pub current: u64,
    pub total: u64,
    pub message: String,
}

impl From<ProgressSnapshot> for ProgressResponse {
    fn from(snapshot: ProgressSnapshot) -> Self {
        Self {
            job_id: snapshot.job_id,
            status: snapshot
                .status
                .map_or_else(|| "idle".to_string(), |s| s.to_string()),
            progress: snapshot.progress,
            current: snapshot.current,
            total: snapshot.total,
            message: snapshot.message,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub jobs_started: u64,
    pub total_crawled: u64,
    pub success_count: u64,
    pub duplicate_count: u64,
    pub error_count: u64,
    pub pages_fetched: u64,
    pub cache_hits: u64,
    pub retries: u64,
    pub quota_remaining: Option<u32>,
    pub cached_pages: usize,
}

impl From<CrawlStats> for StatsResponse {
    fn from(stats: CrawlStats) -> Self {
        Self {
            jobs_started: stats.jobs_started,
            total_crawled: stats.total_crawled,
            success_count: stats.success_count,
            duplicate_count: stats.duplicate_count,
            error_count: stats.error_count,
            pages_fetched: stats.pages_fetched,
            cache_hits: stats.cache_hits,
            retries: stats.retries,
            quota_remaining: stats.quota_remaining,
            cached_pages: stats.cached_pages,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct JobDuplicateResponse {
    pub job_id: Uuid,
    pub duplicates: u64,
    pub unique: u64,
}

impl From<JobDuplicateStats> for JobDuplicateResponse {
    fn from(job: JobDuplicateStats) -> Self {
        Self {
            job_id: job.job_id,
            duplicates: job.duplicates,
            unique: job.unique,
        }
    }
}

/// Cumulative counters since process start, plus those of the current or
/// last job.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateStatsResponse {
    pub duplicates_detected: u64,
    pub unique_accepted: u64,
    /// Percentage of deduplicated candidates that were duplicates.
    pub duplicate_rate: f64,
    pub current_job: Option<JobDuplicateResponse>,
}

impl From<DuplicateStats> for DuplicateStatsResponse {
    fn from(stats: DuplicateStats) -> Self {
        Self {
            duplicates_detected: stats.duplicates_detected,
            unique_accepted: stats.unique_accepted,
            duplicate_rate: stats.duplicate_rate,
            current_job: stats.current_job.map(JobDuplicateResponse::from),
        }
    }
}

/// The effective crawler configuration, without proxy credentials.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfigResponse {
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

impl From<PublicConfig> for ConfigResponse {
    fn from(c: PublicConfig) -> Self {
        Self {
            base_url: c.base_url,
            user_agent: c.user_agent,
            timeout_ms: c.timeout_ms,
            request_delay_ms: c.request_delay_ms,
            max_concurrent: c.max_concurrent,
            retry_attempts: c.retry_attempts,
            retry_delay_ms: c.retry_delay_ms,
            max_songs_per_request: c.max_songs_per_request,
            max_daily_requests: c.max_daily_requests,
            min_title_length: c.min_title_length,
            max_title_length: c.max_title_length,
            min_artist_length: c.min_artist_length,
            max_artist_length: c.max_artist_length,
            max_errors: c.max_errors,
            error_threshold: c.error_threshold,
            enable_cache: c.enable_cache,
            cache_expiry_secs: c.cache_expiry_secs,
            cache_max_items: c.cache_max_items,
            proxy_enabled: c.proxy_enabled,
        }
    }
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionTestResponse {
    pub url: String,
    pub reachable: bool,
    pub status: Option<u16>,
    pub message: String,
    pub elapsed_ms: u64,
}

impl From<ConnectionReport> for ConnectionTestResponse {
    fn from(report: ConnectionReport) -> Self {
        Self {
            url: report.url,
            reachable: report.reachable,
            status: report.status,
            message: report.message,
            elapsed_ms: report.elapsed_ms,
        }
    }
}

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Set to `false` on rejected `/crawler/start` calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
}
