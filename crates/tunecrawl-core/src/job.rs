use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::CrawlerConfig;
use crate::error::AppError;

/// Status of a crawl job.
///
/// ```text
/// pending ──► running ──► completed
///    │           ├──────► failed
///    └───────────┴──────► aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Aborted,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Aborted => "aborted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Aborted
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "aborted" => Ok(JobStatus::Aborted),
            _ => Err(format!("Unknown job status: {}", s)),
        }
    }
}

/// Which listing a crawl walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlType {
    Recommended,
    Popular,
    Latest,
}

impl CrawlType {
    /// Path segment appended to the base URL.
    pub fn as_str(&self) -> &'static str {
        match self {
            CrawlType::Recommended => "recommended",
            CrawlType::Popular => "popular",
            CrawlType::Latest => "latest",
        }
    }
}

impl fmt::Display for CrawlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CrawlType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "recommended" => Ok(CrawlType::Recommended),
            "popular" => Ok(CrawlType::Popular),
            "latest" => Ok(CrawlType::Latest),
            _ => Err(format!("Unknown crawl type: {}", s)),
        }
    }
}

/// Request to start a crawl job.
#[derive(Debug, Clone)]
pub struct CrawlRequest {
    pub crawl_type: CrawlType,
    pub limit: usize,
    pub enable_data_optimization: bool,
    pub enable_duplicate_detection: bool,
    /// Title similarity at or above which two songs by the same artist
    /// count as duplicates. `1.0` means exact fingerprint matches only.
    pub duplicate_threshold: f64,
}

impl CrawlRequest {
    pub fn new(crawl_type: CrawlType, limit: usize) -> Self {
        Self {
            crawl_type,
            limit,
            enable_data_optimization: true,
            enable_duplicate_detection: true,
            duplicate_threshold: 1.0,
        }
    }

    pub fn with_data_optimization(mut self, enabled: bool) -> Self {
        self.enable_data_optimization = enabled;
        self
    }

    pub fn with_duplicate_detection(mut self, enabled: bool) -> Self {
        self.enable_duplicate_detection = enabled;
        self
    }

    pub fn with_duplicate_threshold(mut self, threshold: f64) -> Self {
        self.duplicate_threshold = threshold;
        self
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.limit == 0 {
            return Err(AppError::ValidationError(
                "limit must be at least 1".into(),
            ));
        }
        if !(self.duplicate_threshold > 0.0 && self.duplicate_threshold <= 1.0) {
            return Err(AppError::ValidationError(format!(
                "duplicateThreshold must be within (0, 1], got {}",
                self.duplicate_threshold
            )));
        }
        Ok(())
    }

    /// Number of pages needed to cover `limit` at `per_page` songs each.
    pub fn page_count(&self, per_page: usize) -> usize {
        self.limit.div_ceil(per_page.max(1))
    }
}

/// A crawl job and its per-job counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: Uuid,
    pub crawl_type: CrawlType,
    pub requested_limit: usize,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Items that reached a terminal outcome.
    pub current: u64,
    /// Best-known expected item count.
    pub total: u64,
    pub message: String,
    pub error_count: u64,
    pub success_count: u64,
    pub duplicate_count: u64,
    pub pages_fetched: u64,
}

impl CrawlJob {
    pub fn new(request: &CrawlRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            crawl_type: request.crawl_type,
            requested_limit: request.limit,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            current: 0,
            total: request.limit as u64,
            message: format!("Queued {} crawl of {} songs", request.crawl_type, request.limit),
            error_count: 0,
            success_count: 0,
            duplicate_count: 0,
            pages_fetched: 0,
        }
    }

    /// `floor(100 * current / total)`, clamped to `[0, 100]`, `0` when
    /// `total` is zero.
    pub fn progress(&self) -> u8 {
        progress_percent(self.current, self.total)
    }

    /// Move to `status` unless the job already reached a terminal state.
    /// Returns whether the transition happened.
    pub fn transition(&mut self, status: JobStatus, message: impl Into<String>) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.status = status;
        self.message = message.into();
        match status {
            JobStatus::Running => {
                self.started_at.get_or_insert_with(Utc::now);
            }
            s if s.is_terminal() => self.completed_at = Some(Utc::now()),
            _ => {}
        }
        true
    }
}

pub fn progress_percent(current: u64, total: u64) -> u8 {
    if total == 0 {
        return 0;
    }
    ((current.saturating_mul(100)) / total).min(100) as u8
}

/// Error-rate abort rule.
///
/// A job aborts once `errors / (successes + errors) > threshold` **and**
/// `errors >= max_errors`. Duplicates are neither successes nor errors.
#[derive(Debug, Clone, Copy)]
pub struct ErrorPolicy {
    pub max_errors: u64,
    pub threshold: f64,
}

impl From<&CrawlerConfig> for ErrorPolicy {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_errors: config.max_errors,
            threshold: config.error_threshold,
        }
    }
}

impl ErrorPolicy {
    pub fn should_abort(&self, success_count: u64, error_count: u64) -> bool {
        let processed = success_count + error_count;
        if processed == 0 || error_count < self.max_errors {
            return false;
        }
        (error_count as f64 / processed as f64) > self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_status_roundtrip() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Aborted,
        ] {
            let parsed: JobStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_terminal_states() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Aborted.is_terminal());
    }

    #[test]
    fn test_crawl_type_parse() {
        assert_eq!("Popular".parse::<CrawlType>().unwrap(), CrawlType::Popular);
        assert!("trending".parse::<CrawlType>().is_err());
    }

    #[test]
    fn test_request_validation() {
        assert!(CrawlRequest::new(CrawlType::Popular, 10).validate().is_ok());
        assert!(CrawlRequest::new(CrawlType::Popular, 0).validate().is_err());
        assert!(
            CrawlRequest::new(CrawlType::Popular, 10)
                .with_duplicate_threshold(0.0)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_page_count() {
        let request = CrawlRequest::new(CrawlType::Latest, 101);
        assert_eq!(request.page_count(50), 3);
        assert_eq!(CrawlRequest::new(CrawlType::Latest, 50).page_count(50), 1);
    }

    #[test]
    fn test_progress_percent() {
        assert_eq!(progress_percent(0, 0), 0);
        assert_eq!(progress_percent(1, 3), 33);
        assert_eq!(progress_percent(3, 3), 100);
        assert_eq!(progress_percent(7, 3), 100);
    }

    #[test]
    fn test_terminal_states_are_final() {
        let mut job = CrawlJob::new(&CrawlRequest::new(CrawlType::Popular, 10));
        assert!(job.transition(JobStatus::Running, "running"));
        assert!(job.started_at.is_some());
        assert!(job.transition(JobStatus::Aborted, "stopped"));
        assert!(!job.transition(JobStatus::Completed, "done"));
        assert_eq!(job.status, JobStatus::Aborted);
        assert_eq!(job.message, "stopped");
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_error_policy_needs_both_ratio_and_count() {
        let policy = ErrorPolicy {
            max_errors: 10,
            threshold: 0.3,
        };
        // 7/20 = 0.35 > 0.3 but only 7 errors.
        assert!(!policy.should_abort(13, 7));
        // 17/30 = 0.57 and 17 errors.
        assert!(policy.should_abort(13, 17));
        // Plenty of errors but a low ratio.
        assert!(!policy.should_abort(100, 20));
        assert!(!policy.should_abort(0, 0));
    }
}
