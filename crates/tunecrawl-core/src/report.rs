use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use uuid::Uuid;

use crate::job::{CrawlJob, JobStatus};

/// Point-in-time view of the active (or most recent) job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub job_id: Option<Uuid>,
    pub status: Option<JobStatus>,
    pub progress: u8,
    pub current: u64,
    pub total: u64,
    pub message: String,
}

impl ProgressSnapshot {
    /// Snapshot returned before any job was ever started.
    pub fn idle() -> Self {
        Self {
            job_id: None,
            status: None,
            progress: 0,
            current: 0,
            total: 0,
            message: "No crawl job has been started".to_string(),
        }
    }
}

impl From<&CrawlJob> for ProgressSnapshot {
    fn from(job: &CrawlJob) -> Self {
        Self {
            job_id: Some(job.id),
            status: Some(job.status),
            progress: job.progress(),
            current: job.current,
            total: job.total,
            message: job.message.clone(),
        }
    }
}

/// Cumulative counters since process start.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    pub jobs_started: u64,
    /// Candidates that reached a terminal outcome.
    pub total_crawled: u64,
    pub success_count: u64,
    pub duplicate_count: u64,
    pub error_count: u64,
    pub pages_fetched: u64,
    pub cache_hits: u64,
    pub retries: u64,
    /// Requests left in the daily quota, `None` when unlimited.
    pub quota_remaining: Option<u32>,
    /// Pages currently held in the page cache.
    pub cached_pages: usize,
}

/// Lock-free accumulator behind [`CrawlStats`].
#[derive(Debug, Default)]
pub struct StatsRecorder {
    jobs_started: AtomicU64,
    total_crawled: AtomicU64,
    success_count: AtomicU64,
    duplicate_count: AtomicU64,
    error_count: AtomicU64,
    pages_fetched: AtomicU64,
    cache_hits: AtomicU64,
    retries: AtomicU64,
}

impl StatsRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn job_started(&self) {
        self.jobs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn success(&self) {
        self.total_crawled.fetch_add(1, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate(&self) {
        self.total_crawled.fetch_add(1, Ordering::Relaxed);
        self.duplicate_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn item_error(&self) {
        self.total_crawled.fetch_add(1, Ordering::Relaxed);
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    /// A page that could not be fetched counts as an error but not as a
    /// crawled item.
    pub fn fetch_error(&self) {
        self.error_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn page_fetched(&self) {
        self.pages_fetched.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CrawlStats {
        CrawlStats {
            jobs_started: self.jobs_started.load(Ordering::Relaxed),
            total_crawled: self.total_crawled.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            duplicate_count: self.duplicate_count.load(Ordering::Relaxed),
            error_count: self.error_count.load(Ordering::Relaxed),
            pages_fetched: self.pages_fetched.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            quota_remaining: None,
            cached_pages: 0,
        }
    }
}

/// Duplicate counters of a single job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobDuplicateStats {
    pub job_id: Uuid,
    pub duplicates: u64,
    pub unique: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateStats {
    /// Duplicates detected since process start.
    pub duplicates_detected: u64,
    /// Songs persisted since process start.
    pub unique_accepted: u64,
    /// Percentage of deduplicated candidates that were duplicates.
    pub duplicate_rate: f64,
    pub current_job: Option<JobDuplicateStats>,
}

impl DuplicateStats {
    pub fn new(stats: &CrawlStats, job: Option<&CrawlJob>) -> Self {
        let seen = stats.duplicate_count + stats.success_count;
        let duplicate_rate = if seen == 0 {
            0.0
        } else {
            (stats.duplicate_count as f64 * 10000.0 / seen as f64).round() / 100.0
        };
        Self {
            duplicates_detected: stats.duplicate_count,
            unique_accepted: stats.success_count,
            duplicate_rate,
            current_job: job.map(|job| JobDuplicateStats {
                job_id: job.id,
                duplicates: job.duplicate_count,
                unique: job.success_count,
            }),
        }
    }
}

/// Outcome of a single connectivity probe against the base URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionReport {
    pub url: String,
    pub reachable: bool,
    /// HTTP status, when the server answered with an error status.
    pub status: Option<u16>,
    pub message: String,
    pub elapsed_ms: u64,
}

/// Events emitted by the crawler for monitoring/logging.
#[derive(Debug, Clone)]
pub enum CrawlEvent<'a> {
    JobStarted {
        job: &'a CrawlJob,
    },
    PageFetched {
        job_id: Uuid,
        url: &'a str,
        songs: usize,
    },
    PageFailed {
        job_id: Uuid,
        url: &'a str,
        error: &'a str,
    },
    SongRejected {
        job_id: Uuid,
        title: &'a str,
        reason: &'a str,
    },
    SongPersisted {
        job_id: Uuid,
        title: &'a str,
        artist: &'a str,
    },
    DuplicateSkipped {
        job_id: Uuid,
        fingerprint: &'a str,
    },
    JobFinished {
        job: &'a CrawlJob,
    },
}

/// Trait for receiving crawl events (decoupled logging).
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent<'_>) {
        let _ = event;
    }
}

/// Reporter that uses the `tracing` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingCrawlReporter;

impl CrawlReporter for TracingCrawlReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        match event {
            CrawlEvent::JobStarted { job } => {
                tracing::info!(
                    job_id = %job.id,
                    crawl_type = %job.crawl_type,
                    limit = job.requested_limit,
                    "Crawl job started"
                );
            }
            CrawlEvent::PageFetched { job_id, url, songs } => {
                tracing::info!(%job_id, %url, songs, "Page fetched");
            }
            CrawlEvent::PageFailed { job_id, url, error } => {
                tracing::warn!(%job_id, %url, %error, "Page fetch failed");
            }
            CrawlEvent::SongRejected {
                job_id,
                title,
                reason,
            } => {
                tracing::debug!(%job_id, %title, %reason, "Song rejected");
            }
            CrawlEvent::SongPersisted {
                job_id,
                title,
                artist,
            } => {
                tracing::debug!(%job_id, %title, %artist, "Song saved");
            }
            CrawlEvent::DuplicateSkipped {
                job_id,
                fingerprint,
            } => {
                tracing::debug!(%job_id, %fingerprint, "Duplicate skipped");
            }
            CrawlEvent::JobFinished { job } => {
                tracing::info!(
                    job_id = %job.id,
                    status = %job.status,
                    success = job.success_count,
                    duplicates = job.duplicate_count,
                    errors = job.error_count,
                    message = %job.message,
                    "Crawl job finished"
                );
            }
        }
    }
}

/// Reporter that discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCrawlReporter;

impl CrawlReporter for NoopCrawlReporter {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{CrawlRequest, CrawlType};

    #[test]
    fn idle_snapshot_has_no_job() {
        let snapshot = ProgressSnapshot::idle();
        assert_eq!(snapshot.job_id, None);
        assert_eq!(snapshot.progress, 0);
    }

    #[test]
    fn snapshot_reflects_job_progress() {
        let mut job = CrawlJob::new(&CrawlRequest::new(CrawlType::Popular, 40));
        job.current = 10;
        let snapshot = ProgressSnapshot::from(&job);
        assert_eq!(snapshot.progress, 25);
        assert_eq!(snapshot.total, 40);
        assert_eq!(snapshot.status, Some(JobStatus::Pending));
    }

    #[test]
    fn snapshot_serializes_camel_case() {
        let job = CrawlJob::new(&CrawlRequest::new(CrawlType::Popular, 40));
        let value = serde_json::to_value(ProgressSnapshot::from(&job)).unwrap();
        assert!(value.get("jobId").is_some());
        assert_eq!(value["status"], "pending");
    }

    #[test]
    fn recorder_separates_fetch_errors_from_items() {
        let recorder = StatsRecorder::new();
        recorder.success();
        recorder.duplicate();
        recorder.item_error();
        recorder.fetch_error();
        recorder.retry();

        let stats = recorder.snapshot();
        assert_eq!(stats.total_crawled, 3);
        assert_eq!(stats.error_count, 2);
        assert_eq!(stats.retries, 1);
    }

    #[test]
    fn duplicate_rate_is_a_percentage() {
        let stats = CrawlStats {
            success_count: 3,
            duplicate_count: 1,
            ..Default::default()
        };
        let dup = DuplicateStats::new(&stats, None);
        assert_eq!(dup.duplicate_rate, 25.0);
        assert_eq!(DuplicateStats::new(&CrawlStats::default(), None).duplicate_rate, 0.0);
    }
}
