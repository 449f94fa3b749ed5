//! Crawl orchestration: one job at a time, paginated fetches, concurrent
//! per-song processing and the error-rate abort rule.
//!
//! ```text
//! start ──► pending ──► running ──► page 1 (alone)
//!                                     │ fails ──────────────► failed
//!                                     ▼
//!                       pages 2..=n, up to max_concurrent in flight
//!                         each page: parse ──► per-song task
//!                           optimize ──► validate ──► dedup ──► save
//!                                     │
//!               abort rule / stop ────┼─────────────────────► aborted
//!               quota exhausted ──────┼─────────────────────► failed
//!               queue empty, drained ─┴─────────────────────► completed
//! ```

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use futures::future::BoxFuture;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::cache::{CacheConfig, TtlCache};
use crate::config::CrawlerConfig;
use crate::error::AppError;
use crate::job::{CrawlJob, CrawlRequest, CrawlType, ErrorPolicy, JobStatus};
use crate::models::{CandidateSong, Page, ParsedPage};
use crate::rate_limit::{RateLimitConfig, RateLimiter};
use crate::report::{
    ConnectionReport, CrawlEvent, CrawlReporter, CrawlStats, DuplicateStats, ProgressSnapshot,
    StatsRecorder, TracingCrawlReporter,
};
use crate::retry::{FetchEvent, FetchObserver, RetryPolicy, RetryingFetcher};
use crate::traits::{CrawlControl, Fetcher, SongParser, SongStore};
use crate::validate::{Deduplicator, Validator, optimize};

/// URL of one listing page: `base_url/<crawl type>?page=<n>&limit=<per_page>`.
pub fn page_url(
    base_url: &str,
    crawl_type: CrawlType,
    page: usize,
    per_page: usize,
) -> Result<String, AppError> {
    let mut url = Url::parse(base_url)
        .map_err(|e| AppError::ConfigError(format!("Invalid base URL '{base_url}': {e}")))?;
    url.path_segments_mut()
        .map_err(|_| AppError::ConfigError(format!("Base URL '{base_url}' cannot have a path")))?
        .pop_if_empty()
        .push(crawl_type.as_str());
    url.query_pairs_mut()
        .append_pair("page", &page.to_string())
        .append_pair("limit", &per_page.to_string());
    Ok(url.to_string())
}

/// Terminal outcome of one candidate song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ItemOutcome {
    Persisted,
    Duplicate,
    Error,
}

#[derive(Debug)]
struct TrackerState {
    job: CrawlJob,
    /// Candidates accepted for processing so far, at most the limit.
    claimed: usize,
    /// Last page still worth fetching.
    last_page: usize,
}

/// Shared state of one running job. All counter updates go through the
/// tracker mutex.
struct JobRun {
    state: Mutex<TrackerState>,
    request: CrawlRequest,
    per_page: usize,
    policy: ErrorPolicy,
    dedup: Deduplicator,
    cancel: CancellationToken,
    done: CancellationToken,
}

impl JobRun {
    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned job tracker mutex");
            poisoned.into_inner()
        })
    }

    fn job(&self) -> CrawlJob {
        self.lock().job.clone()
    }

    fn id(&self) -> uuid::Uuid {
        self.lock().job.id
    }

    fn transition(&self, status: JobStatus, message: impl Into<String>) -> bool {
        let changed = self.lock().job.transition(status, message);
        if changed && status.is_terminal() {
            self.cancel.cancel();
        }
        changed
    }

    /// Reserve up to `available` candidates within the expected total.
    fn claim(&self, available: usize) -> usize {
        let mut state = self.lock();
        let cap = (state.job.total as usize).min(self.request.limit);
        let granted = available.min(cap.saturating_sub(state.claimed));
        state.claimed += granted;
        granted
    }

    fn page_fetched(&self, page: usize, found: usize, total_available: Option<usize>) {
        let mut state = self.lock();
        state.job.pages_fetched += 1;

        if let Some(available) = total_available {
            let available = available.min(self.request.limit);
            state.job.total = state.job.total.min(available as u64);
            state.last_page = state.last_page.min(available.div_ceil(self.per_page).max(1));
        }
        if found < self.per_page && page < state.last_page {
            tracing::debug!(page, found, "Short page ends pagination");
            state.last_page = page;
            let expected = ((page - 1) * self.per_page + found).min(self.request.limit);
            state.job.total = state.job.total.min(expected as u64);
        }
        // Pages already claimed past a revised total still get processed.
        state.job.total = state.job.total.max(state.claimed as u64);
    }

    fn should_dispatch(&self, page: usize) -> bool {
        let state = self.lock();
        state.job.status == JobStatus::Running && page <= state.last_page
    }

    /// Count one item outcome and apply the abort rule.
    fn record(&self, outcome: ItemOutcome) {
        let mut state = self.lock();
        let job = &mut state.job;
        job.current += 1;
        match outcome {
            ItemOutcome::Persisted => job.success_count += 1,
            ItemOutcome::Duplicate => job.duplicate_count += 1,
            ItemOutcome::Error => job.error_count += 1,
        }
        if outcome == ItemOutcome::Error {
            self.check_abort(&mut state);
        }
    }

    /// A page that could not be fetched or parsed.
    fn record_page_failure(&self) {
        let mut state = self.lock();
        state.job.error_count += 1;
        self.check_abort(&mut state);
    }

    fn check_abort(&self, state: &mut TrackerState) {
        let job = &mut state.job;
        if job.status != JobStatus::Running
            || !self.policy.should_abort(job.success_count, job.error_count)
        {
            return;
        }
        let processed = job.success_count + job.error_count;
        let message = format!(
            "Aborted: {} errors out of {} processed songs exceeds the error threshold of {}",
            job.error_count, processed, self.policy.threshold
        );
        tracing::warn!(job_id = %job.id, errors = job.error_count, processed, "Error threshold exceeded");
        job.transition(JobStatus::Aborted, message);
        self.cancel.cancel();
    }
}

/// Routes fetch events into the cumulative stats.
struct StatsObserver<'a> {
    stats: &'a StatsRecorder,
}

impl FetchObserver for StatsObserver<'_> {
    fn observe(&self, event: FetchEvent<'_>) {
        match event {
            FetchEvent::CacheHit { url } => {
                self.stats.cache_hit();
                tracing::debug!(%url, "Page served from cache");
            }
            FetchEvent::Retrying {
                url,
                attempt,
                error,
                delay,
            } => {
                self.stats.retry();
                tracing::warn!(%url, attempt, %error, delay_ms = delay.as_millis() as u64, "Retrying fetch");
            }
            FetchEvent::Succeeded { url, attempts } => {
                tracing::debug!(%url, attempts, "Fetch succeeded");
            }
            FetchEvent::Failed {
                url,
                attempts,
                error,
            } => {
                tracing::warn!(%url, attempts, %error, "Fetch failed");
            }
        }
    }
}

struct CrawlerInner<F, P, S> {
    config: CrawlerConfig,
    fetcher: RetryingFetcher<F>,
    parser: P,
    store: S,
    validator: Validator,
    policy: ErrorPolicy,
    stats: StatsRecorder,
    reporter: Arc<dyn CrawlReporter>,
    current: Mutex<Option<Arc<JobRun>>>,
}

/// Runs crawl jobs against a listing source and persists the results.
///
/// Cloning yields another handle to the same crawler.
pub struct Crawler<F, P, S> {
    inner: Arc<CrawlerInner<F, P, S>>,
}

impl<F, P, S> Clone for Crawler<F, P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<F, P, S> Crawler<F, P, S>
where
    F: Fetcher,
    P: SongParser,
    S: SongStore,
{
    pub fn new(config: CrawlerConfig, fetcher: F, parser: P, store: S) -> Self {
        Self::with_reporter(config, fetcher, parser, store, Arc::new(TracingCrawlReporter))
    }

    pub fn with_reporter(
        config: CrawlerConfig,
        fetcher: F,
        parser: P,
        store: S,
        reporter: Arc<dyn CrawlReporter>,
    ) -> Self {
        let limiter = RateLimiter::new(RateLimitConfig::from(&config));
        let mut fetcher = RetryingFetcher::new(fetcher, limiter, RetryPolicy::from(&config));
        if config.enable_cache {
            fetcher = fetcher.with_cache(TtlCache::new(CacheConfig {
                default_ttl: config.cache_expiry,
                max_items: config.cache_max_items,
                check_period: config.cache_check_period,
            }));
        }

        Self {
            inner: Arc::new(CrawlerInner {
                validator: Validator::from(&config),
                policy: ErrorPolicy::from(&config),
                fetcher,
                parser,
                store,
                stats: StatsRecorder::new(),
                reporter,
                current: Mutex::new(None),
                config,
            }),
        }
    }

    pub fn config(&self) -> &CrawlerConfig {
        &self.inner.config
    }

    pub fn store(&self) -> &S {
        &self.inner.store
    }

    pub fn limiter(&self) -> &RateLimiter {
        self.inner.fetcher.limiter()
    }

    /// Start the page cache's expiry sweeper, if caching is enabled.
    pub fn spawn_maintenance(&self) {
        if let Some(cache) = self.inner.fetcher.cache() {
            cache.start();
        }
    }

    /// Stop background maintenance and the active job, if any.
    pub fn shutdown(&self) {
        self.stop_job();
        if let Some(cache) = self.inner.fetcher.cache() {
            cache.stop();
        }
    }

    /// Accept a new job and run it in the background.
    pub fn start_job(&self, request: CrawlRequest) -> Result<CrawlJob, AppError> {
        request.validate()?;

        let mut current = self.lock_current();
        if let Some(active) = current.as_ref()
            && !active.done.is_cancelled()
        {
            let job = active.job();
            return Err(if job.status.is_terminal() {
                AppError::JobDraining(job.id)
            } else {
                AppError::JobConflict(job.id)
            });
        }

        let per_page = self.inner.config.max_songs_per_request.min(request.limit).max(1);
        let last_page = request.page_count(per_page);
        let job = CrawlJob::new(&request);
        let run = Arc::new(JobRun {
            state: Mutex::new(TrackerState {
                job: job.clone(),
                claimed: 0,
                last_page,
            }),
            dedup: Deduplicator::new(
                request.enable_duplicate_detection,
                request.duplicate_threshold,
            ),
            request,
            per_page,
            policy: self.inner.policy,
            cancel: CancellationToken::new(),
            done: CancellationToken::new(),
        });
        *current = Some(Arc::clone(&run));
        drop(current);

        self.inner.stats.job_started();
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            Self::run_job(&inner, &run).await;
            run.done.cancel();
        });

        Ok(job)
    }

    /// Abort the active job. In-flight work drains in the background.
    pub fn stop_job(&self) -> Option<CrawlJob> {
        let run = self.lock_current().clone()?;
        if run.transition(JobStatus::Aborted, "Stopped by request") {
            tracing::info!(job_id = %run.id(), "Crawl job stopped by request");
            Some(run.job())
        } else {
            None
        }
    }

    /// Wait until the current job has fully drained and return it.
    pub async fn wait(&self) -> Option<CrawlJob> {
        let run = self.lock_current().clone()?;
        run.done.cancelled().await;
        Some(run.job())
    }

    /// The current or most recent job.
    pub fn current_job(&self) -> Option<CrawlJob> {
        self.lock_current().as_ref().map(|run| run.job())
    }

    pub fn progress(&self) -> ProgressSnapshot {
        self.current_job()
            .map(|job| ProgressSnapshot::from(&job))
            .unwrap_or_else(ProgressSnapshot::idle)
    }

    pub fn crawl_stats(&self) -> CrawlStats {
        let mut stats = self.inner.stats.snapshot();
        stats.quota_remaining = self.inner.fetcher.limiter().quota_remaining();
        stats.cached_pages = self
            .inner
            .fetcher
            .cache()
            .map_or(0, |cache| cache.stats().size);
        stats
    }

    pub fn duplicates(&self) -> DuplicateStats {
        DuplicateStats::new(&self.inner.stats.snapshot(), self.current_job().as_ref())
    }

    /// Probe the base URL with a single request.
    pub async fn probe(&self) -> ConnectionReport {
        let url = self.inner.config.base_url.clone();
        let started = Instant::now();
        let result = self.inner.fetcher.probe(&url).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(_) => ConnectionReport {
                url,
                reachable: true,
                status: None,
                message: "Connection successful".to_string(),
                elapsed_ms,
            },
            Err(error) => {
                tracing::warn!(%url, %error, "Connection test failed");
                let status = match &error {
                    AppError::HttpStatus { status, .. } => Some(*status),
                    _ => None,
                };
                ConnectionReport {
                    url,
                    reachable: false,
                    status,
                    message: error.to_string(),
                    elapsed_ms,
                }
            }
        }
    }

    fn lock_current(&self) -> MutexGuard<'_, Option<Arc<JobRun>>> {
        self.inner.current.lock().unwrap_or_else(|poisoned| {
            tracing::warn!("Recovered from poisoned crawler mutex");
            poisoned.into_inner()
        })
    }

    async fn run_job(inner: &Arc<CrawlerInner<F, P, S>>, run: &Arc<JobRun>) {
        let crawl_type = run.request.crawl_type;
        if !run.transition(
            JobStatus::Running,
            format!("Crawling {} {} songs", run.request.limit, crawl_type),
        ) {
            // Stopped before it got going.
            Self::finish(inner, run);
            return;
        }
        inner.reporter.report(CrawlEvent::JobStarted { job: &run.job() });

        // The first page is fetched alone; failing it is a setup error.
        match Self::crawl_page(inner, run, 1).await {
            Ok(()) => {}
            Err(AppError::QuotaExceeded { limit }) => {
                run.transition(JobStatus::Failed, quota_message(limit));
            }
            Err(error) => {
                inner.stats.fetch_error();
                run.lock().job.error_count += 1;
                run.transition(
                    JobStatus::Failed,
                    format!("Failed to fetch first page: {error}"),
                );
            }
        }

        let max_concurrent = inner.config.max_concurrent.max(1);
        let mut next_page = 2;
        let mut pages = JoinSet::new();
        loop {
            while pages.len() < max_concurrent && run.should_dispatch(next_page) {
                let page = next_page;
                next_page += 1;
                let inner = Arc::clone(inner);
                let run = Arc::clone(run);
                pages.spawn(async move { Self::crawl_page(&inner, &run, page).await });
            }

            match pages.join_next().await {
                None => break,
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(AppError::QuotaExceeded { limit }))) => {
                    run.transition(JobStatus::Failed, quota_message(limit));
                }
                Some(Ok(Err(_))) => {
                    inner.stats.fetch_error();
                    run.record_page_failure();
                }
                Some(Err(e)) => {
                    tracing::error!(error = %e, "Page task panicked");
                    inner.stats.fetch_error();
                    run.record_page_failure();
                }
            }
        }

        Self::finish(inner, run);
    }

    fn finish(inner: &Arc<CrawlerInner<F, P, S>>, run: &Arc<JobRun>) {
        let summary = {
            let state = run.lock();
            format!(
                "Crawled {} songs: {} saved, {} duplicates, {} errors",
                state.job.current,
                state.job.success_count,
                state.job.duplicate_count,
                state.job.error_count
            )
        };
        run.transition(JobStatus::Completed, summary);
        inner
            .reporter
            .report(CrawlEvent::JobFinished { job: &run.job() });
    }

    /// Fetch and parse one page, then process its songs concurrently.
    /// Fetch and parse failures are returned to the dispatcher.
    async fn crawl_page(
        inner: &Arc<CrawlerInner<F, P, S>>,
        run: &Arc<JobRun>,
        page: usize,
    ) -> Result<(), AppError> {
        let job_id = run.id();
        let url = page_url(
            &inner.config.base_url,
            run.request.crawl_type,
            page,
            run.per_page,
        )?;

        let parsed = match Self::fetch_and_parse(inner, &url).await {
            Ok(parsed) => parsed,
            Err(error) => {
                inner.reporter.report(CrawlEvent::PageFailed {
                    job_id,
                    url: &url,
                    error: &error.to_string(),
                });
                return Err(error);
            }
        };

        let found = parsed.songs.len();
        inner.stats.page_fetched();
        run.page_fetched(page, found, parsed.total_available);
        inner.reporter.report(CrawlEvent::PageFetched {
            job_id,
            url: &url,
            songs: found,
        });

        // No new song tasks once the job has stopped.
        if run.cancel.is_cancelled() {
            return Ok(());
        }
        let granted = run.claim(found);
        let mut items = JoinSet::new();
        for candidate in parsed.songs.into_iter().take(granted) {
            let inner = Arc::clone(inner);
            let run = Arc::clone(run);
            items.spawn(async move {
                let outcome = Self::process_song(&inner, &run, candidate).await;
                run.record(outcome);
            });
        }
        while let Some(result) = items.join_next().await {
            if let Err(e) = result {
                tracing::error!(%job_id, error = %e, "Song task panicked");
                inner.stats.item_error();
                run.record(ItemOutcome::Error);
            }
        }
        Ok(())
    }

    async fn fetch_and_parse(
        inner: &CrawlerInner<F, P, S>,
        url: &str,
    ) -> Result<ParsedPage, AppError> {
        let observer = StatsObserver {
            stats: &inner.stats,
        };
        let page: Page = inner.fetcher.fetch(url, &observer).await?;
        inner.parser.parse(&page)
    }

    async fn process_song(
        inner: &CrawlerInner<F, P, S>,
        run: &JobRun,
        candidate: CandidateSong,
    ) -> ItemOutcome {
        let job_id = run.id();
        let candidate = if run.request.enable_data_optimization {
            optimize(candidate)
        } else {
            candidate
        };

        let song = match inner.validator.validate(candidate.clone()) {
            Ok(song) => song,
            Err(rejection) => {
                inner.stats.item_error();
                inner.reporter.report(CrawlEvent::SongRejected {
                    job_id,
                    title: &candidate.title,
                    reason: &rejection.to_string(),
                });
                return ItemOutcome::Error;
            }
        };

        match run.dedup.check(&song, &inner.store).await {
            Ok(check) if check.is_duplicate() => {
                return Self::duplicate(inner, job_id, &song);
            }
            Ok(_) => {}
            Err(error) => {
                tracing::warn!(%job_id, %error, "Duplicate lookup failed");
                run.dedup.forget(&song);
                inner.stats.item_error();
                return ItemOutcome::Error;
            }
        }

        match inner.store.save_song(&song).await {
            Ok(_) => {
                inner.stats.success();
                inner.reporter.report(CrawlEvent::SongPersisted {
                    job_id,
                    title: &song.title,
                    artist: &song.artist,
                });
                ItemOutcome::Persisted
            }
            Err(AppError::Duplicate { .. }) => Self::duplicate(inner, job_id, &song),
            Err(error) => {
                tracing::warn!(%job_id, title = %song.title, %error, "Failed to save song");
                run.dedup.forget(&song);
                inner.stats.item_error();
                ItemOutcome::Error
            }
        }
    }

    fn duplicate(
        inner: &CrawlerInner<F, P, S>,
        job_id: uuid::Uuid,
        song: &CandidateSong,
    ) -> ItemOutcome {
        inner.stats.duplicate();
        inner.reporter.report(CrawlEvent::DuplicateSkipped {
            job_id,
            fingerprint: &song.raw_fingerprint,
        });
        ItemOutcome::Duplicate
    }
}

fn quota_message(limit: u32) -> String {
    format!("Daily request quota of {limit} exhausted; crawl stopped")
}

impl<F, P, S> CrawlControl for Crawler<F, P, S>
where
    F: Fetcher,
    P: SongParser,
    S: SongStore,
{
    fn start(&self, request: CrawlRequest) -> Result<CrawlJob, AppError> {
        self.start_job(request)
    }

    fn stop(&self) -> Option<CrawlJob> {
        self.stop_job()
    }

    fn snapshot(&self) -> ProgressSnapshot {
        self.progress()
    }

    fn stats(&self) -> CrawlStats {
        self.crawl_stats()
    }

    fn duplicate_stats(&self) -> DuplicateStats {
        self.duplicates()
    }

    fn config(&self) -> &CrawlerConfig {
        &self.inner.config
    }

    fn test_connection(&self) -> BoxFuture<'_, ConnectionReport> {
        Box::pin(self.probe())
    }
}
