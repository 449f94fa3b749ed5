use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::config::CrawlerConfig;
use crate::error::AppError;
use crate::job::{CrawlJob, CrawlRequest};
use crate::models::{CandidateSong, Page, ParsedPage, SongId};
use crate::report::{ConnectionReport, CrawlStats, DuplicateStats, ProgressSnapshot};

/// Fetches the raw body of a URL.
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Turns a fetched page into candidate songs.
///
/// Site-specific knowledge lives behind this trait; the crawler only
/// sees the resulting candidates.
pub trait SongParser: Send + Sync + Clone + 'static {
    fn parse(&self, page: &Page) -> Result<ParsedPage, AppError>;
}

/// Persistence and lookup interface of the song catalog.
pub trait SongStore: Send + Sync + Clone + 'static {
    /// Persist a validated song. A fingerprint collision is reported as
    /// [`AppError::Duplicate`].
    fn save_song(
        &self,
        song: &CandidateSong,
    ) -> impl Future<Output = Result<SongId, AppError>> + Send;

    fn find_by_fingerprint(
        &self,
        fingerprint: &str,
    ) -> impl Future<Output = Result<Option<SongId>, AppError>> + Send;
}

/// Object-safe control surface of a crawler, used by the HTTP layer.
pub trait CrawlControl: Send + Sync {
    /// Accept a new crawl job. Fails with [`AppError::JobConflict`] while
    /// another job is active, or [`AppError::JobDraining`] while a stopped
    /// job is still finishing its in-flight work.
    fn start(&self, request: CrawlRequest) -> Result<CrawlJob, AppError>;

    /// Stop the active job. Returns the job if one was active.
    fn stop(&self) -> Option<CrawlJob>;

    fn snapshot(&self) -> ProgressSnapshot;

    fn stats(&self) -> CrawlStats;

    fn duplicate_stats(&self) -> DuplicateStats;

    fn config(&self) -> &CrawlerConfig;

    /// Probe `base_url` once.
    fn test_connection(&self) -> BoxFuture<'_, ConnectionReport>;
}

/// In-memory catalog, for dry runs and tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    songs: Arc<Mutex<HashMap<String, (SongId, CandidateSong)>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate the catalog with an existing song.
    pub fn with_song(self, song: CandidateSong) -> Self {
        self.lock()
            .insert(song.raw_fingerprint.clone(), (Uuid::new_v4(), song));
        self
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn songs(&self) -> Vec<CandidateSong> {
        self.lock().values().map(|(_, song)| song.clone()).collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, (SongId, CandidateSong)>> {
        self.songs.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl SongStore for MemoryCatalog {
    async fn save_song(&self, song: &CandidateSong) -> Result<SongId, AppError> {
        let mut songs = self.lock();
        if songs.contains_key(&song.raw_fingerprint) {
            return Err(AppError::Duplicate {
                fingerprint: song.raw_fingerprint.clone(),
            });
        }
        let id = Uuid::new_v4();
        songs.insert(song.raw_fingerprint.clone(), (id, song.clone()));
        Ok(id)
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<SongId>, AppError> {
        Ok(self.lock().get(fingerprint).map(|(id, _)| *id))
    }
}
