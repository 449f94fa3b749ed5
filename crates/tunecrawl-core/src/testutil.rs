//! Test utilities: mock implementations of the core traits.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::Semaphore;

use crate::error::AppError;
use crate::models::{CandidateSong, Page, ParsedPage};
use crate::report::{CrawlEvent, CrawlReporter};
use crate::retry::{FetchEvent, FetchObserver};
use crate::traits::{Fetcher, SongParser};

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

/// Mock fetcher with per-URL response queues.
///
/// Each call pops the next response queued for its URL, then falls back to
/// the shared queue, and finally answers `404`.
#[derive(Clone, Default)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, VecDeque<Result<String, AppError>>>>>,
    fallback: Arc<Mutex<VecDeque<Result<String, AppError>>>>,
    calls: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    in_flight: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl MockFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Responses served in order regardless of URL.
    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        let fetcher = Self::default();
        fetcher.fallback.lock().unwrap().extend(responses);
        fetcher
    }

    /// Queue a response for one URL.
    pub fn route(self, url: &str, response: Result<String, AppError>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
        self
    }

    /// Hold every fetch for `delay` before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Block every fetch until the semaphore hands out a permit.
    pub fn with_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of fetches observed running at once.
    pub fn peak_in_flight(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn next_response(&self, url: &str) -> Result<String, AppError> {
        if let Some(response) = self
            .routes
            .lock()
            .unwrap()
            .get_mut(url)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }
        self.fallback
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| {
                Err(AppError::HttpStatus {
                    status: 404,
                    url: url.to_string(),
                })
            })
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            let _permit = gate.acquire().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.next_response(url)
    }
}

// ---------------------------------------------------------------------------
// MockParser
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(untagged)]
enum Feed {
    List(Vec<CandidateSong>),
    Envelope {
        songs: Vec<CandidateSong>,
        total: Option<usize>,
    },
}

/// Parser reading a JSON array of songs, or `{"songs": [...], "total": n}`.
#[derive(Clone, Default)]
pub struct MockParser;

impl SongParser for MockParser {
    fn parse(&self, page: &Page) -> Result<ParsedPage, AppError> {
        let feed: Feed = serde_json::from_str(&page.body)
            .map_err(|e| AppError::ParseError(e.to_string()))?;
        let (mut songs, total) = match feed {
            Feed::List(songs) => (songs, None),
            Feed::Envelope { songs, total } => (songs, total),
        };
        for song in &mut songs {
            song.source_url = page.url.clone();
        }
        Ok(ParsedPage {
            songs,
            total_available: total,
        })
    }
}

/// JSON body with `count` distinct valid songs.
pub fn songs_body(prefix: &str, count: usize) -> String {
    let songs: Vec<_> = (0..count)
        .map(|i| CandidateSong::new(format!("{prefix} song {i}"), "Test Artist", ""))
        .collect();
    serde_json::to_string(&songs).unwrap()
}

/// JSON body with `count` songs that fail validation (blank titles).
pub fn invalid_songs_body(count: usize) -> String {
    let songs: Vec<_> = (0..count)
        .map(|_| CandidateSong::new("   ", "Test Artist", ""))
        .collect();
    serde_json::to_string(&songs).unwrap()
}

/// JSON body mixing `valid` good songs followed by `invalid` bad ones.
pub fn mixed_songs_body(prefix: &str, valid: usize, invalid: usize) -> String {
    let songs: Vec<_> = (0..valid)
        .map(|i| CandidateSong::new(format!("{prefix} song {i}"), "Test Artist", ""))
        .chain((0..invalid).map(|_| CandidateSong::new("", "Test Artist", "")))
        .collect();
    serde_json::to_string(&songs).unwrap()
}

// ---------------------------------------------------------------------------
// Recorders
// ---------------------------------------------------------------------------

/// Fetch observer that records events as short strings.
#[derive(Clone, Default)]
pub struct RecordingObserver {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.starts_with(prefix))
            .count()
    }
}

impl FetchObserver for RecordingObserver {
    fn observe(&self, event: FetchEvent<'_>) {
        let line = match event {
            FetchEvent::CacheHit { .. } => "cache_hit".to_string(),
            FetchEvent::Retrying { attempt, .. } => format!("retrying:{attempt}"),
            FetchEvent::Succeeded { attempts, .. } => format!("succeeded:{attempts}"),
            FetchEvent::Failed { attempts, .. } => format!("failed:{attempts}"),
        };
        self.events.lock().unwrap().push(line);
    }
}

/// Crawl reporter that records event names.
#[derive(Clone, Default)]
pub struct RecordingReporter {
    events: Arc<Mutex<Vec<String>>>,
}

impl RecordingReporter {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.as_str() == name)
            .count()
    }
}

impl CrawlReporter for RecordingReporter {
    fn report(&self, event: CrawlEvent<'_>) {
        let name = match event {
            CrawlEvent::JobStarted { .. } => "job_started",
            CrawlEvent::PageFetched { .. } => "page_fetched",
            CrawlEvent::PageFailed { .. } => "page_failed",
            CrawlEvent::SongRejected { .. } => "song_rejected",
            CrawlEvent::SongPersisted { .. } => "song_persisted",
            CrawlEvent::DuplicateSkipped { .. } => "duplicate_skipped",
            CrawlEvent::JobFinished { .. } => "job_finished",
        };
        self.events.lock().unwrap().push(name.to_string());
    }
}
