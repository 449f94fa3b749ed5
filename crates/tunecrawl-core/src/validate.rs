//! Field validation, data clean-up and duplicate detection for scraped songs.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use chrono::Datelike;
use thiserror::Error;
use url::Url;

use crate::config::CrawlerConfig;
use crate::error::AppError;
use crate::models::CandidateSong;
use crate::traits::SongStore;

/// Why a candidate was discarded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("title is empty")]
    EmptyTitle,
    #[error("title length {len} outside [{min}, {max}]")]
    TitleLength { len: usize, min: usize, max: usize },
    #[error("artist is empty")]
    EmptyArtist,
    #[error("artist length {len} outside [{min}, {max}]")]
    ArtistLength { len: usize, min: usize, max: usize },
}

#[derive(Debug, Clone)]
pub struct Validator {
    pub min_title_length: usize,
    pub max_title_length: usize,
    pub min_artist_length: usize,
    pub max_artist_length: usize,
}

impl From<&CrawlerConfig> for Validator {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            min_title_length: config.min_title_length,
            max_title_length: config.max_title_length,
            min_artist_length: config.min_artist_length,
            max_artist_length: config.max_artist_length,
        }
    }
}

impl Validator {
    /// Check length bounds and normalize the candidate.
    ///
    /// Lengths are counted in characters after trimming. Empty optional
    /// fields become `None` and the fingerprint is computed.
    pub fn validate(&self, mut candidate: CandidateSong) -> Result<CandidateSong, Rejection> {
        candidate.title = candidate.title.trim().to_string();
        candidate.artist = candidate.artist.trim().to_string();

        if candidate.title.is_empty() {
            return Err(Rejection::EmptyTitle);
        }
        let len = candidate.title.chars().count();
        if len < self.min_title_length || len > self.max_title_length {
            return Err(Rejection::TitleLength {
                len,
                min: self.min_title_length,
                max: self.max_title_length,
            });
        }

        if candidate.artist.is_empty() {
            return Err(Rejection::EmptyArtist);
        }
        let len = candidate.artist.chars().count();
        if len < self.min_artist_length || len > self.max_artist_length {
            return Err(Rejection::ArtistLength {
                len,
                min: self.min_artist_length,
                max: self.max_artist_length,
            });
        }

        candidate.album = non_blank(candidate.album);
        candidate.genre = non_blank(candidate.genre);
        candidate.cover_url = non_blank(candidate.cover_url);
        candidate.raw_fingerprint = fingerprint(
            &candidate.title,
            &candidate.artist,
            candidate.album.as_deref(),
        );
        Ok(candidate)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Lower-case and collapse runs of whitespace into single spaces.
pub fn normalize_text(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deduplication key: normalized `title|artist`, plus `|album` if present.
pub fn fingerprint(title: &str, artist: &str, album: Option<&str>) -> String {
    let mut key = format!("{}|{}", normalize_text(title), normalize_text(artist));
    if let Some(album) = album.map(normalize_text).filter(|a| !a.is_empty()) {
        key.push('|');
        key.push_str(&album);
    }
    key
}

/// Clean up scraped fields before validation.
///
/// Collapses whitespace, strips control and zero-width characters,
/// resolves a relative cover URL against the source page and drops
/// implausible years and zero durations.
pub fn optimize(mut candidate: CandidateSong) -> CandidateSong {
    candidate.title = clean_text(&candidate.title);
    candidate.artist = clean_text(&candidate.artist);
    candidate.album = candidate.album.as_deref().map(clean_text);
    candidate.genre = candidate.genre.as_deref().map(clean_text);

    if let Some(cover) = candidate.cover_url.take() {
        candidate.cover_url = resolve_url(&candidate.source_url, cover.trim());
    }

    let max_year = chrono::Utc::now().year() + 1;
    candidate.year = candidate.year.filter(|y| (1900..=max_year).contains(y));
    candidate.duration_seconds = candidate.duration_seconds.filter(|d| *d > 0);
    candidate
}

fn clean_text(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .filter(|c| !matches!(c, '\u{200B}'..='\u{200D}' | '\u{FEFF}'))
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

fn resolve_url(base: &str, raw: &str) -> Option<String> {
    if raw.is_empty() {
        return None;
    }
    if let Ok(url) = Url::parse(raw) {
        return Some(url.to_string());
    }
    Url::parse(base)
        .and_then(|b| b.join(raw))
        .map(|u| u.to_string())
        .ok()
}

/// Token-set Jaccard similarity of two normalized strings.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: HashSet<&str> = a.split_whitespace().collect();
    let b: HashSet<&str> = b.split_whitespace().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let shared = a.intersection(&b).count();
    let union = a.union(&b).count();
    shared as f64 / union as f64
}

/// Result of a duplicate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DuplicateCheck {
    Unique,
    /// Seen earlier in the same job.
    InBatch,
    /// Already present in the catalog.
    InCatalog,
}

impl DuplicateCheck {
    pub fn is_duplicate(&self) -> bool {
        !matches!(self, DuplicateCheck::Unique)
    }
}

#[derive(Debug, Default)]
struct SeenSongs {
    fingerprints: HashSet<String>,
    /// Normalized titles per normalized artist, for near-duplicate checks.
    titles_by_artist: HashMap<String, Vec<String>>,
}

/// Per-job duplicate detector.
///
/// Within-job checks are serialized by a mutex; catalog lookups run
/// outside the lock so candidates are checked concurrently.
#[derive(Debug)]
pub struct Deduplicator {
    enabled: bool,
    threshold: f64,
    seen: Mutex<SeenSongs>,
}

impl Deduplicator {
    pub fn new(enabled: bool, threshold: f64) -> Self {
        Self {
            enabled,
            threshold,
            seen: Mutex::new(SeenSongs::default()),
        }
    }

    /// Record the candidate and report whether it duplicates an earlier
    /// candidate in this job or a song already in the catalog.
    pub async fn check<S: SongStore>(
        &self,
        candidate: &CandidateSong,
        catalog: &S,
    ) -> Result<DuplicateCheck, AppError> {
        if !self.enabled {
            return Ok(DuplicateCheck::Unique);
        }
        if self.seen_in_batch(candidate) {
            return Ok(DuplicateCheck::InBatch);
        }
        match catalog.find_by_fingerprint(&candidate.raw_fingerprint).await? {
            Some(_) => Ok(DuplicateCheck::InCatalog),
            None => Ok(DuplicateCheck::Unique),
        }
    }

    /// Returns true if an equivalent candidate was already recorded;
    /// otherwise records this one.
    fn seen_in_batch(&self, candidate: &CandidateSong) -> bool {
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        if !seen.fingerprints.insert(candidate.raw_fingerprint.clone()) {
            return true;
        }

        let artist = normalize_text(&candidate.artist);
        let title = normalize_text(&candidate.title);
        let titles = seen.titles_by_artist.entry(artist).or_default();
        let near = self.threshold < 1.0
            && titles
                .iter()
                .any(|other| similarity(other, &title) >= self.threshold);
        titles.push(title);
        near
    }

    /// Drop a candidate recorded by [`Deduplicator::check`] whose save did
    /// not go through, so a later copy in the same job is not mistaken for
    /// a duplicate of a song that was never stored.
    pub fn forget(&self, candidate: &CandidateSong) {
        if !self.enabled {
            return;
        }
        let mut seen = self.seen.lock().unwrap_or_else(|p| p.into_inner());
        if !seen.fingerprints.remove(&candidate.raw_fingerprint) {
            return;
        }
        let artist = normalize_text(&candidate.artist);
        let title = normalize_text(&candidate.title);
        if let Some(titles) = seen.titles_by_artist.get_mut(&artist)
            && let Some(pos) = titles.iter().position(|t| *t == title)
        {
            titles.swap_remove(pos);
        }
    }
}
