use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Identifier of a song persisted in the catalog.
pub type SongId = Uuid;

/// A song scraped from a page, before validation and deduplication.
///
/// `raw_fingerprint` is filled in by the validator; parsers may leave it
/// empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateSong {
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<u32>,
    #[serde(default)]
    pub cover_url: Option<String>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub year: Option<i32>,
    #[serde(default)]
    pub source_url: String,
    #[serde(default)]
    pub raw_fingerprint: String,
}

impl CandidateSong {
    pub fn new(
        title: impl Into<String>,
        artist: impl Into<String>,
        source_url: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            artist: artist.into(),
            album: None,
            duration_seconds: None,
            cover_url: None,
            genre: None,
            year: None,
            source_url: source_url.into(),
            raw_fingerprint: String::new(),
        }
    }

    pub fn with_album(mut self, album: impl Into<String>) -> Self {
        self.album = Some(album.into());
        self
    }

    pub fn with_duration(mut self, seconds: u32) -> Self {
        self.duration_seconds = Some(seconds);
        self
    }

    pub fn with_cover_url(mut self, url: impl Into<String>) -> Self {
        self.cover_url = Some(url.into());
        self
    }

    pub fn with_genre(mut self, genre: impl Into<String>) -> Self {
        self.genre = Some(genre.into());
        self
    }

    pub fn with_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }
}

/// A fetched page as handed to the parser and kept in the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub url: String,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
}

impl Page {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            body: body.into(),
            fetched_at: Utc::now(),
        }
    }
}

/// Songs extracted from one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedPage {
    pub songs: Vec<CandidateSong>,
    /// Total number of songs the source reports as available, if it says.
    pub total_available: Option<usize>,
}

impl ParsedPage {
    pub fn new(songs: Vec<CandidateSong>) -> Self {
        Self {
            songs,
            total_available: None,
        }
    }

    pub fn with_total_available(mut self, total: usize) -> Self {
        self.total_available = Some(total);
        self
    }
}

/// Compute a SHA-256 hash of a string, returned as 64-char hex.
pub fn compute_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}
