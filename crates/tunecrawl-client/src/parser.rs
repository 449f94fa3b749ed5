//! Song extraction from listing pages.
//!
//! Two page shapes are understood:
//!
//! - JSON feeds: a bare array of songs, or `{"songs": [...], "total": n}`.
//! - HTML pages carrying schema.org `MusicRecording` JSON-LD, either as
//!   standalone blocks or inside `ItemList`, `MusicPlaylist` or `@graph`.
//!
//! Field names are matched loosely (`title`/`name`, `artist`/`byArtist`,
//! nested `{"name": ..}` objects) since feeds disagree on spelling.

use scraper::{Html, Selector};
use serde_json::Value;
use tunecrawl_core::error::AppError;
use tunecrawl_core::models::{CandidateSong, Page, ParsedPage};
use tunecrawl_core::traits::SongParser;

#[derive(Debug, Clone, Default)]
pub struct StructuredDataParser;

impl StructuredDataParser {
    pub fn new() -> Self {
        Self
    }
}

impl SongParser for StructuredDataParser {
    fn parse(&self, page: &Page) -> Result<ParsedPage, AppError> {
        let body = page.body.trim_start();
        if body.starts_with('[') || body.starts_with('{') {
            let value: Value = serde_json::from_str(body)
                .map_err(|e| AppError::ParseError(format!("Invalid JSON feed from {}: {e}", page.url)))?;
            return Ok(parse_feed(&value, &page.url));
        }
        Ok(parse_html(body, &page.url))
    }
}

fn parse_feed(value: &Value, source_url: &str) -> ParsedPage {
    match value {
        Value::Array(items) => ParsedPage::new(songs_from(items, source_url)),
        Value::Object(map) => {
            let items = ["songs", "items", "data"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_array));
            let songs = items
                .map(|items| songs_from(items, source_url))
                .unwrap_or_default();
            let total = ["total", "totalCount", "total_count"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_u64));
            ParsedPage {
                songs,
                total_available: total.map(|t| t as usize),
            }
        }
        _ => ParsedPage::default(),
    }
}

fn songs_from(items: &[Value], source_url: &str) -> Vec<CandidateSong> {
    items
        .iter()
        .filter(|item| item.is_object())
        .map(|item| song_from(item, source_url))
        .collect()
}

fn parse_html(html: &str, source_url: &str) -> ParsedPage {
    let document = Html::parse_document(html);
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return ParsedPage::default();
    };

    let mut parsed = ParsedPage::default();
    for script in document.select(&selector) {
        let text = script.text().collect::<String>();
        match serde_json::from_str::<Value>(text.trim()) {
            Ok(value) => collect_recordings(&value, source_url, &mut parsed),
            Err(e) => {
                tracing::debug!(url = %source_url, error = %e, "Skipping malformed JSON-LD block");
            }
        }
    }
    parsed
}

fn collect_recordings(value: &Value, source_url: &str, out: &mut ParsedPage) {
    match value {
        Value::Array(items) => {
            for item in items {
                collect_recordings(item, source_url, out);
            }
        }
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                collect_recordings(graph, source_url, out);
            }
            if has_type(value, "MusicRecording") {
                out.songs.push(song_from(value, source_url));
                return;
            }
            if has_type(value, "ItemList") {
                if let Some(count) = map.get("numberOfItems").and_then(Value::as_u64) {
                    out.total_available = Some(count as usize);
                }
                if let Some(elements) = map.get("itemListElement") {
                    for element in as_list(elements) {
                        let item = element.get("item").unwrap_or(element);
                        collect_recordings(item, source_url, out);
                    }
                }
            }
            if has_type(value, "MusicPlaylist") || has_type(value, "MusicAlbum") {
                if let Some(tracks) = map.get("track") {
                    for track in as_list(tracks) {
                        let item = track.get("item").unwrap_or(track);
                        collect_recordings(item, source_url, out);
                    }
                }
            }
        }
        _ => {}
    }
}

fn has_type(value: &Value, wanted: &str) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t == wanted,
        Some(Value::Array(types)) => types.iter().any(|t| t.as_str() == Some(wanted)),
        _ => false,
    }
}

fn as_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        other => vec![other],
    }
}

fn song_from(item: &Value, source_url: &str) -> CandidateSong {
    let title = first_text(item, &["title", "name"]).unwrap_or_default();
    let artist = first_text(item, &["artist", "byArtist", "artistName", "singer"]).unwrap_or_default();
    let mut song = CandidateSong::new(title, artist, source_url);

    song.album = first_text(item, &["album", "inAlbum", "albumName"]);
    song.cover_url = first_text(item, &["coverUrl", "cover", "image", "thumbnailUrl"]);
    song.genre = first_text(item, &["genre"]);
    song.duration_seconds = ["durationSeconds", "duration_seconds", "duration"]
        .iter()
        .find_map(|key| item.get(*key).and_then(duration_value));
    song.year = ["year", "datePublished", "releaseDate"]
        .iter()
        .find_map(|key| item.get(*key).and_then(year_value));
    song
}

/// First non-empty text under any of `keys`. Objects contribute their
/// `name`, arrays their first textual element.
fn first_text(item: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| item.get(*key).and_then(text_value))
}

fn text_value(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("name")
            .or_else(|| map.get("url"))
            .and_then(text_value),
        Value::Array(items) => items.iter().find_map(text_value),
        _ => None,
    }
}

fn duration_value(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n.as_f64().and_then(whole_seconds),
        Value::String(s) => parse_iso8601_duration(s).or_else(|| parse_clock(s)),
        _ => None,
    }
}

fn year_value(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        Value::String(s) => s.get(..4).and_then(|y| y.parse().ok()),
        _ => None,
    }
}

/// Parse an ISO-8601 duration such as `PT3M45S` or `PT1H2M` into seconds.
/// Fractional seconds are truncated.
pub fn parse_iso8601_duration(raw: &str) -> Option<u32> {
    let rest = raw.trim().strip_prefix('P')?;
    let (days, time) = match rest.split_once('T') {
        Some((days, time)) => (days, time),
        None => (rest, ""),
    };

    let mut total = 0f64;
    let mut number = String::new();
    let mut seen_unit = false;
    for (part, is_time) in [(days, false), (time, true)] {
        for c in part.chars() {
            if c.is_ascii_digit() || c == '.' {
                number.push(c);
                continue;
            }
            let value: f64 = number.parse().ok()?;
            number.clear();
            seen_unit = true;
            total += value
                * match (c, is_time) {
                    ('D', false) => 86_400.0,
                    ('W', false) => 604_800.0,
                    ('H', true) => 3_600.0,
                    ('M', true) => 60.0,
                    ('S', true) => 1.0,
                    _ => return None,
                };
        }
        if !number.is_empty() {
            return None;
        }
    }
    if !seen_unit {
        return None;
    }
    whole_seconds(total)
}

/// Truncate to whole seconds; `None` when negative or beyond `u32`.
fn whole_seconds(secs: f64) -> Option<u32> {
    (secs.is_finite() && (0.0..=f64::from(u32::MAX)).contains(&secs)).then_some(secs as u32)
}

/// Parse `m:ss` or `h:mm:ss` into seconds.
fn parse_clock(raw: &str) -> Option<u32> {
    let parts: Vec<u32> = raw
        .trim()
        .split(':')
        .map(|p| p.parse().ok())
        .collect::<Option<_>>()?;
    match parts.as_slice() {
        [m, s] => m.checked_mul(60)?.checked_add(*s),
        [h, m, s] => h
            .checked_mul(3_600)?
            .checked_add(m.checked_mul(60)?)?
            .checked_add(*s),
        _ => None,
    }
}
