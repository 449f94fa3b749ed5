use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Pool, Postgres};
use tunecrawl_core::error::AppError;
use tunecrawl_core::models::{CandidateSong, SongId, compute_hash};
use tunecrawl_core::traits::SongStore;
use uuid::Uuid;

/// A song as stored in the catalog.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSong {
    pub id: Uuid,
    pub title: String,
    pub artist: String,
    pub album: Option<String>,
    pub duration_seconds: Option<i32>,
    pub cover_url: Option<String>,
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub source_url: String,
    pub fingerprint: String,
    pub created_at: DateTime<Utc>,
}

/// Repository for song persistence in PostgreSQL.
///
/// Songs are unique by the SHA-256 of their fingerprint.
#[derive(Clone)]
pub struct SongRepository {
    pool: Pool<Postgres>,
}

impl SongRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a validated song. A fingerprint collision returns
    /// [`AppError::Duplicate`] and leaves the existing row untouched.
    pub async fn save(&self, song: &CandidateSong) -> Result<Uuid, AppError> {
        let row: Option<(Uuid,)> = sqlx::query_as(
            r#"
            INSERT INTO songs (title, artist, album, duration_seconds, cover_url, genre,
                               release_year, source_url, fingerprint, fingerprint_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (fingerprint_hash) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(&song.title)
        .bind(&song.artist)
        .bind(&song.album)
        .bind(song.duration_seconds.map(|d| d as i32))
        .bind(&song.cover_url)
        .bind(&song.genre)
        .bind(song.year)
        .bind(&song.source_url)
        .bind(&song.raw_fingerprint)
        .bind(compute_hash(&song.raw_fingerprint))
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        match row {
            Some((id,)) => Ok(id),
            None => Err(AppError::Duplicate {
                fingerprint: song.raw_fingerprint.clone(),
            }),
        }
    }

    pub async fn find_id(&self, fingerprint: &str) -> Result<Option<Uuid>, AppError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM songs WHERE fingerprint_hash = $1")
                .bind(compute_hash(fingerprint))
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(row.map(|(id,)| id))
    }

    /// Number of songs in the catalog.
    pub async fn count(&self) -> Result<i64, AppError> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM songs")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(row.0)
    }

    /// Most recently added songs, newest first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<StoredSong>, AppError> {
        let rows = sqlx::query_as::<_, SongRow>(
            r#"
            SELECT id, title, artist, album, duration_seconds, cover_url, genre,
                   release_year, source_url, fingerprint, created_at
            FROM songs
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(e.to_string()))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Check database connectivity.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(e.to_string()))?;
        Ok(())
    }
}

// -- Internal row type for sqlx deserialization --

#[derive(sqlx::FromRow)]
struct SongRow {
    id: Uuid,
    title: String,
    artist: String,
    album: Option<String>,
    duration_seconds: Option<i32>,
    cover_url: Option<String>,
    genre: Option<String>,
    release_year: Option<i32>,
    source_url: String,
    fingerprint: String,
    created_at: DateTime<Utc>,
}

impl From<SongRow> for StoredSong {
    fn from(row: SongRow) -> Self {
        StoredSong {
            id: row.id,
            title: row.title,
            artist: row.artist,
            album: row.album,
            duration_seconds: row.duration_seconds,
            cover_url: row.cover_url,
            genre: row.genre,
            year: row.release_year,
            source_url: row.source_url,
            fingerprint: row.fingerprint,
            created_at: row.created_at,
        }
    }
}

// -- Trait implementation --

impl SongStore for SongRepository {
    async fn save_song(&self, song: &CandidateSong) -> Result<SongId, AppError> {
        SongRepository::save(self, song).await
    }

    async fn find_by_fingerprint(&self, fingerprint: &str) -> Result<Option<SongId>, AppError> {
        SongRepository::find_id(self, fingerprint).await
    }
}
