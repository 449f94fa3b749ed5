use std::time::Duration;

use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tunecrawl_core::AppError;

use crate::config::DatabaseConfig;
use crate::song_repository::SongRepository;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle to the song catalog database.
///
/// Cheap to clone; every clone shares one pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AppError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect(&config.url)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to connect: {e}")))?;

        tracing::info!(max_connections = config.max_connections, "Catalog database connected");
        Ok(Self { pool })
    }

    /// Wrap a pool created elsewhere (test containers).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Apply the migrations under `migrations/` that have not run yet.
    pub async fn migrate(&self) -> Result<(), AppError> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Migration failed: {e}")))?;
        tracing::debug!("Catalog migrations applied");
        Ok(())
    }

    pub fn song_repo(&self) -> SongRepository {
        SongRepository::new(self.pool.clone())
    }

    pub async fn health_check(&self) -> Result<(), AppError> {
        self.song_repo().health_check().await
    }

    /// Wait for checked-out connections and close the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
