pub mod config;
pub mod database;
pub mod song_repository;

pub use config::DatabaseConfig;
pub use database::Database;
pub use song_repository::{SongRepository, StoredSong};
