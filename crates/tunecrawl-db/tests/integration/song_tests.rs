use tunecrawl_core::AppError;
use tunecrawl_core::models::CandidateSong;
use tunecrawl_core::traits::SongStore;
use tunecrawl_db::{Database, SongRepository};

use crate::integration::common::setup_test_db;

fn song(title: &str, artist: &str) -> CandidateSong {
    let mut song = CandidateSong::new(title, artist, "https://music.example.com/api/popular?page=1")
        .with_album("Abbey Road")
        .with_duration(259)
        .with_year(1969);
    song.raw_fingerprint = format!("{}|{}|abbey road", title.to_lowercase(), artist.to_lowercase());
    song
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn save_and_find_by_fingerprint() {
    let (pool, _container) = setup_test_db().await;
    let repo = SongRepository::new(pool);

    let candidate = song("Something", "The Beatles");
    let id = repo.save_song(&candidate).await.unwrap();
    assert!(!id.is_nil());

    let found = repo
        .find_by_fingerprint(&candidate.raw_fingerprint)
        .await
        .unwrap();
    assert_eq!(found, Some(id));
    assert_eq!(
        repo.find_by_fingerprint("missing|nobody").await.unwrap(),
        None
    );
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn fingerprint_collision_is_a_duplicate() {
    let (pool, _container) = setup_test_db().await;
    let repo = SongRepository::new(pool);

    let candidate = song("Come Together", "The Beatles");
    repo.save_song(&candidate).await.unwrap();

    let err = repo.save_song(&candidate).await.unwrap_err();
    assert!(matches!(err, AppError::Duplicate { .. }));
    assert_eq!(repo.count().await.unwrap(), 1);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn recent_returns_newest_first() {
    let (pool, _container) = setup_test_db().await;
    let repo = SongRepository::new(pool);

    repo.save_song(&song("Because", "The Beatles")).await.unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    repo.save_song(&song("Sun King", "The Beatles")).await.unwrap();

    let recent = repo.recent(10).await.unwrap();
    assert_eq!(recent.len(), 2);
    assert_eq!(recent[0].title, "Sun King");
    assert_eq!(recent[0].year, Some(1969));
    assert_eq!(recent[0].duration_seconds, Some(259));
    assert_eq!(recent[1].title, "Because");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn health_check_fails_after_close() {
    let (pool, _container) = setup_test_db().await;
    let db = Database::from_pool(pool);
    db.health_check().await.unwrap();

    db.close().await;
    assert!(matches!(
        db.health_check().await,
        Err(AppError::DatabaseError(_))
    ));
}
