//! Runs the PostgreSQL record store against a live database.
//!
//! Ignored by default. Point `DATABASE_URL` at a scratch database and run
//! `cargo test --test postgres_store -- --ignored`. The `books` table is truncated.

use shelf_app::modules::books::models::{BookInput, PublishedDate};
use shelf_app::modules::books::postgres::{PostgresRecordStore, BOOKS_SCHEMA};
use shelf_app::modules::books::store::{seed_from_file, RecordStore, StoreError};
use shelf_kernel::settings::DatabaseSettings;
use sqlx_core::query::query;

fn moondust() -> BookInput {
    BookInput {
        title: "Moondust".to_string(),
        author: "Andrew Smith".to_string(),
        publisher: "Bloomsbury Publishing PLC".to_string(),
        published_at: PublishedDate {
            month: "July".to_string(),
            year: "2009".to_string(),
        },
        tags: vec!["astronauts".to_string(), "nasa".to_string()],
        image_path: Some("/assets/images/moondust.jpg".to_string()),
        review: 4.6,
    }
}

#[tokio::test]
#[ignore = "needs DATABASE_URL pointing at a scratch PostgreSQL database"]
async fn postgres_store_against_live_database() {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let settings = DatabaseSettings {
        url,
        pool_size: 2,
        ..DatabaseSettings::default()
    };
    let pool = shelf_db::create_pool(&settings).await.unwrap();
    shelf_db::migrations::run(&pool, &[("books".to_string(), BOOKS_SCHEMA)])
        .await
        .unwrap();
    query("TRUNCATE books").execute(&pool).await.unwrap();

    let store = PostgresRecordStore::new(pool.clone());

    // Unique title surfaces as Duplicate (SQLSTATE 23505)
    let book = store.add(moondust()).await.unwrap();
    assert!(matches!(
        store.add(moondust()).await,
        Err(StoreError::Duplicate { ref title }) if title == "Moondust"
    ));

    let found = store.search("astronauts").await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].id, book.id);
    assert!(store.search("astro").await.unwrap().is_empty());

    // Update counts matched rows and leaves the publication date and cover alone
    let mut replacement = moondust();
    replacement.review = 3.0;
    replacement.published_at.year = "1999".to_string();
    replacement.image_path = None;
    assert_eq!(store.update(&book.id, replacement.clone().into()).await.unwrap(), 1);
    assert_eq!(store.update(&book.id, replacement.into()).await.unwrap(), 1);
    assert_eq!(store.update("nonexistent-id", moondust().into()).await.unwrap(), 0);

    let stored = store.get(&book.id).await.unwrap().unwrap();
    assert_eq!(stored.review, 3.0);
    assert_eq!(stored.published_at, book.published_at);
    assert_eq!(stored.image_path, book.image_path);

    // Seeding twice inserts each title once
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("books.json");
    std::fs::write(
        &seed,
        serde_json::to_string(&vec![
            BookInput {
                title: "Dune".to_string(),
                ..moondust()
            },
            moondust(),
        ])
        .unwrap(),
    )
    .unwrap();
    assert_eq!(seed_from_file(&store, &seed).await.unwrap(), 1);
    assert_eq!(seed_from_file(&store, &seed).await.unwrap(), 0);
    assert_eq!(store.list().await.unwrap().len(), 2);

    assert_eq!(store.delete(&book.id).await.unwrap(), 1);
    assert_eq!(store.delete(&book.id).await.unwrap(), 0);

    pool.close().await;
}
