//! Durable record storage for the catalog.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use shelf_db::DbError;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::{Timestamp, Uuid};

use super::models::{Book, BookChanges, BookInput};

#[derive(Debug, Error)]
pub enum StoreError {
    /// The unique title index rejected the write
    #[error("a book titled '{title}' already exists")]
    Duplicate { title: String },

    #[error(transparent)]
    Database(#[from] DbError),

    #[error("seed file {path} is unreadable: {reason}")]
    Seed { path: String, reason: String },
}

impl From<sqlx_core::error::Error> for StoreError {
    fn from(e: sqlx_core::error::Error) -> Self {
        StoreError::Database(DbError::Sqlx(e))
    }
}

/// Authoritative storage. Assigns identity and creation time; knows nothing of caching.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn add(&self, input: BookInput) -> Result<Book, StoreError>;

    /// Insert many records, silently skipping titles that already exist.
    /// Returns how many were inserted.
    async fn add_many_ignoring_duplicates(&self, inputs: Vec<BookInput>)
        -> Result<usize, StoreError>;

    async fn list(&self) -> Result<Vec<Book>, StoreError>;

    /// Records whose tag set contains exactly `tag`.
    async fn search(&self, tag: &str) -> Result<Vec<Book>, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError>;

    /// Overwrite title, author, publisher, tags and review of `id`.
    /// Returns the number of records matched.
    async fn update(&self, id: &str, changes: BookChanges) -> Result<u64, StoreError>;

    /// Returns the number of records deleted.
    async fn delete(&self, id: &str) -> Result<u64, StoreError>;
}

/// Time-ordered record identity.
pub fn new_book_id() -> String {
    Uuid::new_v7(Timestamp::now(uuid::NoContext)).to_string()
}

/// Process-local store. Each instance is independent.
#[derive(Default)]
pub struct MemoryRecordStore {
    books: RwLock<HashMap<String, Book>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn title_taken(books: &HashMap<String, Book>, title: &str, except: Option<&str>) -> bool {
    books
        .values()
        .any(|b| b.title == title && Some(b.id.as_str()) != except)
}

fn sorted(mut books: Vec<Book>) -> Vec<Book> {
    books.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    books
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn add(&self, input: BookInput) -> Result<Book, StoreError> {
        let mut books = self.books.write().await;
        if title_taken(&books, &input.title, None) {
            return Err(StoreError::Duplicate { title: input.title });
        }
        let book = Book::from_input(new_book_id(), OffsetDateTime::now_utc(), input);
        books.insert(book.id.clone(), book.clone());
        Ok(book)
    }

    async fn add_many_ignoring_duplicates(
        &self,
        inputs: Vec<BookInput>,
    ) -> Result<usize, StoreError> {
        let mut books = self.books.write().await;
        let mut inserted = 0;
        for input in inputs {
            if title_taken(&books, &input.title, None) {
                continue;
            }
            let book = Book::from_input(new_book_id(), OffsetDateTime::now_utc(), input);
            books.insert(book.id.clone(), book);
            inserted += 1;
        }
        Ok(inserted)
    }

    async fn list(&self) -> Result<Vec<Book>, StoreError> {
        let books = self.books.read().await;
        Ok(sorted(books.values().cloned().collect()))
    }

    async fn search(&self, tag: &str) -> Result<Vec<Book>, StoreError> {
        let books = self.books.read().await;
        Ok(sorted(
            books.values().filter(|b| b.has_tag(tag)).cloned().collect(),
        ))
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError> {
        Ok(self.books.read().await.get(id).cloned())
    }

    async fn update(&self, id: &str, changes: BookChanges) -> Result<u64, StoreError> {
        let mut books = self.books.write().await;
        if !books.contains_key(id) {
            return Ok(0);
        }
        if title_taken(&books, &changes.title, Some(id)) {
            return Err(StoreError::Duplicate {
                title: changes.title,
            });
        }
        match books.get_mut(id) {
            Some(book) => {
                book.apply(changes);
                Ok(1)
            }
            None => Ok(0),
        }
    }

    async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        Ok(self.books.write().await.remove(id).map_or(0, |_| 1))
    }
}

/// Load a JSON array of books into `store`, skipping titles already present.
///
/// A missing file is not an error. Entries that fail validation are skipped.
pub async fn seed_from_file(
    store: &dyn RecordStore,
    path: impl AsRef<Path>,
) -> Result<usize, StoreError> {
    let path = path.as_ref();
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(path = %path.display(), "seed file not found; skipping");
            return Ok(0);
        }
        Err(e) => {
            return Err(StoreError::Seed {
                path: path.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    let entries: Vec<BookInput> = serde_json::from_str(&raw).map_err(|e| StoreError::Seed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;

    let total = entries.len();
    let valid: Vec<BookInput> = entries
        .into_iter()
        .filter_map(|entry| {
            let title = entry.title.clone();
            entry
                .validate()
                .map_err(|e| tracing::warn!(title = %title, error = %e, "skipping invalid seed entry"))
                .ok()
        })
        .collect();

    let inserted = store.add_many_ignoring_duplicates(valid).await?;
    tracing::info!(path = %path.display(), total, inserted, "seeded books");
    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::fixtures::{moondust, titled};
    use crate::modules::books::models::PublishedDate;

    #[tokio::test]
    async fn add_assigns_identity_and_timestamp() {
        let store = MemoryRecordStore::new();
        let before = OffsetDateTime::now_utc();
        let book = store.add(moondust()).await.unwrap();

        assert!(!book.id.is_empty());
        assert!(book.created_at >= before);
        assert_eq!(store.get(&book.id).await.unwrap(), Some(book));
    }

    #[tokio::test]
    async fn duplicate_titles_are_rejected() {
        let store = MemoryRecordStore::new();
        store.add(moondust()).await.unwrap();
        assert!(matches!(
            store.add(moondust()).await,
            Err(StoreError::Duplicate { .. })
        ));

        let other = store.add(titled("Apollo 13")).await.unwrap();
        assert!(matches!(
            store.update(&other.id, moondust().into()).await,
            Err(StoreError::Duplicate { .. })
        ));
    }

    #[tokio::test]
    async fn update_keeps_identity_and_creation_time() {
        let store = MemoryRecordStore::new();
        let book = store.add(moondust()).await.unwrap();

        let mut replacement = moondust();
        replacement.review = 3.0;
        replacement.tags = vec!["moon".to_string()];
        assert_eq!(store.update(&book.id, replacement.into()).await.unwrap(), 1);

        let stored = store.get(&book.id).await.unwrap().unwrap();
        assert_eq!(stored.id, book.id);
        assert_eq!(stored.created_at, book.created_at);
        assert_eq!(stored.review, 3.0);
        assert_eq!(stored.tags, vec!["moon"]);

        assert_eq!(store.update("missing", moondust().into()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn update_leaves_publication_date_and_cover_alone() {
        let store = MemoryRecordStore::new();
        let book = store.add(moondust()).await.unwrap();

        let mut replacement = moondust();
        replacement.author = "A. Smith".to_string();
        replacement.published_at = PublishedDate {
            month: "January".to_string(),
            year: "1999".to_string(),
        };
        replacement.image_path = None;
        assert_eq!(store.update(&book.id, replacement.into()).await.unwrap(), 1);

        let stored = store.get(&book.id).await.unwrap().unwrap();
        assert_eq!(stored.author, "A. Smith");
        assert_eq!(stored.published_at, book.published_at);
        assert_eq!(stored.image_path.as_deref(), Some("/assets/images/moondust.jpg"));
    }

    #[tokio::test]
    async fn delete_twice_counts_one_then_zero() {
        let store = MemoryRecordStore::new();
        let book = store.add(moondust()).await.unwrap();
        assert_eq!(store.delete(&book.id).await.unwrap(), 1);
        assert_eq!(store.delete(&book.id).await.unwrap(), 0);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_matches_exact_tags_only() {
        let store = MemoryRecordStore::new();
        let book = store.add(moondust()).await.unwrap();
        store.add(titled("Apollo 13")).await.unwrap();

        let found = store.search("astronauts").await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(found.iter().any(|b| b.id == book.id));
        assert!(store.search("astro").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn seeding_twice_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.json");
        let entries = vec![moondust(), titled("Apollo 13"), titled("no")];
        std::fs::write(&path, serde_json::to_string(&entries).unwrap()).unwrap();

        let store = MemoryRecordStore::new();
        assert_eq!(seed_from_file(&store, &path).await.unwrap(), 2);
        assert_eq!(seed_from_file(&store, &path).await.unwrap(), 0);
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn missing_seed_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryRecordStore::new();
        let inserted = seed_from_file(&store, dir.path().join("none.json"))
            .await
            .unwrap();
        assert_eq!(inserted, 0);
    }
}
