//! JSON snapshots of catalog reads, kept in the shared cache backend.

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use shelf_cache::{CacheBackend, CacheError};

use super::models::Book;

/// Which snapshot an entry holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// The full listing
    Listing,
    Book(String),
}

impl CacheKey {
    pub fn book(id: impl Into<String>) -> Self {
        CacheKey::Book(id.into())
    }

    /// Render under `prefix`. Listing and record keys live in separate namespaces.
    pub fn render(&self, prefix: &str) -> String {
        match self {
            CacheKey::Listing => format!("{prefix}:books"),
            CacheKey::Book(id) => format!("{prefix}:book:{id}"),
        }
    }
}

/// Snapshot cache for books. Refreshes always overwrite the whole entry.
#[async_trait]
pub trait BookCache: Send + Sync {
    async fn get_all(&self) -> Result<Option<Vec<Book>>, CacheError>;

    async fn set_all(&self, books: &[Book]) -> Result<(), CacheError>;

    async fn get(&self, id: &str) -> Result<Option<Book>, CacheError>;

    async fn set(&self, book: &Book) -> Result<(), CacheError>;

    /// Unconditional delete; an absent key is not an error.
    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError>;
}

/// [`BookCache`] over a [`CacheBackend`], storing serde_json bytes with a fixed TTL.
#[derive(Clone)]
pub struct CatalogCache {
    backend: CacheBackend,
    prefix: String,
    ttl: Duration,
}

impl CatalogCache {
    pub fn new(backend: CacheBackend, prefix: impl Into<String>, ttl: Duration) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
            ttl,
        }
    }

    async fn read<T: DeserializeOwned>(&self, key: &CacheKey) -> Result<Option<T>, CacheError> {
        let key = key.render(&self.prefix);
        let Some(bytes) = self.backend.get(&key).await? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|source| CacheError::Decode { key, source })
    }

    async fn write<T: Serialize + ?Sized + Sync>(
        &self,
        key: &CacheKey,
        value: &T,
    ) -> Result<(), CacheError> {
        let key = key.render(&self.prefix);
        let bytes =
            serde_json::to_vec(value).map_err(|source| CacheError::Encode {
                key: key.clone(),
                source,
            })?;
        self.backend.set(&key, bytes, self.ttl).await
    }
}

#[async_trait]
impl BookCache for CatalogCache {
    async fn get_all(&self) -> Result<Option<Vec<Book>>, CacheError> {
        self.read(&CacheKey::Listing).await
    }

    async fn set_all(&self, books: &[Book]) -> Result<(), CacheError> {
        self.write(&CacheKey::Listing, books).await
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, CacheError> {
        self.read(&CacheKey::book(id)).await
    }

    async fn set(&self, book: &Book) -> Result<(), CacheError> {
        self.write(&CacheKey::book(book.id.as_str()), book).await
    }

    async fn invalidate(&self, key: &CacheKey) -> Result<(), CacheError> {
        self.backend.invalidate(&key.render(&self.prefix)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::books::models::fixtures::moondust;
    use time::OffsetDateTime;

    fn cache() -> (CacheBackend, CatalogCache) {
        let backend = CacheBackend::new_local();
        let cache = CatalogCache::new(backend.clone(), "test", Duration::from_secs(60));
        (backend, cache)
    }

    fn book(id: &str) -> Book {
        Book::from_input(id.to_string(), OffsetDateTime::now_utc(), moondust())
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(CacheKey::Listing.render("shelf"), "shelf:books");
        assert_eq!(CacheKey::book("books").render("shelf"), "shelf:book:books");
    }

    #[tokio::test]
    async fn record_and_listing_snapshots_round_trip() {
        let (_, cache) = cache();
        let book = book("b-1");

        cache.set(&book).await.unwrap();
        assert_eq!(cache.get("b-1").await.unwrap(), Some(book.clone()));

        cache.set_all(&[]).await.unwrap();
        assert_eq!(cache.get_all().await.unwrap(), Some(vec![]));

        cache.invalidate(&CacheKey::book("b-1")).await.unwrap();
        assert_eq!(cache.get("b-1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn corrupt_snapshot_is_a_decode_error() {
        let (backend, cache) = cache();
        backend
            .set("test:book:b-1", b"{not json".to_vec(), Duration::from_secs(60))
            .await
            .unwrap();

        assert!(matches!(
            cache.get("b-1").await,
            Err(CacheError::Decode { .. })
        ));
    }
}
