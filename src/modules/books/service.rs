//! Cache-aside reads and write-then-invalidate mutations over a record store.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use shelf_cache::CacheError;
use shelf_http::error::AppError;
use thiserror::Error;

use super::cache::{BookCache, CacheKey};
use super::models::{Book, BookChanges, BookInput, ValidationError};
use super::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("book '{id}' not found")]
    NotFound { id: String },

    #[error("a book titled '{title}' already exists")]
    Conflict { title: String },

    #[error("record store failure: {0}")]
    Store(#[source] StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate { title } => CatalogError::Conflict { title },
            other => CatalogError::Store(other),
        }
    }
}

impl From<CatalogError> for AppError {
    fn from(e: CatalogError) -> Self {
        match e {
            CatalogError::Validation(v) => v.into(),
            CatalogError::NotFound { .. } => AppError::not_found(e.to_string()),
            CatalogError::Conflict { ref title } => AppError::conflict(
                vec![json!({ "field": "title", "error": "duplicate", "value": title })],
                e.to_string(),
            ),
            CatalogError::Store(_) => AppError::Internal(e.into()),
        }
    }
}

/// Outcome of a mutation that reached the durable store.
///
/// The store change always stands; `invalidation_error` records a cache entry
/// that could not be dropped and may serve stale data until its TTL runs out.
#[derive(Debug)]
pub struct Committed<T> {
    pub value: T,
    pub invalidation_error: Option<CacheError>,
}

impl<T> Committed<T> {
    pub fn is_clean(&self) -> bool {
        self.invalidation_error.is_none()
    }
}

/// The fields an update wrote, echoed back with the record's identity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedBook {
    pub id: String,
    #[serde(flatten)]
    pub changes: BookChanges,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn RecordStore>,
    cache: Arc<dyn BookCache>,
    strict_listing_invalidation: bool,
}

impl CatalogService {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<dyn BookCache>) -> Self {
        Self {
            store,
            cache,
            strict_listing_invalidation: true,
        }
    }

    /// When set, update and delete also drop the listing snapshot.
    pub fn with_strict_listing_invalidation(mut self, strict: bool) -> Self {
        self.strict_listing_invalidation = strict;
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    #[tracing::instrument(skip(self))]
    pub async fn read_one(&self, id: &str) -> Result<Book, CatalogError> {
        match self.cache.get(id).await {
            Ok(Some(book)) => {
                tracing::debug!(book_id = %id, "cache hit");
                return Ok(book);
            }
            Ok(None) => tracing::debug!(book_id = %id, "cache miss"),
            Err(e) => tracing::warn!(book_id = %id, error = %e, "cache read failed; treating as miss"),
        }

        let book = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| CatalogError::NotFound { id: id.to_string() })?;

        if let Err(e) = self.cache.set(&book).await {
            tracing::warn!(book_id = %id, error = %e, "failed to repopulate cache");
        }
        Ok(book)
    }

    #[tracing::instrument(skip(self))]
    pub async fn read_all(&self) -> Result<Vec<Book>, CatalogError> {
        match self.cache.get_all().await {
            Ok(Some(books)) => {
                tracing::debug!(count = books.len(), "listing cache hit");
                return Ok(books);
            }
            Ok(None) => tracing::debug!("listing cache miss"),
            Err(e) => tracing::warn!(error = %e, "listing cache read failed; treating as miss"),
        }

        let books = self.store.list().await?;
        // An empty listing is cached like any other
        if let Err(e) = self.cache.set_all(&books).await {
            tracing::warn!(error = %e, "failed to repopulate listing cache");
        }
        Ok(books)
    }

    /// Always served by the store.
    #[tracing::instrument(skip(self))]
    pub async fn search(&self, tag: &str) -> Result<Vec<Book>, CatalogError> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(ValidationError::single("tag", "required").into());
        }
        Ok(self.store.search(tag).await?)
    }

    #[tracing::instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create(&self, input: BookInput) -> Result<Committed<Book>, CatalogError> {
        let input = input.validate()?;
        let book = self.store.add(input).await?;
        tracing::info!(book_id = %book.id, "book created");

        let invalidation_error = self.invalidate(&[CacheKey::Listing]).await;
        Ok(Committed {
            value: book,
            invalidation_error,
        })
    }

    #[tracing::instrument(skip(self, replacement))]
    pub async fn update(
        &self,
        id: &str,
        replacement: BookInput,
    ) -> Result<Committed<UpdatedBook>, CatalogError> {
        let changes = BookChanges::from(replacement.validate()?);
        let matched = self.store.update(id, changes.clone()).await?;
        if matched == 0 {
            return Err(CatalogError::NotFound { id: id.to_string() });
        }
        tracing::info!(book_id = %id, "book updated");

        let invalidation_error = self.invalidate(&self.touched_by_change(id)).await;
        Ok(Committed {
            value: UpdatedBook {
                id: id.to_string(),
                changes,
            },
            invalidation_error,
        })
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<Committed<()>, CatalogError> {
        let deleted = self.store.delete(id).await?;
        if deleted == 0 {
            return Err(CatalogError::NotFound { id: id.to_string() });
        }
        tracing::info!(book_id = %id, "book deleted");

        let invalidation_error = self.invalidate(&self.touched_by_change(id)).await;
        Ok(Committed {
            value: (),
            invalidation_error,
        })
    }

    fn touched_by_change(&self, id: &str) -> Vec<CacheKey> {
        let mut keys = vec![CacheKey::book(id)];
        if self.strict_listing_invalidation {
            keys.push(CacheKey::Listing);
        }
        keys
    }

    /// Attempt every key; report the first failure.
    async fn invalidate(&self, keys: &[CacheKey]) -> Option<CacheError> {
        let mut first_error = None;
        for key in keys {
            if let Err(e) = self.cache.invalidate(key).await {
                tracing::warn!(key = ?key, error = %e, "cache invalidation failed after committed write");
                first_error.get_or_insert(e);
            }
        }
        first_error
    }
}
