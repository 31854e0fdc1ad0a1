use async_trait::async_trait;
use shelf_db::is_unique_violation;
use shelf_kernel::Migration;
use sqlx_core::query::query;
use sqlx_core::row::Row;
use sqlx_postgres::{PgPool, PgRow};
use time::OffsetDateTime;

use super::models::{Book, BookChanges, BookInput, PublishedDate};
use super::store::{new_book_id, RecordStore, StoreError};

pub const BOOKS_SCHEMA: Migration = Migration {
    id: "001_books",
    up: r#"
        CREATE TABLE IF NOT EXISTS books (
            id              TEXT PRIMARY KEY,
            title           TEXT             NOT NULL,
            author          TEXT             NOT NULL,
            publisher       TEXT             NOT NULL,
            published_month TEXT             NOT NULL,
            published_year  TEXT             NOT NULL,
            tags            TEXT[]           NOT NULL DEFAULT '{}',
            image_path      TEXT,
            review          DOUBLE PRECISION NOT NULL,
            created_at      TIMESTAMPTZ      NOT NULL
        );
        CREATE UNIQUE INDEX IF NOT EXISTS books_title_unique ON books (title);
        CREATE INDEX IF NOT EXISTS books_tags_gin ON books USING GIN (tags);
    "#,
};

const COLUMNS: &str = "id, title, author, publisher, published_month, published_year, \
                       tags, image_path, review, created_at";

/// PostgreSQL-backed record store over the `books` table.
#[derive(Clone)]
pub struct PostgresRecordStore {
    pool: PgPool,
}

impl PostgresRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn book_from_row(row: &PgRow) -> Result<Book, sqlx_core::error::Error> {
    Ok(Book {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        author: row.try_get("author")?,
        publisher: row.try_get("publisher")?,
        published_at: PublishedDate {
            month: row.try_get("published_month")?,
            year: row.try_get("published_year")?,
        },
        tags: row.try_get("tags")?,
        image_path: row.try_get("image_path")?,
        review: row.try_get("review")?,
        created_at: row.try_get("created_at")?,
    })
}

fn map_write_error(e: sqlx_core::error::Error, title: &str) -> StoreError {
    if is_unique_violation(&e) {
        StoreError::Duplicate {
            title: title.to_string(),
        }
    } else {
        e.into()
    }
}

fn insert_sql(ignore_duplicates: bool) -> String {
    let conflict = if ignore_duplicates {
        " ON CONFLICT (title) DO NOTHING"
    } else {
        ""
    };
    format!(
        "INSERT INTO books ({COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10){conflict}"
    )
}

#[async_trait]
impl RecordStore for PostgresRecordStore {
    #[tracing::instrument(skip(self, input), fields(title = %input.title))]
    async fn add(&self, input: BookInput) -> Result<Book, StoreError> {
        let book = Book::from_input(new_book_id(), OffsetDateTime::now_utc(), input);
        let sql = insert_sql(false);

        query(&sql)
            .bind(book.id.clone())
            .bind(book.title.clone())
            .bind(book.author.clone())
            .bind(book.publisher.clone())
            .bind(book.published_at.month.clone())
            .bind(book.published_at.year.clone())
            .bind(book.tags.clone())
            .bind(book.image_path.clone())
            .bind(book.review)
            .bind(book.created_at)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &book.title))?;

        Ok(book)
    }

    async fn add_many_ignoring_duplicates(
        &self,
        inputs: Vec<BookInput>,
    ) -> Result<usize, StoreError> {
        let sql = insert_sql(true);
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;

        for input in inputs {
            let book = Book::from_input(new_book_id(), OffsetDateTime::now_utc(), input);
            inserted += query(&sql)
                .bind(book.id)
                .bind(book.title)
                .bind(book.author)
                .bind(book.publisher)
                .bind(book.published_at.month)
                .bind(book.published_at.year)
                .bind(book.tags)
                .bind(book.image_path)
                .bind(book.review)
                .bind(book.created_at)
                .execute(&mut *tx)
                .await?
                .rows_affected() as usize;
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn list(&self) -> Result<Vec<Book>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM books ORDER BY created_at, id");
        let rows = query(&sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(book_from_row).collect::<Result<_, _>>()?)
    }

    async fn search(&self, tag: &str) -> Result<Vec<Book>, StoreError> {
        let sql =
            format!("SELECT {COLUMNS} FROM books WHERE tags @> ARRAY[$1]::TEXT[] ORDER BY created_at, id");
        let rows = query(&sql).bind(tag).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(book_from_row).collect::<Result<_, _>>()?)
    }

    async fn get(&self, id: &str) -> Result<Option<Book>, StoreError> {
        let sql = format!("SELECT {COLUMNS} FROM books WHERE id = $1");
        let row = query(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.as_ref().map(book_from_row).transpose()?)
    }

    #[tracing::instrument(skip(self, changes))]
    async fn update(&self, id: &str, changes: BookChanges) -> Result<u64, StoreError> {
        let title = changes.title.clone();
        let result = query(UPDATE_SQL)
            .bind(id)
            .bind(changes.title)
            .bind(changes.author)
            .bind(changes.publisher)
            .bind(changes.tags)
            .bind(changes.review)
            .execute(&self.pool)
            .await
            .map_err(|e| map_write_error(e, &title))?;

        Ok(result.rows_affected())
    }

    async fn delete(&self, id: &str) -> Result<u64, StoreError> {
        let result = query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

const UPDATE_SQL: &str = r#"
    UPDATE books
       SET title = $2, author = $3, publisher = $4, tags = $5, review = $6
     WHERE id = $1
"#;
