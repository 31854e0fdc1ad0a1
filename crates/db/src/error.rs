//! Error types for the PostgreSQL layer.

use sqlx_core::error::Error as SqlxError;

/// SQLSTATE raised when a unique index rejects a row.
pub const PG_UNIQUE_VIOLATION: &str = "23505";

/// Checks if a sqlx error carries a specific PostgreSQL SQLSTATE.
pub fn has_pg_error_code(err: &SqlxError, code: &str) -> bool {
    if let SqlxError::Database(db_err) = err {
        db_err.code().as_deref() == Some(code)
    } else {
        false
    }
}

pub fn is_unique_violation(err: &SqlxError) -> bool {
    has_pg_error_code(err, PG_UNIQUE_VIOLATION)
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlx(#[from] SqlxError),

    #[error("migration {module}/{id} failed: {source}")]
    Migration {
        module: String,
        id: String,
        #[source]
        source: SqlxError,
    },
}

pub type Result<T> = std::result::Result<T, DbError>;
