//! Session-based access control for SHELF.
//!
//! A [`SessionGate`] turns verified credentials into an opaque session token,
//! and [`guard::require_session`] admits only requests carrying a live one.

use std::fmt::Display;
use std::sync::Arc;

use shelf_http::error::AppError;
use shelf_kernel::settings::{AuthSettings, SessionStoreKind};
use thiserror::Error;

pub mod credentials;
pub mod gate;
pub mod guard;
pub mod session;

pub use credentials::{hash_secret, verify_secret, Argon2Credentials, CredentialVerifier, Identity};
pub use gate::SessionGate;
pub use guard::{require_session, SessionGuard};
pub use session::{MemorySessionStore, RedisSessionStore, Session, SessionStore};

#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown username or wrong secret; the two are never distinguished
    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("no session presented")]
    MissingSession,

    #[error("session is unknown or expired")]
    SessionExpired,

    #[error("session store error: {0}")]
    Store(String),

    #[error("credential verifier error: {0}")]
    Verifier(String),
}

impl AuthError {
    pub fn store(e: impl Display) -> Self {
        Self::Store(e.to_string())
    }

    pub fn verifier(e: impl Display) -> Self {
        Self::Verifier(e.to_string())
    }
}

/// Pick the session store named in settings.
///
/// A Redis store needs a pool; without one the process-local store is used.
pub fn session_store(
    settings: &AuthSettings,
    redis: Option<deadpool_redis::Pool>,
    key_prefix: &str,
) -> Arc<dyn SessionStore> {
    match (settings.session_store, redis) {
        (SessionStoreKind::Redis, Some(pool)) => Arc::new(RedisSessionStore::new(pool, key_prefix)),
        (SessionStoreKind::Redis, None) => {
            tracing::warn!("redis session store requested without a redis pool; keeping sessions in memory");
            Arc::new(MemorySessionStore::new())
        }
        (SessionStoreKind::Memory, _) => Arc::new(MemorySessionStore::new()),
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials => AppError::unauthorized("Invalid username or password"),
            AuthError::MissingSession | AuthError::SessionExpired => {
                AppError::forbidden("Not authorized")
            }
            AuthError::Store(_) | AuthError::Verifier(_) => AppError::Internal(e.into()),
        }
    }
}
