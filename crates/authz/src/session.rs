//! Session records and the stores that hold them between requests.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use deadpool_redis::Pool;
use rand::Rng;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthError;

/// An authenticated session bound to an opaque token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub username: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl Session {
    /// Mint a fresh session with a random 256-bit token.
    pub fn mint(username: impl Into<String>, ttl: Duration) -> Self {
        let bytes: [u8; 32] = rand::thread_rng().gen();
        Self {
            token: hex::encode(bytes),
            username: username.into(),
            expires_at: OffsetDateTime::now_utc() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() >= self.expires_at
    }
}

/// Storage for live sessions. There is deliberately no way to list sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert(&self, session: &Session, ttl: Duration) -> Result<(), AuthError>;

    /// `Ok(None)` when the token is unknown or has expired.
    async fn get(&self, token: &str) -> Result<Option<Session>, AuthError>;

    /// Removing an unknown token succeeds.
    async fn remove(&self, token: &str) -> Result<(), AuthError>;
}

/// Process-local session store.
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn insert(&self, session: &Session, _ttl: Duration) -> Result<(), AuthError> {
        self.sessions.insert(session.token.clone(), session.clone());
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let Some(session) = self.sessions.get(token).map(|s| s.clone()) else {
            return Ok(None);
        };
        if session.is_expired() {
            self.sessions.remove(token);
            return Ok(None);
        }
        Ok(Some(session))
    }

    async fn remove(&self, token: &str) -> Result<(), AuthError> {
        self.sessions.remove(token);
        Ok(())
    }
}

/// Redis-backed session store; expiry is enforced with `SET .. EX`.
pub struct RedisSessionStore {
    pool: Pool,
    prefix: String,
}

impl RedisSessionStore {
    pub fn new(pool: Pool, prefix: impl Into<String>) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
        }
    }

    fn key(&self, token: &str) -> String {
        format!("{}:session:{}", self.prefix, token)
    }
}

#[async_trait]
impl SessionStore for RedisSessionStore {
    async fn insert(&self, session: &Session, ttl: Duration) -> Result<(), AuthError> {
        let payload = serde_json::to_string(session).map_err(AuthError::store)?;
        let mut conn = self.pool.get().await.map_err(AuthError::store)?;
        conn.set_ex::<_, _, ()>(self.key(&session.token), payload, ttl.as_secs().max(1))
            .await
            .map_err(AuthError::store)
    }

    async fn get(&self, token: &str) -> Result<Option<Session>, AuthError> {
        let mut conn = self.pool.get().await.map_err(AuthError::store)?;
        let payload: Option<String> = conn
            .get(self.key(token))
            .await
            .map_err(AuthError::store)?;

        match payload {
            None => Ok(None),
            Some(raw) => {
                let session: Session = serde_json::from_str(&raw).map_err(AuthError::store)?;
                Ok((!session.is_expired()).then_some(session))
            }
        }
    }

    async fn remove(&self, token: &str) -> Result<(), AuthError> {
        let mut conn = self.pool.get().await.map_err(AuthError::store)?;
        conn.del::<_, ()>(self.key(token))
            .await
            .map_err(AuthError::store)
    }
}
