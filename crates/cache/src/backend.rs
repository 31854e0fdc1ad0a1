//! Byte-level cache backend with per-entry TTL.

use dashmap::DashMap;
use deadpool_redis::Pool;
use redis::AsyncCommands;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::CacheError;

/// A cached value together with the moment it stops being valid.
#[derive(Clone, Debug)]
pub struct CachedEntry {
    pub data: Arc<Vec<u8>>,
    pub expires_at: Instant,
}

impl CachedEntry {
    pub fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data: Arc::new(data),
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Cache backend shared by every request.
///
/// - **Local**: process-local DashMap, expiry checked on read and by [`CacheBackend::purge_expired`]
/// - **Redis**: pooled connections, expiry enforced by Redis (`SET .. EX`)
///
/// Both variants are cheap to clone and safe to use concurrently.
/// Unlike a best-effort cache, every operation reports failures so the caller
/// decides whether a failure downgrades to a miss or surfaces.
#[derive(Clone)]
pub enum CacheBackend {
    Local(Arc<DashMap<String, CachedEntry>>),
    Redis(Pool),
}

impl CacheBackend {
    pub fn new_local() -> Self {
        CacheBackend::Local(Arc::new(DashMap::new()))
    }

    pub fn new_redis(pool: Pool) -> Self {
        CacheBackend::Redis(pool)
    }

    pub fn mode(&self) -> &'static str {
        match self {
            CacheBackend::Local(_) => "local",
            CacheBackend::Redis(_) => "redis",
        }
    }

    /// The Redis pool, when running in Redis mode (shared with the session store).
    pub fn redis_pool(&self) -> Option<&Pool> {
        match self {
            CacheBackend::Local(_) => None,
            CacheBackend::Redis(pool) => Some(pool),
        }
    }

    /// Fetch the raw bytes for `key`. `Ok(None)` means absent or expired.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        match self {
            CacheBackend::Local(map) => {
                let Some(entry) = map.get(key) else {
                    return Ok(None);
                };
                if entry.is_expired() {
                    drop(entry);
                    map.remove_if(key, |_, entry| entry.is_expired());
                    return Ok(None);
                }
                Ok(Some(entry.data.as_ref().clone()))
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let value: Option<Vec<u8>> = conn.get(key).await?;
                Ok(value)
            }
        }
    }

    /// Overwrite `key` with `value`, expiring after `ttl`.
    pub async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.insert(key.to_string(), CachedEntry::new(value, ttl));
                Ok(())
            }
            CacheBackend::Redis(pool) => {
                // Redis rejects `EX 0`
                let ttl_secs = ttl.as_secs().max(1);
                let mut conn = pool.get().await?;
                conn.set_ex::<_, _, ()>(key, value, ttl_secs).await?;
                Ok(())
            }
        }
    }

    /// Remove `key`. Removing an absent key succeeds.
    pub async fn invalidate(&self, key: &str) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(map) => {
                map.remove(key);
                Ok(())
            }
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                conn.del::<_, ()>(key).await?;
                Ok(())
            }
        }
    }

    /// Round-trip check used by health reporting.
    pub async fn ping(&self) -> Result<(), CacheError> {
        match self {
            CacheBackend::Local(_) => Ok(()),
            CacheBackend::Redis(pool) => {
                let mut conn = pool.get().await?;
                let _: String = redis::cmd("PING").query_async(&mut conn).await?;
                Ok(())
            }
        }
    }

    /// Drop expired local entries; returns how many were removed. No-op for Redis.
    pub fn purge_expired(&self) -> usize {
        match self {
            CacheBackend::Local(map) => {
                let before = map.len();
                map.retain(|_, entry| !entry.is_expired());
                before.saturating_sub(map.len())
            }
            CacheBackend::Redis(_) => 0,
        }
    }

    /// Number of live-or-expired entries held locally (Local mode only).
    pub fn local_len(&self) -> Option<usize> {
        match self {
            CacheBackend::Local(map) => Some(map.len()),
            CacheBackend::Redis(_) => None,
        }
    }
}
