//! Cache infrastructure: TTL key-value backends and the `cache` core module.

use std::time::Duration;

use async_trait::async_trait;
use shelf_kernel::settings::{CacheMode, CacheSettings};
use shelf_kernel::{Health, InitCtx, Module};
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub mod backend;

pub use backend::{CacheBackend, CachedEntry};

/// How often the local backend sweeps expired entries.
const LOCAL_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Failures talking to, or decoding values from, the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache pool unavailable: {0}")]
    Pool(#[from] deadpool_redis::PoolError),

    #[error("cache command failed: {0}")]
    Command(#[from] redis::RedisError),

    #[error("cache configuration invalid: {0}")]
    Config(String),

    #[error("cache entry '{key}' could not be decoded: {source}")]
    Decode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("cache entry '{key}' could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Build a Redis connection pool from settings. Does not connect yet.
pub fn redis_pool(settings: &CacheSettings) -> Result<deadpool_redis::Pool, CacheError> {
    let mut redis_config = deadpool_redis::Config::from_url(&settings.url);
    let timeout = Some(Duration::from_millis(settings.timeout_ms));
    let mut pool_config = deadpool_redis::PoolConfig::new(settings.pool_size);
    pool_config.timeouts.wait = timeout;
    pool_config.timeouts.create = timeout;
    pool_config.timeouts.recycle = timeout;
    redis_config.pool = Some(pool_config);

    redis_config
        .create_pool(Some(deadpool_redis::Runtime::Tokio1))
        .map_err(|e| CacheError::Config(e.to_string()))
}

/// Core module owning the shared cache backend.
///
/// When Redis is configured but unreachable at boot, the module falls back to the
/// local backend and reports itself as degraded rather than failing startup.
pub struct CacheModule {
    backend: CacheBackend,
    fallback_reason: Option<String>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

impl CacheModule {
    /// Wrap an already constructed backend.
    pub fn new(backend: CacheBackend) -> Self {
        Self {
            backend,
            fallback_reason: None,
            sweeper: Mutex::new(None),
        }
    }

    /// Build the backend described by `settings`, degrading to local on failure.
    pub async fn connect(settings: &CacheSettings) -> Self {
        if settings.backend == CacheMode::Local {
            tracing::info!("redis disabled, using local cache only");
            return Self::new(CacheBackend::new_local());
        }

        tracing::info!(url = %settings.url, "connecting to redis");

        let pool = match redis_pool(settings) {
            Ok(pool) => pool,
            Err(e) => return Self::degraded(format!("failed to create redis pool: {e}")),
        };

        let backend = CacheBackend::new_redis(pool);
        match backend.ping().await {
            Ok(()) => {
                tracing::info!("connected to redis");
                Self::new(backend)
            }
            Err(e) => Self::degraded(format!("redis unreachable: {e}")),
        }
    }

    fn degraded(reason: String) -> Self {
        tracing::warn!(reason = %reason, "falling back to local cache");
        Self {
            backend: CacheBackend::new_local(),
            fallback_reason: Some(reason),
            sweeper: Mutex::new(None),
        }
    }

    pub fn backend(&self) -> CacheBackend {
        self.backend.clone()
    }
}

#[async_trait]
impl Module for CacheModule {
    fn name(&self) -> &'static str {
        "cache"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            mode = self.backend.mode(),
            degraded = self.fallback_reason.is_some(),
            "cache module initialized"
        );
        Ok(())
    }

    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if let CacheBackend::Local(_) = self.backend {
            let backend = self.backend.clone();
            let handle = tokio::spawn(async move {
                let mut interval = tokio::time::interval(LOCAL_SWEEP_INTERVAL);
                loop {
                    interval.tick().await;
                    let purged = backend.purge_expired();
                    if purged > 0 {
                        tracing::debug!(purged, "swept expired cache entries");
                    }
                }
            });
            *self.sweeper.lock().await = Some(handle);
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }
        tracing::info!(module = self.name(), "cache module stopped");
        Ok(())
    }

    async fn health(&self) -> Health {
        if let Some(reason) = &self.fallback_reason {
            return Health::Degraded(reason.clone());
        }
        match self.backend.ping().await {
            Ok(()) => Health::Up,
            // Reads fall through to the record store, so an unreachable cache only degrades.
            Err(e) => Health::Degraded(e.to_string()),
        }
    }
}
