//! Wires settings into backends, modules, and the running server.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use shelf_authz::{session_store, Argon2Credentials, SessionGate, SessionGuard};
use shelf_cache::CacheModule;
use shelf_db::DatabaseModule;
use shelf_kernel::settings::{Settings, StoreBackend};
use shelf_kernel::{InitCtx, ModuleRegistry};
use sqlx_postgres::PgPool;

use crate::modules::auth::AuthModule;
use crate::modules::books::cache::CatalogCache;
use crate::modules::books::postgres::PostgresRecordStore;
use crate::modules::books::service::CatalogService;
use crate::modules::books::store::{MemoryRecordStore, RecordStore};
use crate::modules::books::BooksModule;

/// Every long-lived piece of the service, built but not yet started.
pub struct Application {
    pub settings: Settings,
    pub registry: Arc<ModuleRegistry>,
    pub catalog: CatalogService,
    pub gate: SessionGate,
    pub pg_pool: Option<PgPool>,
}

/// Build backends and register modules. Nothing is initialised or started yet.
pub async fn build(settings: Settings) -> anyhow::Result<Application> {
    let mut registry = ModuleRegistry::new();

    let cache_module = Arc::new(CacheModule::connect(&settings.cache).await);
    let cache_backend = cache_module.backend();
    registry.register_core(cache_module);

    let (store, pg_pool): (Arc<dyn RecordStore>, Option<PgPool>) = match settings.database.backend
    {
        StoreBackend::Memory => {
            tracing::info!("using in-memory record store");
            (Arc::new(MemoryRecordStore::new()), None)
        }
        StoreBackend::Postgres => {
            let pool = shelf_db::create_pool(&settings.database)
                .await
                .context("failed to create PostgreSQL pool")?;
            registry.register_core(Arc::new(DatabaseModule::new(pool.clone())));
            (Arc::new(PostgresRecordStore::new(pool.clone())), Some(pool))
        }
    };

    let book_cache = CatalogCache::new(
        cache_backend.clone(),
        settings.cache.key_prefix.clone(),
        Duration::from_secs(settings.cache.ttl_secs),
    );
    let catalog = CatalogService::new(store, Arc::new(book_cache))
        .with_strict_listing_invalidation(settings.cache.strict_listing_invalidation);

    // Plaintext entries in the users file are hashed here, which is CPU-bound
    let users_path = settings.auth.users_path.clone();
    let credentials =
        tokio::task::spawn_blocking(move || Argon2Credentials::from_users_file(users_path))
            .await
            .context("credential loading task panicked")?
            .context("failed to load users")?;

    let sessions = session_store(
        &settings.auth,
        cache_backend.redis_pool().cloned(),
        &settings.cache.key_prefix,
    );
    let gate = SessionGate::new(
        Arc::new(credentials),
        sessions,
        Duration::from_secs(settings.auth.session_ttl_secs),
    );
    let guard = SessionGuard::new(
        gate.clone(),
        settings.auth.session_cookie_name.clone(),
        settings.auth.secure_cookies,
    );

    let mut books = BooksModule::new(catalog.clone(), guard.clone());
    if pg_pool.is_some() {
        books = books.with_postgres_schema();
    }
    registry.register_custom(Arc::new(books));
    registry.register_custom(Arc::new(AuthModule::new(guard)));

    Ok(Application {
        settings,
        registry: Arc::new(registry),
        catalog,
        gate,
        pg_pool,
    })
}

impl Application {
    /// Apply pending module migrations. A no-op for the in-memory store.
    pub async fn migrate(&self) -> anyhow::Result<usize> {
        let Some(pool) = &self.pg_pool else {
            tracing::info!("in-memory record store; no migrations to run");
            return Ok(0);
        };
        let migrations = self.registry.collect_migrations();
        let applied = shelf_db::migrations::run(pool, &migrations)
            .await
            .context("failed to apply migrations")?;
        tracing::info!(applied, total = migrations.len(), "migrations complete");
        Ok(applied)
    }

    /// Init every module, migrate when configured, then start every module.
    pub async fn start(&self) -> anyhow::Result<()> {
        let ctx = InitCtx {
            settings: &self.settings,
        };
        self.registry.init_all(&ctx).await?;
        if self.settings.database.run_migrations {
            self.migrate().await?;
        }
        self.registry.start_all(&ctx).await
    }

    pub async fn stop(&self) -> anyhow::Result<()> {
        self.registry.stop_all().await
    }
}

/// Run the HTTP server until ctrl-c or SIGTERM, then stop every module.
pub async fn serve(settings: Settings) -> anyhow::Result<()> {
    let app = build(settings).await?;
    app.start().await?;

    tracing::info!(
        env = ?app.settings.environment,
        modules = app.registry.modules().len(),
        "shelf-app started"
    );

    let served = shelf_http::start_server(
        app.registry.clone(),
        &app.settings,
        shelf_http::shutdown_signal(),
    )
    .await;

    let stopped = app.stop().await;
    served?;
    stopped
}
