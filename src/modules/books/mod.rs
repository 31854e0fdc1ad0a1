pub mod cache;
pub mod models;
pub mod postgres;
pub mod routes;
pub mod service;
pub mod store;

use async_trait::async_trait;
use axum::Router;
use shelf_authz::SessionGuard;
use shelf_kernel::{InitCtx, Migration, Module};

use service::CatalogService;

/// The catalog: book routes, the books schema, and seed loading on start.
pub struct BooksModule {
    service: CatalogService,
    guard: SessionGuard,
    migrations: Vec<Migration>,
}

impl BooksModule {
    pub fn new(service: CatalogService, guard: SessionGuard) -> Self {
        Self {
            service,
            guard,
            migrations: Vec::new(),
        }
    }

    /// Ship the `books` table migration; only meaningful for the PostgreSQL store.
    pub fn with_postgres_schema(mut self) -> Self {
        self.migrations.push(postgres::BOOKS_SCHEMA);
        self
    }

    pub fn service(&self) -> &CatalogService {
        &self.service
    }
}

#[async_trait]
impl Module for BooksModule {
    fn name(&self) -> &'static str {
        "books"
    }

    async fn init(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        tracing::info!(
            module = self.name(),
            store = ?ctx.settings.database.backend,
            strict_listing_invalidation = ctx.settings.cache.strict_listing_invalidation,
            "books module initialized"
        );
        Ok(())
    }

    fn routes(&self) -> Router {
        routes::router(self.service.clone(), self.guard.clone())
    }

    fn openapi(&self) -> Option<serde_json::Value> {
        Some(routes::openapi())
    }

    fn migrations(&self) -> Vec<Migration> {
        self.migrations.clone()
    }

    async fn start(&self, ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        if let Some(path) = &ctx.settings.database.seed_path {
            let inserted = store::seed_from_file(self.service.store().as_ref(), path).await?;
            tracing::info!(module = self.name(), inserted, "books module started");
        } else {
            tracing::info!(module = self.name(), "books module started without seed data");
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        tracing::info!(module = self.name(), "books module stopped");
        Ok(())
    }
}
