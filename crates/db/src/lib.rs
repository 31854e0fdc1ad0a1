//! PostgreSQL client factory, migration runner, and the `db` core module.

use async_trait::async_trait;
use shelf_kernel::{Health, InitCtx, Module};
use sqlx_postgres::PgPool;

pub mod error;
pub mod migrations;
pub mod pool;

pub use error::{is_unique_violation, DbError};
pub use pool::create_pool;

/// Core module owning the shared PostgreSQL pool.
pub struct DatabaseModule {
    pool: PgPool,
}

impl DatabaseModule {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Module for DatabaseModule {
    fn name(&self) -> &'static str {
        "db"
    }

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        pool::test_connection(&self.pool).await?;
        tracing::info!(
            module = self.name(),
            connections = self.pool.size(),
            "database module initialized"
        );
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.pool.close().await;
        tracing::info!(module = self.name(), "database pool closed");
        Ok(())
    }

    async fn health(&self) -> Health {
        match pool::test_connection(&self.pool).await {
            Ok(()) => Health::Up,
            Err(e) => Health::Down(e.to_string()),
        }
    }
}
