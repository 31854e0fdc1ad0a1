use async_trait::async_trait;
use axum::Router;
use serde::Serialize;

/// Context handed to modules while the application boots
pub struct InitCtx<'a> {
    pub settings: &'a crate::settings::Settings,
}

/// Schema change contributed by a module, applied once per database
#[derive(Debug, Clone)]
pub struct Migration {
    pub id: &'static str,
    pub up: &'static str,
}

/// Readiness of a single module as reported on `/readyz`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "lowercase")]
pub enum Health {
    Up,
    /// Serving, but with a fallback in place (e.g. local cache instead of Redis)
    Degraded(String),
    Down(String),
}

impl Health {
    pub fn is_down(&self) -> bool {
        matches!(self, Health::Down(_))
    }
}

/// Lifecycle contract every SHELF module implements.
///
/// Order during boot: `init` for every module, then migrations, then `start`.
/// Shutdown calls `stop` in reverse registration order.
#[async_trait]
pub trait Module: Sync + Send {
    /// Unique name, also used as the mount point `/api/{name}`
    fn name(&self) -> &'static str;

    async fn init(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    /// Routes for this module, nested under `/api/{name}`
    fn routes(&self) -> Router {
        Router::new()
    }

    /// OpenAPI fragment (`paths` and `components.schemas`) merged into the served document
    fn openapi(&self) -> Option<serde_json::Value> {
        None
    }

    /// Migrations are executed in the order returned
    fn migrations(&self) -> Vec<Migration> {
        vec![]
    }

    /// Called after migrations are complete
    async fn start(&self, _ctx: &InitCtx<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    /// Current readiness; modules without external dependencies are always up
    async fn health(&self) -> Health {
        Health::Up
    }
}
