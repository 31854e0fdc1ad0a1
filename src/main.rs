use anyhow::Context;
use shelf_kernel::settings::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().with_context(|| "failed to load SHELF settings")?;
    shelf_telemetry::init(&settings.telemetry)?;

    tracing::info!(
        env = ?settings.environment,
        store = ?settings.database.backend,
        cache = ?settings.cache.backend,
        "shelf-app bootstrap starting"
    );

    shelf_app::serve(settings).await
}
