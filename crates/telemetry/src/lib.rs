//! Tracing bootstrap shared by the server and the CLI.

use anyhow::anyhow;
use once_cell::sync::OnceCell;
use shelf_kernel::settings::{LogFormat, TelemetrySettings};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Build the filter: `RUST_LOG` wins, otherwise the configured level.
pub fn env_filter(settings: &TelemetrySettings) -> anyhow::Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&settings.level)
            .map_err(|e| anyhow!("invalid log level '{}': {}", settings.level, e)),
    }
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init(settings: &TelemetrySettings) -> anyhow::Result<()> {
    if INSTALLED.get().is_some() {
        return Ok(());
    }

    let filter = env_filter(settings)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match settings.log_format {
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(true))
            .try_init(),
    };

    // Another subscriber (e.g. a test harness) may already own the global slot.
    if let Err(e) = installed {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
    let _ = INSTALLED.set(());

    tracing::info!(
        target: "shelf-telemetry",
        format = ?settings.log_format,
        level = %settings.level,
        "telemetry initialized"
    );
    Ok(())
}
