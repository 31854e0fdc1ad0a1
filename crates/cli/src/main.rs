use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use shelf_app::modules::books::store::seed_from_file;
use shelf_kernel::settings::{Settings, StoreBackend};

#[derive(Debug, Parser)]
#[command(name = "shelf", version, about = "SHELF book catalog administration")]
struct Cli {
    /// Directory holding base.toml and the per-environment overlays
    #[arg(long, global = true, env = "SHELF_CONFIG_DIR")]
    config_dir: Option<PathBuf>,

    /// Environment overlay to apply (local, staging, production)
    #[arg(long = "env", global = true, env = "SHELF_ENV", default_value = "local")]
    environment: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP server
    Serve,
    /// Apply pending schema migrations to the configured PostgreSQL database
    Migrate,
    /// Load seed books into the configured record store
    Seed {
        /// Seed file; defaults to `database.seed_path`
        #[arg(long)]
        file: Option<PathBuf>,
    },
    /// Print an Argon2 PHC hash for a users file entry
    HashPassword { secret: String },
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        match &self.config_dir {
            Some(dir) => Settings::load_from(dir, &self.environment),
            None => Settings::load(),
        }
        .with_context(|| "failed to load SHELF settings")
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Command::HashPassword { secret } = &cli.command {
        println!("{}", shelf_authz::hash_secret(secret)?);
        return Ok(());
    }

    let settings = cli.settings()?;
    shelf_telemetry::init(&settings.telemetry)?;

    match cli.command {
        Command::Serve => shelf_app::serve(settings).await,
        Command::Migrate => {
            if settings.database.backend != StoreBackend::Postgres {
                anyhow::bail!("migrate needs database.backend = \"postgres\"");
            }
            let app = shelf_app::build(settings).await?;
            let applied = app.migrate().await?;
            println!("applied {applied} migration(s)");
            Ok(())
        }
        Command::Seed { file } => {
            let path = file
                .or_else(|| settings.database.seed_path.clone().map(PathBuf::from))
                .context("no seed file given and database.seed_path is unset")?;
            if settings.database.backend == StoreBackend::Memory {
                tracing::warn!("seeding the in-memory store; records vanish when this command exits");
            }

            let app = shelf_app::build(settings).await?;
            app.migrate().await?;
            let inserted = seed_from_file(app.catalog.store().as_ref(), &path).await?;
            println!("seeded {inserted} book(s) from {}", path.display());
            Ok(())
        }
        Command::HashPassword { .. } => Ok(()),
    }
}
