//! sync-server binary entry point.
//!
//! Usage:
//! ```bash
//! sync-server --config sync-server.toml
//! RUST_LOG=debug sync-server
//! sync-server --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use synced_resources_server::config::Config;
use synced_resources_server::http::health::init_start_time;
use synced_resources_server::server::SyncServer;
use synced_resources_server::storage::SqliteStorage;
use tracing_subscriber::EnvFilter;

/// HTTP server for delta-synced REST collections.
#[derive(Parser, Debug)]
#[command(name = "sync-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, short, default_value = "sync-server.toml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = if cli.config.exists() {
        Config::from_file(&cli.config)
            .with_context(|| format!("loading {}", cli.config.display()))?
    } else {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
        Config::default()
    };

    let storage = SqliteStorage::new(&config.storage.database)
        .await
        .with_context(|| format!("opening {}", config.storage.database.display()))?;

    init_start_time();
    let server = Arc::new(SyncServer::new(config, storage)?);
    server.run().await?;
    Ok(())
}
