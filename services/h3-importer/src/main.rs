//! H3 grid importer.
//!
//! Converts raster folders and GeoJSON files to H3 grid tables in
//! PostgreSQL and maintains their catalog entries, material and indicator
//! links and contextual layers.

mod cli;
mod commands;
mod config;
mod fetch;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use cli::{Cli, Command};
use config::{AppConfig, LogFormat};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref())?;
    init_tracing(&cli, &config)?;

    info!(command = ?cli.command, "Starting h3-importer");

    match cli.command {
        Command::Raster(args) => commands::raster(&config, args).await,
        Command::Vector(args) => commands::vector(&config, args).await,
        Command::Register(args) => commands::register(&config, args).await,
        Command::LinkLayer(args) => commands::link_layer(&config, args).await,
        Command::Gc(args) => commands::gc(&config, args).await,
        Command::Fetch(args) => commands::fetch(&config, args).await,
        Command::Bootstrap => commands::bootstrap(&config).await,
    }
}

/// `--log-level` wins over `RUST_LOG`, which wins over the config file.
fn init_tracing(cli: &Cli, config: &AppConfig) -> Result<()> {
    let filter = match &cli.log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&config.logging.level))?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);

    match cli.log_format.unwrap_or(config.logging.format) {
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish())?,
        LogFormat::Pretty => tracing::subscriber::set_global_default(builder.pretty().finish())?,
    }
    Ok(())
}
