//! groupbin uploader entry point.

mod app;
mod cli;
mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting groupbin uploader");

    let mut config = config::Config::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    tracing::debug!(server = %config.server, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(app::run(cli, config))
}
