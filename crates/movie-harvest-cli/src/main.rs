use anyhow::{anyhow, Result};
use clap::Parser;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    init_tracing()?;
    let cli = movie_harvest_cli::Cli::parse();
    movie_harvest_cli::run_cli(cli)
}

/// Logs go to stderr so `--json` output on stdout stays parseable.
fn init_tracing() -> Result<()> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .with_env_var("LOG_LEVEL")
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .map_err(|err| anyhow!("failed to initialize logging: {err}"))
}
