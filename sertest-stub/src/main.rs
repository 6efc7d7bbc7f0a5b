//! ser2net-stub: minimal stand-in for the ser2net daemon.
//!
//! # Usage
//!
//! ```text
//! ser2net-stub -r -d -c <config.yaml> [--no-ready]
//! ```
//!
//! Binds every accepter in the config, prints `Ready` on stdout, then bridges
//! clients until SIGTERM or SIGINT.

mod bridge;
mod config;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use config::StubConfig;

#[derive(Parser, Debug)]
#[command(
    name = "ser2net-stub",
    version,
    about = "Stand-in ser2net daemon for harness tests",
    long_about = None,
)]
struct Cli {
    /// Run in the foreground (always the case; accepted for compatibility).
    #[arg(short = 'r')]
    foreground: bool,

    /// Log debug output to stderr.
    #[arg(short = 'd')]
    debug: bool,

    /// YAML connection table.
    #[arg(short = 'c', value_name = "FILE")]
    config: PathBuf,

    /// Never print the readiness line.
    #[arg(long)]
    no_ready: bool,
}

fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if debug { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.debug);
    tracing::debug!(foreground = cli.foreground, config = %cli.config.display(), "starting");

    let config = StubConfig::load(&cli.config)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("build tokio runtime")?;
    let result = runtime.block_on(bridge::run(config, !cli.no_ready));
    // The stdin reader sits in a blocking read; don't wait for it.
    runtime.shutdown_timeout(Duration::from_millis(100));
    result
}
