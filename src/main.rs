//! routescout: route discovery and manifest synthesis.
//!
//! This is the main entry point for the routescout binary. It parses the
//! command line, installs logging and hands off to the command handler.
//!
//! # I/O Architecture
//!
//! - **Logging**: `tracing` output goes to stderr only
//! - **Stdout**: reserved for manifests written to `-` and for the path of a
//!   manifest written to disk, so the binary composes in shell pipelines

use anyhow::{Context, Result};
use clap::Parser;
use routescout::{cli::Cli, cli_handler};
use tracing::debug;

fn main() -> Result<()> {
    // Parse CLI arguments first (before any other initialization)
    let cli = Cli::parse();

    init_tracing(cli.verbose)?;

    debug!("Parsed CLI arguments: {:?}", cli);

    cli_handler::handle_command(cli)
}

/// Initialize the tracing subscriber.
///
/// # Verbosity Levels
/// - 0 (default): Only warnings and errors (or `RUST_LOG`)
/// - 1 (-v): Info level
/// - 2 (-vv): Debug level
/// - 3+ (-vvv): Trace level
fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    Ok(())
}
