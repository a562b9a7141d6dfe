//! Liveweb - capture proxy for web archiving
//!
//! # Usage
//!
//! ```bash
//! # Run the proxy (default)
//! liveweb
//! liveweb --config configs/liveweb.toml --port 8080 --http-passthrough
//!
//! # Capture one URL into the pool
//! liveweb fetch http://example.com/
//!
//! # List the records of an archive file
//! liveweb read records/complete/live-20240101000000000000-00001.arc.gz
//! ```

mod cmd;
mod context;
mod service;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use liveweb_config::{Config, LogFormat, LogOutput};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Liveweb - capture proxy for web archiving
#[derive(Parser, Debug)]
#[command(name = "liveweb")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true, env = "LIVEWEB_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true, env = "LIVEWEB_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(flatten)]
    overrides: cmd::Overrides,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the proxy
    Serve,

    /// Capture a single URL into the archive pool
    Fetch(cmd::fetch::FetchArgs),

    /// List the records of an archive file
    Read(cmd::read::ReadArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Read(args)) => {
            // Read doesn't need logging - just outputs to stdout
            cmd::read::run(args)
        }
        Some(Command::Fetch(args)) => {
            let config = cmd::load_config(cli.config.as_deref(), &cli.overrides)?;
            init_logging(&config, cli.log_level.as_deref())?;
            cmd::fetch::run(config, args).await
        }
        // No subcommand = run the proxy
        Some(Command::Serve) | None => {
            let config = cmd::load_config(cli.config.as_deref(), &cli.overrides)?;
            init_logging(&config, cli.log_level.as_deref())?;
            cmd::serve::run(config).await
        }
    }
}

/// Initialize the tracing subscriber
///
/// Level: CLI flag > config file > "info". `RUST_LOG`-style directives are
/// accepted in either place.
fn init_logging(config: &Config, cli_level: Option<&str>) -> Result<()> {
    let level = cli_level.unwrap_or(config.log.level.as_str());
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    let writer = match &config.log.output {
        LogOutput::Stdout => fmt::writer::BoxMakeWriter::new(std::io::stdout),
        LogOutput::Stderr => fmt::writer::BoxMakeWriter::new(std::io::stderr),
        LogOutput::File(path) => {
            fmt::writer::BoxMakeWriter::new(Arc::new(open_log_file(path)?))
        }
    };

    let registry = tracing_subscriber::registry().with(filter);
    match config.log.format {
        LogFormat::Console => registry
            .with(fmt::layer().with_target(true).with_writer(writer))
            .init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(writer))
            .init(),
    }

    Ok(())
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open log file {}", path.display()))
}
