//! Command implementations for the liveweb CLI

pub mod fetch;
pub mod read;
pub mod serve;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use liveweb_config::{CacheType, Config, ServeMode};

/// Paths tried, in order, when no `--config` is given
const DEFAULT_CONFIG_PATHS: [&str; 2] = ["configs/liveweb.toml", "liveweb.toml"];

/// Command-line overrides for config file values
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Address to listen on
    #[arg(long, env = "LIVEWEB_LISTEN")]
    pub listen: Option<String>,

    /// Port to listen on
    #[arg(short, long, env = "LIVEWEB_PORT")]
    pub port: Option<u16>,

    /// Directory for archive files
    #[arg(short = 'd', long, env = "LIVEWEB_OUTPUT_DIRECTORY")]
    pub output_directory: Option<PathBuf>,

    /// Cache backend (none, redis, sqlite)
    #[arg(long, env = "LIVEWEB_CACHE", value_parser = parse_cache_type)]
    pub cache: Option<CacheType>,

    /// Serve the original HTTP response instead of the archive record
    #[arg(long, env = "LIVEWEB_HTTP_PASSTHROUGH")]
    pub http_passthrough: bool,
}

impl Overrides {
    /// Apply the overrides that were given
    pub fn apply(&self, config: &mut Config) {
        if let Some(listen) = &self.listen {
            config.server.listen = listen.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(dir) = &self.output_directory {
            config.storage.directory = dir.clone();
        }
        if let Some(cache) = self.cache {
            config.cache.cache_type = cache;
        }
        if self.http_passthrough {
            config.server.mode = ServeMode::Passthrough;
        }
    }
}

fn parse_cache_type(s: &str) -> Result<CacheType, String> {
    match s.to_ascii_lowercase().as_str() {
        "none" => Ok(CacheType::None),
        "redis" => Ok(CacheType::Redis),
        "sqlite" => Ok(CacheType::Sqlite),
        other => Err(format!("unknown cache type '{}'", other)),
    }
}

/// Load the config file, apply overrides and validate the result
///
/// An explicit path must exist. Without one the default paths are tried and
/// the built-in defaults are used when none exists.
pub fn load_config(path: Option<&Path>, overrides: &Overrides) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("config file not found: {}", path.display());
            }
            Config::from_file(path).context("failed to load configuration")?
        }
        None => match DEFAULT_CONFIG_PATHS.iter().map(Path::new).find(|p| p.exists()) {
            Some(path) => Config::from_file(path).context("failed to load configuration")?,
            None => Config::default(),
        },
    };

    overrides.apply(&mut config);
    config.validate().context("invalid configuration")?;
    Ok(config)
}
