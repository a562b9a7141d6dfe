//! Liveweb Configuration
//!
//! TOML-based configuration loading with sensible defaults. An empty file
//! is a valid configuration: archive mode on 127.0.0.1:7070, records
//! written under `records/`, no cache.
//!
//! # Parsing
//!
//! ```
//! use liveweb_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[server]\nport = 8080").unwrap();
//! assert_eq!(config.server.port, 8080);
//! ```
//!
//! # Example Config
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0"
//! mode = "archive"
//!
//! [fetch]
//! default_timeout = "10s"
//! max_response_size = "100MB"
//!
//! [storage]
//! directory = "/data/liveweb"
//! num_writers = 4
//!
//! [cache]
//! type = "redis"
//! expire_time = "1h"
//! ```

mod cache;
mod error;
mod fetch;
mod logging;
mod server;
mod size;
mod storage;
mod validation;

use std::fs;
use std::path::Path;
use std::str::FromStr;

pub use cache::{CacheConfig, CacheType};
pub use error::{ConfigError, Result};
pub use fetch::{DEFAULT_USER_AGENT, FetchConfig};
pub use logging::{LogConfig, LogFormat, LogLevel, LogOutput};
pub use server::{ServeMode, ServerConfig};
pub use size::{ByteSize, ParseSizeError};
pub use storage::{DEFAULT_FILENAME_PATTERN, SequenceSource, StorageConfig};

use serde::Deserialize;

/// Main configuration structure
///
/// All sections are optional with sensible defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Diagnostic logging
    pub log: LogConfig,

    /// Listener and response mode
    pub server: ServerConfig,

    /// Live fetch timeouts and limits
    pub fetch: FetchConfig,

    /// Archive file pool
    pub storage: StorageConfig,

    /// Read-through cache
    pub cache: CacheConfig,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns error if file cannot be read, contains invalid TOML or fails
    /// validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::IoError {
            path: path.display().to_string(),
            source: e,
        })?;

        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    ///
    /// Called by the loaders; call it again after applying command-line
    /// overrides.
    pub fn validate(&self) -> Result<()> {
        validation::validate_config(self)
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
