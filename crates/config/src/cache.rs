//! Cache backend configuration

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::size::ByteSize;

/// Cache backend selection
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CacheType {
    /// Caching disabled
    #[default]
    None,
    /// Whole records stored in Redis with a sliding TTL
    Redis,
    /// Record locations stored in a SQLite file
    Sqlite,
}

impl CacheType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Redis => "redis",
            Self::Sqlite => "sqlite",
        }
    }
}

/// `[cache]` section
///
/// ```toml
/// [cache]
/// type = "redis"
/// redis_host = "cache.internal"
/// expire_time = "1h"
/// max_record_size = "100KB"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Backend
    /// Default: none
    #[serde(rename = "type")]
    pub cache_type: CacheType,

    /// Default: localhost
    pub redis_host: String,

    /// Default: 6379
    pub redis_port: u16,

    /// Default: 0
    pub redis_db: i64,

    pub redis_password: Option<String>,

    /// Connect, read and write timeout for every Redis command
    /// Default: 5s
    #[serde(with = "humantime_serde")]
    pub redis_timeout: Duration,

    /// How long an entry stays valid after its last hit
    /// Default: 1h
    #[serde(with = "humantime_serde")]
    pub expire_time: Duration,

    /// Records longer than this are not stored in Redis
    /// Default: 100KB
    pub max_record_size: ByteSize,

    /// SQLite database file
    /// Default: liveweb.db
    pub sqlite_path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_type: CacheType::None,
            redis_host: "localhost".into(),
            redis_port: 6379,
            redis_db: 0,
            redis_password: None,
            redis_timeout: Duration::from_secs(5),
            expire_time: Duration::from_secs(3600),
            max_record_size: ByteSize::kb(100),
            sqlite_path: PathBuf::from("liveweb.db"),
        }
    }
}
