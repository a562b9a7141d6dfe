//! Liveweb Cache
//!
//! Read-through cache in front of the fetch-and-archive path. Keys are URLs,
//! values are [`Record`]s.
//!
//! | Backend      | Stores                   | Size ceiling       | Expiry            |
//! |--------------|--------------------------|--------------------|-------------------|
//! | `None`       | nothing                  | -                  | -                 |
//! | `KeyValue`   | full record bytes        | `max_record_size`  | sliding, per hit  |
//! | `Relational` | file, offset, length     | none               | fixed, from write |
//!
//! Backend failures are returned to the caller unchanged.

pub mod error;
mod redis_cache;
mod sqlite;

pub use error::{CacheError, Result};
pub use redis_cache::{RedisCache, RedisSerial, SEQUENCE_KEY};
pub use sqlite::SqliteCache;

use liveweb_archive::Record;
use liveweb_config::{CacheConfig, CacheType};

/// Configured cache backend
pub enum Cache {
    /// Every lookup misses
    None,
    KeyValue(RedisCache),
    Relational(SqliteCache),
}

impl Cache {
    /// Build the backend selected by `config`
    ///
    /// Redis connects lazily, so an unreachable server only shows up on the
    /// first `get`/`set`.
    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        let cache = match config.cache_type {
            CacheType::None => Cache::None,
            CacheType::Redis => Cache::KeyValue(RedisCache::from_config(config)?),
            CacheType::Sqlite => {
                Cache::Relational(SqliteCache::open(&config.sqlite_path, config.expire_time)?)
            }
        };

        tracing::info!(
            backend = config.cache_type.as_str(),
            expire_time = ?config.expire_time,
            "cache created"
        );
        Ok(cache)
    }

    pub fn backend(&self) -> &'static str {
        match self {
            Cache::None => "none",
            Cache::KeyValue(_) => "redis",
            Cache::Relational(_) => "sqlite",
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Cache::None)
    }

    /// Look up `url`; `Ok(None)` is a miss
    pub fn get(&self, url: &str) -> Result<Option<Record>> {
        match self {
            Cache::None => Ok(None),
            Cache::KeyValue(cache) => cache.get(url),
            Cache::Relational(cache) => cache.get(url),
        }
    }

    /// Store `record` under `url`
    ///
    /// A backend may decline to store a record (too large, or no file to
    /// point at); that is not an error.
    pub fn set(&self, url: &str, record: &Record) -> Result<()> {
        match self {
            Cache::None => Ok(()),
            Cache::KeyValue(cache) => cache.set(url, record),
            Cache::Relational(cache) => cache.set(url, record),
        }
    }
}
