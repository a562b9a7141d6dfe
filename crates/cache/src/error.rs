//! Cache errors

use std::io;

use thiserror::Error;

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

/// Cache backend errors
///
/// Backend failures are reported as-is; there is no fallback to another
/// backend.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Redis command or connection failure
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// SQLite failure
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to read record bytes for storing
    #[error("failed to read record: {0}")]
    Io(#[from] io::Error),

    /// Failed to create the database directory
    #[error("failed to create directory {path}")]
    CreateDir {
        path: String,
        #[source]
        source: io::Error,
    },
}
