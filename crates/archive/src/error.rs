//! Archive and pool errors

use std::io;

use thiserror::Error;

/// Result type for pool operations
pub type PoolResult<T> = std::result::Result<T, PoolError>;

/// Result type for archive operations
pub type Result<T> = std::result::Result<T, ArchiveError>;

/// File pool errors
#[derive(Debug, Error)]
pub enum PoolError {
    /// Failed to create the pool directories
    #[error("failed to create directory {path}")]
    CreateDir {
        path: String,
        #[source]
        source: io::Error,
    },

    /// Failed to create a new pool file
    #[error("failed to open pool file {path}")]
    Open {
        path: String,
        #[source]
        source: io::Error,
    },

    /// The generated name is already taken
    #[error("pool file {path} already exists")]
    FileExists { path: String },

    /// Failed to move a full file into `complete/`
    #[error("failed to promote {from} to {to}")]
    Promote {
        from: String,
        to: String,
        #[source]
        source: io::Error,
    },

    /// Filename pattern could not be parsed
    #[error("invalid filename pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The serial number source failed
    #[error("failed to get next serial number")]
    Serial(#[source] io::Error),

    /// Pool built with no slots
    #[error("pool capacity must be at least 1")]
    ZeroCapacity,

    /// The pool was closed
    #[error("file pool is closed")]
    Closed,

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PoolError {
    /// Create an invalid pattern error
    pub fn invalid_pattern(pattern: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.into(),
            message: message.into(),
        }
    }
}

/// Record encoding, decoding and writing errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Data that does not decode as an ARC record
    #[error("invalid ARC record: {0}")]
    InvalidRecord(String),
}

impl ArchiveError {
    /// Create an invalid record error
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        Self::InvalidRecord(msg.into())
    }
}
