//! Archive file storage configuration

use std::path::PathBuf;

use serde::Deserialize;

use crate::size::ByteSize;

/// Default output filename pattern
pub const DEFAULT_FILENAME_PATTERN: &str = "live-{timestamp20}-{serial:05}.arc.gz";

/// Where pool file serial numbers come from
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SequenceSource {
    /// In-process counter starting at zero
    #[default]
    Local,
    /// Shared `INCR` counter on the Redis cache server
    Redis,
}

/// `[storage]` section
///
/// ```toml
/// [storage]
/// directory = "/data/liveweb"
/// filename_pattern = "live-{timestamp20}-{host}-{serial:05}.arc.gz"
/// num_writers = 4
/// filesize_limit = "100MB"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Output directory (holds `partial/` and `complete/`)
    /// Default: records
    pub directory: PathBuf,

    /// Filename pattern for new pool files
    pub filename_pattern: String,

    /// Number of files open for writing at once
    /// Default: 1
    pub num_writers: usize,

    /// A file is promoted to `complete/` once it reaches this size
    /// Default: 100MB
    pub filesize_limit: ByteSize,

    /// Serial number source
    /// Default: local
    pub sequence: SequenceSource,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("records"),
            filename_pattern: DEFAULT_FILENAME_PATTERN.into(),
            num_writers: 1,
            filesize_limit: ByteSize::mb(100),
            sequence: SequenceSource::Local,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config: StorageConfig = toml::from_str("").unwrap();
        assert_eq!(config.directory, PathBuf::from("records"));
        assert_eq!(config.filename_pattern, DEFAULT_FILENAME_PATTERN);
        assert_eq!(config.num_writers, 1);
        assert_eq!(config.filesize_limit, ByteSize::mb(100));
        assert_eq!(config.sequence, SequenceSource::Local);
    }

    #[test]
    fn test_custom() {
        let toml = r#"
directory = "/data/arc"
filename_pattern = "test-{serial:05}"
num_writers = 4
filesize_limit = "1GB"
sequence = "redis"
"#;
        let config: StorageConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.directory, PathBuf::from("/data/arc"));
        assert_eq!(config.num_writers, 4);
        assert_eq!(config.filesize_limit, ByteSize::gb(1));
        assert_eq!(config.sequence, SequenceSource::Redis);
    }
}
