//! Live fetch timeouts and limits
//!
//! Every stage of a fetch has its own timeout. A stage left unset falls back
//! to `default_timeout`, so a minimal config only needs that one value.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::size::ByteSize;

/// User agent sent with every live request
pub const DEFAULT_USER_AGENT: &str = "ia_archiver(OS-Wayback)";

/// `[fetch]` section
///
/// ```toml
/// [fetch]
/// default_timeout = "10s"
/// initial_data_timeout = "30s"
/// max_request_time = "5m"
/// max_response_size = "100MB"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Default: ia_archiver(OS-Wayback)
    pub user_agent: String,

    /// Fallback for any stage timeout that is not set
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub default_timeout: Duration,

    /// Name resolution deadline
    #[serde(with = "humantime_serde")]
    pub dns_timeout: Option<Duration>,

    /// TCP connect deadline
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Option<Duration>,

    /// Wait for the first byte of the status line
    #[serde(with = "humantime_serde")]
    pub initial_data_timeout: Option<Duration>,

    /// Inactivity allowed between two socket reads once the response began
    #[serde(with = "humantime_serde")]
    pub read_timeout: Option<Duration>,

    /// Wall-clock budget for the whole request, from connect
    /// Default: 5m
    #[serde(with = "humantime_serde")]
    pub max_request_time: Duration,

    /// Ceiling on bytes received for a single response
    /// Default: 100MB
    pub max_response_size: ByteSize,

    /// Captures larger than this move from memory to a temp file
    /// Default: 1MB
    pub spill_threshold: ByteSize,

    /// Directory for spilled captures (system temp dir when unset)
    pub spill_directory: Option<PathBuf>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.into(),
            default_timeout: Duration::from_secs(10),
            dns_timeout: None,
            connect_timeout: None,
            initial_data_timeout: None,
            read_timeout: None,
            max_request_time: Duration::from_secs(5 * 60),
            max_response_size: ByteSize::mb(100),
            spill_threshold: ByteSize::mb(1),
            spill_directory: None,
        }
    }
}

impl FetchConfig {
    pub fn dns_timeout(&self) -> Duration {
        self.dns_timeout.unwrap_or(self.default_timeout)
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(self.default_timeout)
    }

    pub fn initial_data_timeout(&self) -> Duration {
        self.initial_data_timeout.unwrap_or(self.default_timeout)
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout.unwrap_or(self.default_timeout)
    }
}
