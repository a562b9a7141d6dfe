//! Proxy listener configuration

use serde::Deserialize;

/// What the proxy sends back for a fetched URL
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ServeMode {
    /// The encoded archive record (`application/x-arc-record`)
    #[default]
    Archive,
    /// The original HTTP response, reconstructed from the record
    Passthrough,
}

impl ServeMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Archive => "archive",
            Self::Passthrough => "passthrough",
        }
    }
}

/// `[server]` section
///
/// ```toml
/// [server]
/// listen = "0.0.0.0"
/// port = 7070
/// mode = "passthrough"
/// blocking_threads = 128
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind
    /// Default: 127.0.0.1
    pub listen: String,

    /// Port to bind
    /// Default: 7070
    pub port: u16,

    /// Response mode
    /// Default: archive
    pub mode: ServeMode,

    /// Upper bound on concurrently running capture jobs. Each job owns one
    /// blocking thread for the whole fetch-and-write.
    /// Default: 64
    pub blocking_threads: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1".into(),
            port: 7070,
            mode: ServeMode::Archive,
            blocking_threads: 64,
        }
    }
}

impl ServerConfig {
    /// `host:port` to bind
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}
