//! Configuration validation
//!
//! Rejects settings the proxy cannot run with:
//! - storage: empty directory or pattern, zero writers, zero size limit
//! - fetch: empty user agent, zero timeouts, zero response size
//! - cache/storage: a Redis sequence without a Redis cache to host it

use std::time::Duration;

use crate::Config;
use crate::cache::CacheType;
use crate::error::{ConfigError, Result};
use crate::storage::SequenceSource;

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server(config)?;
    validate_fetch(config)?;
    validate_storage(config)?;
    validate_cache(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    if config.server.listen.is_empty() {
        return Err(ConfigError::missing_field("server", "listen"));
    }
    if config.server.blocking_threads == 0 {
        return Err(ConfigError::invalid_value(
            "server",
            "blocking_threads",
            "must be at least 1",
        ));
    }
    Ok(())
}

fn validate_fetch(config: &Config) -> Result<()> {
    let fetch = &config.fetch;

    if fetch.user_agent.trim().is_empty() {
        return Err(ConfigError::missing_field("fetch", "user_agent"));
    }

    for (field, value) in [
        ("default_timeout", Some(fetch.default_timeout)),
        ("dns_timeout", fetch.dns_timeout),
        ("connect_timeout", fetch.connect_timeout),
        ("initial_data_timeout", fetch.initial_data_timeout),
        ("read_timeout", fetch.read_timeout),
        ("max_request_time", Some(fetch.max_request_time)),
    ] {
        if value == Some(Duration::ZERO) {
            return Err(ConfigError::invalid_value("fetch", field, "must be non-zero"));
        }
    }

    if fetch.max_response_size.as_u64() == 0 {
        return Err(ConfigError::invalid_value(
            "fetch",
            "max_response_size",
            "must be non-zero",
        ));
    }

    Ok(())
}

fn validate_storage(config: &Config) -> Result<()> {
    let storage = &config.storage;

    if storage.directory.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("storage", "directory"));
    }
    if storage.filename_pattern.trim().is_empty() {
        return Err(ConfigError::missing_field("storage", "filename_pattern"));
    }
    if storage.filename_pattern.contains('/') {
        return Err(ConfigError::invalid_value(
            "storage",
            "filename_pattern",
            "must name a file, not a path",
        ));
    }
    if storage.num_writers == 0 {
        return Err(ConfigError::invalid_value(
            "storage",
            "num_writers",
            "must be at least 1",
        ));
    }
    if storage.filesize_limit.as_u64() == 0 {
        return Err(ConfigError::invalid_value(
            "storage",
            "filesize_limit",
            "must be non-zero",
        ));
    }

    Ok(())
}

fn validate_cache(config: &Config) -> Result<()> {
    if config.storage.sequence == SequenceSource::Redis
        && config.cache.cache_type != CacheType::Redis
    {
        return Err(ConfigError::invalid_value(
            "storage",
            "sequence",
            "a redis sequence requires [cache] type = \"redis\"",
        ));
    }

    match config.cache.cache_type {
        CacheType::Redis => {
            if config.cache.redis_host.is_empty() {
                return Err(ConfigError::missing_field("cache", "redis_host"));
            }
            if config.cache.redis_timeout.is_zero() {
                return Err(ConfigError::invalid_value(
                    "cache",
                    "redis_timeout",
                    "must be non-zero",
                ));
            }
            if config.cache.expire_time.as_secs() == 0 {
                return Err(ConfigError::invalid_value(
                    "cache",
                    "expire_time",
                    "must be at least one second",
                ));
            }
        }
        CacheType::Sqlite => {
            if config.cache.sqlite_path.as_os_str().is_empty() {
                return Err(ConfigError::missing_field("cache", "sqlite_path"));
            }
        }
        CacheType::None => {}
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use crate::{Config, ConfigError};

    fn expect_invalid(toml: &str, field: &str) {
        match Config::from_str(toml) {
            Err(ConfigError::InvalidValue { field: f, .. })
            | Err(ConfigError::MissingField { field: f, .. }) => assert_eq!(f, field),
            other => panic!("expected validation error for {field}, got {other:?}"),
        }
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::from_str("").is_ok());
    }

    #[test]
    fn test_zero_writers_rejected() {
        expect_invalid("[storage]\nnum_writers = 0", "num_writers");
    }

    #[test]
    fn test_zero_filesize_rejected() {
        expect_invalid("[storage]\nfilesize_limit = 0", "filesize_limit");
    }

    #[test]
    fn test_pattern_with_directory_rejected() {
        expect_invalid(
            "[storage]\nfilename_pattern = \"sub/live-{serial}\"",
            "filename_pattern",
        );
    }

    #[test]
    fn test_empty_user_agent_rejected() {
        expect_invalid("[fetch]\nuser_agent = \" \"", "user_agent");
    }

    #[test]
    fn test_zero_timeout_rejected() {
        expect_invalid("[fetch]\nread_timeout = \"0s\"", "read_timeout");
    }

    #[test]
    fn test_zero_redis_timeout_rejected() {
        expect_invalid("[cache]\ntype = \"redis\"\nredis_timeout = \"0s\"", "redis_timeout");
    }

    #[test]
    fn test_redis_sequence_requires_redis_cache() {
        expect_invalid("[storage]\nsequence = \"redis\"", "sequence");

        let ok = "[storage]\nsequence = \"redis\"\n[cache]\ntype = \"redis\"";
        assert!(Config::from_str(ok).is_ok());
    }

    #[test]
    fn test_zero_blocking_threads_rejected() {
        expect_invalid("[server]\nblocking_threads = 0", "blocking_threads");
    }
}
