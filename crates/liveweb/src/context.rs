//! Process-wide proxy state
//!
//! Built once at startup and shared by every request: the fetcher, the file
//! pool, the record writer and the cache. Nothing here is global; handlers
//! get an `Arc<AppContext>`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use liveweb_archive::{
    ArcGzipEncoder, ArchiveError, ArchiveWriter, FileHeader, FilePool, LocalSerial, PoolConfig,
    Record, SerialSource,
};
use liveweb_cache::{Cache, RedisSerial};
use liveweb_capture::{Fetcher, FetcherConfig};
use liveweb_config::{Config, FetchConfig, SequenceSource, ServeMode};

/// Request counters
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    pub requests: AtomicU64,
    pub cache_hits: AtomicU64,
    pub cache_errors: AtomicU64,
    pub fetch_failures: AtomicU64,
    pub archive_errors: AtomicU64,
}

impl ServiceMetrics {
    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        ServiceMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_errors: self.cache_errors.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            archive_errors: self.archive_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceMetricsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_errors: u64,
    pub fetch_failures: u64,
    pub archive_errors: u64,
}

/// Everything a capture needs
pub struct AppContext {
    fetcher: Fetcher,
    pool: FilePool,
    writer: ArchiveWriter,
    cache: Cache,
    mode: ServeMode,
    log_requests: bool,
    metrics: ServiceMetrics,
}

impl AppContext {
    pub fn new(
        fetcher: Fetcher,
        pool: FilePool,
        writer: ArchiveWriter,
        cache: Cache,
        mode: ServeMode,
    ) -> Self {
        Self {
            fetcher,
            pool,
            writer,
            cache,
            mode,
            log_requests: false,
            metrics: ServiceMetrics::default(),
        }
    }

    /// Log one info line per captured URL
    pub fn with_request_log(mut self, enabled: bool) -> Self {
        self.log_requests = enabled;
        self
    }

    /// Build the fetcher, pool, writer and cache described by `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let encoder = ArcGzipEncoder::default();

        let serial: Arc<dyn SerialSource> = match config.storage.sequence {
            SequenceSource::Local => Arc::new(LocalSerial::default()),
            SequenceSource::Redis => Arc::new(
                RedisSerial::from_config(&config.cache)
                    .context("failed to create redis serial source")?,
            ),
        };

        let pool = FilePool::with_parts(
            PoolConfig {
                directory: config.storage.directory.clone(),
                pattern: config.storage.filename_pattern.clone(),
                capacity: config.storage.num_writers,
                max_file_size: config.storage.filesize_limit.as_u64(),
                port: config.server.port,
            },
            serial,
            Some(Arc::new(FileHeader(encoder))),
        )
        .context("failed to create file pool")?;

        let cache = Cache::from_config(&config.cache).context("failed to create cache")?;

        Ok(Self::new(
            Fetcher::new(fetcher_config(&config.fetch)),
            pool,
            ArchiveWriter::new(encoder),
            cache,
            config.server.mode,
        )
        .with_request_log(config.log.requests))
    }

    pub fn mode(&self) -> ServeMode {
        self.mode
    }

    pub fn writer(&self) -> &ArchiveWriter {
        &self.writer
    }

    pub fn pool(&self) -> &FilePool {
        &self.pool
    }

    pub fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    /// Record for `url`: from the cache, or fetched live and archived
    ///
    /// Blocks for the whole fetch. A failed fetch is archived as a bad
    /// gateway; only storage failures are returned. Cache failures are
    /// logged and the request carries on as a miss.
    pub fn capture(&self, url: &str) -> Result<Record, ArchiveError> {
        self.metrics.requests.fetch_add(1, Ordering::Relaxed);

        match self.cache.get(url) {
            Ok(Some(record)) => {
                self.metrics.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.log_request(url, "cache", &record);
                return Ok(record);
            }
            Ok(None) => {}
            Err(e) => {
                self.metrics.cache_errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(url = %url, error = %e, "cache lookup failed");
            }
        }

        let mut tx = self.fetcher.fetch_or_bad_gateway(url);
        if tx.is_bad_gateway() {
            self.metrics.fetch_failures.fetch_add(1, Ordering::Relaxed);
        }

        let written = self.writer.write(&mut tx, &self.pool);
        if let Err(e) = tx.close() {
            tracing::warn!(url = %url, error = %e, "failed to remove spill file");
        }
        let record = written.inspect_err(|e| {
            self.metrics.archive_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(url = %url, error = %e, "failed to archive capture");
        })?;

        if let Err(e) = self.cache.set(url, &record) {
            self.metrics.cache_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(url = %url, error = %e, "cache store failed");
        }

        self.log_request(url, "live", &record);
        Ok(record)
    }

    fn log_request(&self, url: &str, source: &'static str, record: &Record) {
        if self.log_requests {
            tracing::info!(
                url = %url,
                source,
                length = record.content_length(),
                "request served"
            );
        } else {
            tracing::debug!(url = %url, source, "request served");
        }
    }

    /// Flush and close the pool, logging final counters
    pub fn close(&self) {
        let service = self.metrics.snapshot();
        let pool = self.pool.metrics().snapshot();
        tracing::info!(
            requests = service.requests,
            cache_hits = service.cache_hits,
            cache_errors = service.cache_errors,
            fetch_failures = service.fetch_failures,
            archive_errors = service.archive_errors,
            files_created = pool.files_created,
            files_promoted = pool.files_promoted,
            bytes_written = pool.bytes_written,
            "final counters"
        );

        if let Err(e) = self.pool.close() {
            tracing::error!(error = %e, "failed to close file pool");
        }
    }
}

/// Fetcher settings with stage timeouts resolved against the default
pub fn fetcher_config(config: &FetchConfig) -> FetcherConfig {
    FetcherConfig {
        user_agent: config.user_agent.clone(),
        dns_timeout: config.dns_timeout(),
        connect_timeout: config.connect_timeout(),
        initial_data_timeout: config.initial_data_timeout(),
        read_timeout: config.read_timeout(),
        max_request_time: Some(config.max_request_time),
        max_response_size: Some(config.max_response_size.as_u64()),
        spill_threshold: config.spill_threshold.as_usize(),
        spill_directory: config.spill_directory.clone(),
    }
}
