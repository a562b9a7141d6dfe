//! Liveweb Archive
//!
//! Turns captured transactions into ARC records and writes them through a
//! pool of rotating output files.
//!
//! # Write path
//!
//! ```text
//! Transaction ─► ArchiveWriter ─► RecordEncoder ─► PoolHandle ─► partial/<file>
//!                     │                                              │ (full)
//!                     └──► Record {file, offset, length, bytes?}     ▼
//!                                                              complete/<file>
//! ```
//!
//! # Example
//!
//! ```no_run
//! use liveweb_archive::{ArchiveWriter, FilePool, PoolConfig};
//! use liveweb_capture::Fetcher;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = FilePool::new(PoolConfig {
//!     directory: "records".into(),
//!     pattern: "live-{timestamp20}-{serial:05}.arc.gz".into(),
//!     capacity: 4,
//!     max_file_size: 100 * 1024 * 1024,
//!     port: 7070,
//! })?;
//!
//! let mut tx = Fetcher::default().fetch_or_bad_gateway("http://example.com/");
//! let record = ArchiveWriter::default().write(&mut tx, &pool)?;
//! println!("{} bytes at offset {}", record.content_length(), record.offset());
//! # Ok(())
//! # }
//! ```

pub mod arc;
pub mod error;
pub mod pool;
pub mod record;
pub mod writer;

pub use arc::{
    ARC_RECORD_CONTENT_TYPE, ArcEntry, ArcFileReader, ArcGzipEncoder, ArcMetadata, DecodedRecord,
    RecordEncoder,
};
pub use error::{ArchiveError, PoolError, PoolResult, Result};
pub use pool::{
    FileInit, FilePool, FilenamePattern, LocalSerial, PoolConfig, PoolHandle, PoolMetrics,
    PoolMetricsSnapshot, SerialSource, SizedWrite,
};
pub use record::{Record, RecordLocation};
pub use writer::{ArchiveWriter, DEFAULT_INLINE_THRESHOLD, FileHeader};
