//! Rotating file pool
//!
//! A fixed number of slots, each holding at most one open output file.
//! Writers check a slot out with [`FilePool::acquire`], write whole records
//! through the returned [`PoolHandle`] and give it back. A handle is held by
//! exactly one writer at a time, so records are never interleaved.
//!
//! # Slot lifecycle
//!
//! ```text
//! Empty ──acquire──► Open ──release (size < limit)──► Open
//!   ▲                  │
//!   └──────────────────┴──release (size >= limit)──► promote partial/ → complete/
//! ```
//!
//! Files are created lazily on first acquire of an empty slot, inside
//! `<directory>/partial/`. A file that reached the size limit is moved to
//! `<directory>/complete/` on release and its slot goes back to empty.

mod pattern;
mod serial;

pub use pattern::{FilenamePattern, NameContext};
pub use serial::{LocalSerial, SerialSource};

use std::collections::VecDeque;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::{Condvar, Mutex};

use crate::error::{PoolError, PoolResult};

/// Name of the staging directory for files being written
pub const PARTIAL_DIR: &str = "partial";

/// Name of the directory for promoted files
pub const COMPLETE_DIR: &str = "complete";

/// Write buffer per open file
const FILE_BUFFER_SIZE: usize = 64 * 1024;

/// A writable stream that knows its name and current size
pub trait SizedWrite: Write {
    /// File name, without directory
    fn name(&self) -> &str;

    /// Current location of the file
    fn path(&self) -> &Path;

    /// Bytes written so far, which is also the offset of the next write
    fn size(&self) -> u64;

    /// Drop everything written from `size` on; the next write lands there
    fn truncate(&mut self, size: u64) -> io::Result<()>;
}

/// Hook run exactly once on every newly created file
pub trait FileInit: Send + Sync {
    fn init(&self, name: &str, out: &mut dyn Write) -> io::Result<()>;
}

impl<F> FileInit for F
where
    F: Fn(&str, &mut dyn Write) -> io::Result<()> + Send + Sync,
{
    fn init(&self, name: &str, out: &mut dyn Write) -> io::Result<()> {
        self(name, out)
    }
}

/// File pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Root directory; `partial/` and `complete/` are created inside
    pub directory: PathBuf,

    /// Filename pattern (see [`FilenamePattern`])
    pub pattern: String,

    /// Number of files open at once
    pub capacity: usize,

    /// Size at which a released file is promoted
    pub max_file_size: u64,

    /// Value for the `{port}` token
    pub port: u16,
}

/// An open output file owned by one slot
pub struct PoolFile {
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
}

impl Write for PoolFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.writer.write(buf)?;
        self.size += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl SizedWrite for PoolFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn truncate(&mut self, size: u64) -> io::Result<()> {
        self.writer.flush()?;
        let file = self.writer.get_mut();
        file.set_len(size)?;
        file.seek(SeekFrom::Start(size))?;
        self.size = size;
        Ok(())
    }
}

enum Slot {
    Empty,
    Open(PoolFile),
}

struct PoolState {
    idle: VecDeque<Slot>,
    closed: bool,
}

/// Pool counters
#[derive(Debug, Default)]
pub struct PoolMetrics {
    pub files_created: AtomicU64,
    pub files_promoted: AtomicU64,
    pub bytes_written: AtomicU64,
    pub write_errors: AtomicU64,
}

impl PoolMetrics {
    pub fn snapshot(&self) -> PoolMetricsSnapshot {
        PoolMetricsSnapshot {
            files_created: self.files_created.load(Ordering::Relaxed),
            files_promoted: self.files_promoted.load(Ordering::Relaxed),
            bytes_written: self.bytes_written.load(Ordering::Relaxed),
            write_errors: self.write_errors.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PoolMetrics`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolMetricsSnapshot {
    pub files_created: u64,
    pub files_promoted: u64,
    pub bytes_written: u64,
    pub write_errors: u64,
}

/// Bounded set of output files with size-based rotation
pub struct FilePool {
    partial_dir: PathBuf,
    complete_dir: PathBuf,
    pattern: FilenamePattern,
    capacity: usize,
    max_file_size: u64,
    host: String,
    port: u16,
    serial: Arc<dyn SerialSource>,
    init: Option<Arc<dyn FileInit>>,
    state: Mutex<PoolState>,
    available: Condvar,
    metrics: PoolMetrics,
}

impl FilePool {
    /// Create a pool with an in-process serial counter and no init hook
    pub fn new(config: PoolConfig) -> PoolResult<Self> {
        Self::with_parts(config, Arc::new(LocalSerial::default()), None)
    }

    /// Create a pool with an explicit serial source and init hook
    pub fn with_parts(
        config: PoolConfig,
        serial: Arc<dyn SerialSource>,
        init: Option<Arc<dyn FileInit>>,
    ) -> PoolResult<Self> {
        if config.capacity == 0 {
            return Err(PoolError::ZeroCapacity);
        }
        let pattern = FilenamePattern::parse(&config.pattern)?;
        if config.capacity > 1 && !pattern.has_serial() {
            return Err(PoolError::invalid_pattern(
                &config.pattern,
                "needs a {serial} token when more than one file is open",
            ));
        }

        let partial_dir = config.directory.join(PARTIAL_DIR);
        let complete_dir = config.directory.join(COMPLETE_DIR);
        for dir in [&partial_dir, &complete_dir] {
            fs::create_dir_all(dir).map_err(|e| PoolError::CreateDir {
                path: dir.display().to_string(),
                source: e,
            })?;
        }

        let host = hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "localhost".to_string());

        let idle = (0..config.capacity).map(|_| Slot::Empty).collect();

        tracing::info!(
            directory = %config.directory.display(),
            pattern = %pattern.as_str(),
            capacity = config.capacity,
            max_file_size = config.max_file_size,
            "file pool created"
        );

        Ok(Self {
            partial_dir,
            complete_dir,
            pattern,
            capacity: config.capacity,
            max_file_size: config.max_file_size,
            host,
            port: config.port,
            serial,
            init,
            state: Mutex::new(PoolState {
                idle,
                closed: false,
            }),
            available: Condvar::new(),
            metrics: PoolMetrics::default(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    pub fn partial_dir(&self) -> &Path {
        &self.partial_dir
    }

    pub fn complete_dir(&self) -> &Path {
        &self.complete_dir
    }

    pub fn metrics(&self) -> &PoolMetrics {
        &self.metrics
    }

    /// Slots not currently checked out
    pub fn available(&self) -> usize {
        self.state.lock().idle.len()
    }

    /// Check out a file, blocking while every slot is in use
    pub fn acquire(&self) -> PoolResult<PoolHandle<'_>> {
        let slot = {
            let mut state = self.state.lock();
            loop {
                if state.closed {
                    return Err(PoolError::Closed);
                }
                if let Some(slot) = state.idle.pop_front() {
                    break slot;
                }
                self.available.wait(&mut state);
            }
        };

        let file = match slot {
            Slot::Open(file) => file,
            Slot::Empty => match self.open_file() {
                Ok(file) => file,
                Err(e) => {
                    self.put_back(Slot::Empty);
                    return Err(e);
                }
            },
        };

        Ok(PoolHandle {
            pool: self,
            file: Some(file),
        })
    }

    /// Flush and close every idle file and refuse further acquires
    ///
    /// Open files stay in `partial/`. Handles still checked out are closed
    /// when they are released.
    pub fn close(&self) -> PoolResult<()> {
        let slots: Vec<Slot> = {
            let mut state = self.state.lock();
            state.closed = true;
            state.idle.drain(..).collect()
        };
        self.available.notify_all();

        let mut result = Ok(());
        for slot in slots {
            if let Slot::Open(mut file) = slot {
                tracing::debug!(path = %file.path.display(), size = file.size, "closing pool file");
                if let Err(e) = file.flush()
                    && result.is_ok()
                {
                    result = Err(PoolError::Io(e));
                }
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            files_created = snapshot.files_created,
            files_promoted = snapshot.files_promoted,
            bytes_written = snapshot.bytes_written,
            "file pool closed"
        );
        result
    }

    fn open_file(&self) -> PoolResult<PoolFile> {
        let serial = self.serial.next_serial().map_err(PoolError::Serial)?;
        let name = self.pattern.render(&NameContext {
            now: Utc::now(),
            serial,
            host: &self.host,
            pid: std::process::id(),
            port: self.port,
        });

        let path = self.partial_dir.join(&name);
        let promoted = self.complete_dir.join(&name);
        if promoted.exists() {
            return Err(PoolError::FileExists {
                path: promoted.display().to_string(),
            });
        }

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => PoolError::FileExists {
                    path: path.display().to_string(),
                },
                _ => PoolError::Open {
                    path: path.display().to_string(),
                    source: e,
                },
            })?;

        let mut pool_file = PoolFile {
            name,
            path,
            writer: BufWriter::with_capacity(FILE_BUFFER_SIZE, file),
            size: 0,
        };

        if let Some(init) = &self.init {
            let name = pool_file.name.clone();
            if let Err(e) = init.init(&name, &mut pool_file).and_then(|()| pool_file.flush()) {
                let PoolFile { path, writer, .. } = pool_file;
                drop(writer);
                if let Err(rm) = fs::remove_file(&path) {
                    tracing::warn!(path = %path.display(), error = %rm, "failed to remove uninitialized file");
                }
                tracing::error!(path = %path.display(), error = %e, "pool file header failed");
                return Err(PoolError::Io(e));
            }
        }

        self.metrics.files_created.fetch_add(1, Ordering::Relaxed);
        tracing::info!(path = %pool_file.path.display(), serial, "pool file created");

        Ok(pool_file)
    }

    fn put_back(&self, slot: Slot) {
        self.state.lock().idle.push_back(slot);
        self.available.notify_one();
    }

    /// Return a checked-out file to its slot, promoting it if it is full
    fn give_back(&self, mut file: PoolFile) -> PoolResult<()> {
        if let Err(e) = file.flush() {
            self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(path = %file.path.display(), error = %e, "pool file flush failed");
            drop(file);
            self.put_back(Slot::Empty);
            return Err(PoolError::Io(e));
        }

        if self.state.lock().closed {
            tracing::debug!(path = %file.path.display(), "pool closed, dropping released file");
            return Ok(());
        }

        if file.size < self.max_file_size {
            self.put_back(Slot::Open(file));
            return Ok(());
        }

        let result = self.promote(file);
        self.put_back(Slot::Empty);
        result
    }

    fn promote(&self, file: PoolFile) -> PoolResult<()> {
        let PoolFile {
            name,
            path,
            writer,
            size,
        } = file;

        let file = writer
            .into_inner()
            .map_err(|e| PoolError::Io(e.into_error()))?;
        file.sync_all()?;
        drop(file);

        let target = self.complete_dir.join(&name);
        fs::rename(&path, &target).map_err(|e| PoolError::Promote {
            from: path.display().to_string(),
            to: target.display().to_string(),
            source: e,
        })?;

        self.metrics.files_promoted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(path = %target.display(), size, "pool file promoted");
        Ok(())
    }
}

/// Exclusive checkout of one pool file
///
/// Dropping the handle returns the file to the pool. Call
/// [`PoolHandle::release`] instead to see flush or promotion errors.
pub struct PoolHandle<'a> {
    pool: &'a FilePool,
    file: Option<PoolFile>,
}

impl PoolHandle<'_> {
    /// Return the file to the pool
    pub fn release(mut self) -> PoolResult<()> {
        match self.file.take() {
            Some(file) => self.pool.give_back(file),
            None => Ok(()),
        }
    }

    fn file_mut(&mut self) -> io::Result<&mut PoolFile> {
        self.file
            .as_mut()
            .ok_or_else(|| io::Error::other("pool handle already released"))
    }
}

impl Write for PoolHandle<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let file = self.file_mut()?;
        match file.write(buf) {
            Ok(n) => {
                self.pool
                    .metrics
                    .bytes_written
                    .fetch_add(n as u64, Ordering::Relaxed);
                Ok(n)
            }
            Err(e) => {
                self.pool.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file_mut()?.flush()
    }
}

impl SizedWrite for PoolHandle<'_> {
    fn name(&self) -> &str {
        self.file.as_ref().map_or("", |f| f.name.as_str())
    }

    fn path(&self) -> &Path {
        self.file.as_ref().map_or(Path::new(""), |f| f.path.as_path())
    }

    fn size(&self) -> u64 {
        self.file.as_ref().map_or(0, |f| f.size)
    }

    /// On failure the file is retired: it stays in `partial/` as is and the
    /// slot gets a fresh file on its next checkout.
    fn truncate(&mut self, size: u64) -> io::Result<()> {
        let file = self.file_mut()?;
        let Err(e) = file.truncate(size) else {
            return Ok(());
        };

        self.pool.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
        if let Some(file) = self.file.take() {
            tracing::error!(path = %file.path.display(), error = %e, "pool file retired");
            drop(file);
            self.pool.put_back(Slot::Empty);
        }
        Err(e)
    }
}

impl Drop for PoolHandle<'_> {
    fn drop(&mut self) {
        if let Some(file) = self.file.take()
            && let Err(e) = self.pool.give_back(file)
        {
            tracing::error!(error = %e, "failed to return pool file");
        }
    }
}
