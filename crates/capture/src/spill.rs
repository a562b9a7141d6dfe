//! Memory buffer that spills to a temp file
//!
//! Captures start in memory. The write that would take the buffer past its
//! threshold first copies everything written so far into a fresh temp file;
//! from then on every read, write and seek goes to the file. The position
//! and contents seen by the caller are the same on both sides of the switch.
//!
//! The temp file is unlinked when the buffer is dropped or closed.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Default spill threshold (1MB)
pub const DEFAULT_SPILL_THRESHOLD: usize = 1024 * 1024;

enum Storage {
    Memory(Cursor<Vec<u8>>),
    Disk(NamedTempFile),
}

/// Growable random-access byte stream, in memory up to a threshold
pub struct SpillBuffer {
    storage: Storage,
    threshold: usize,
    directory: Option<PathBuf>,
    len: u64,
}

impl SpillBuffer {
    /// Buffer that stays in memory while it holds at most `threshold` bytes
    pub fn new(threshold: usize) -> Self {
        Self {
            storage: Storage::Memory(Cursor::new(Vec::new())),
            threshold,
            directory: None,
            len: 0,
        }
    }

    /// Create the temp file in `dir` instead of the system temp directory
    pub fn with_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.directory = Some(dir.into());
        self
    }

    /// Whether the data still lives in memory
    pub fn in_memory(&self) -> bool {
        matches!(self.storage, Storage::Memory(_))
    }

    /// Path of the backing temp file, once spilled
    pub fn path(&self) -> Option<&Path> {
        match &self.storage {
            Storage::Memory(_) => None,
            Storage::Disk(file) => Some(file.path()),
        }
    }

    /// Total bytes held
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Copy the whole content out, leaving the position at the end
    pub fn to_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(usize::try_from(self.len).unwrap_or(0));
        self.seek(SeekFrom::Start(0))?;
        self.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Release the buffer, deleting the temp file if there is one
    pub fn close(self) -> io::Result<()> {
        match self.storage {
            Storage::Memory(_) => Ok(()),
            Storage::Disk(file) => file.close(),
        }
    }

    fn spill(&mut self) -> io::Result<()> {
        let Storage::Memory(cursor) = &self.storage else {
            return Ok(());
        };

        let mut file = match &self.directory {
            Some(dir) => NamedTempFile::new_in(dir)?,
            None => NamedTempFile::new()?,
        };
        file.write_all(cursor.get_ref())?;
        file.seek(SeekFrom::Start(cursor.position()))?;

        tracing::debug!(
            path = %file.path().display(),
            bytes = self.len,
            threshold = self.threshold,
            "capture buffer spilled to disk"
        );

        self.storage = Storage::Disk(file);
        Ok(())
    }
}

impl Write for SpillBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Storage::Memory(cursor) = &self.storage {
            let end = cursor.position() + buf.len() as u64;
            if end > self.threshold as u64 {
                self.spill()?;
            }
        }

        let (n, pos) = match &mut self.storage {
            Storage::Memory(cursor) => {
                let n = cursor.write(buf)?;
                (n, cursor.position())
            }
            Storage::Disk(file) => {
                let n = file.write(buf)?;
                (n, file.stream_position()?)
            }
        };
        self.len = self.len.max(pos);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        match &mut self.storage {
            Storage::Memory(_) => Ok(()),
            Storage::Disk(file) => file.flush(),
        }
    }
}

impl Read for SpillBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.storage {
            Storage::Memory(cursor) => cursor.read(buf),
            Storage::Disk(file) => file.read(buf),
        }
    }
}

impl Seek for SpillBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match &mut self.storage {
            Storage::Memory(cursor) => cursor.seek(pos),
            Storage::Disk(file) => file.seek(pos),
        }
    }
}

impl Default for SpillBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_SPILL_THRESHOLD)
    }
}

impl std::fmt::Debug for SpillBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpillBuffer")
            .field("len", &self.len)
            .field("threshold", &self.threshold)
            .field("in_memory", &self.in_memory())
            .finish()
    }
}

#[cfg(test)]
#[path = "spill_test.rs"]
mod spill_test;
