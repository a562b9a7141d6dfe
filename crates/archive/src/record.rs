//! Record descriptors
//!
//! A [`Record`] points at one encoded archive record. It either carries the
//! bytes itself (small records, cache hits) or knows the file, offset and
//! length to read them from. Either way it can be read any number of times.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use crate::pool::{COMPLETE_DIR, PARTIAL_DIR};

/// Where a record lives in the pool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordLocation {
    /// Path the file had when the record was written
    pub path: PathBuf,
    pub offset: u64,
}

/// Encoded archive record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    location: Option<RecordLocation>,
    content_length: u64,
    inline: Option<Bytes>,
}

impl Record {
    /// Record held in memory, optionally remembering where it was written
    pub fn inline(data: Bytes, location: Option<RecordLocation>) -> Self {
        Self {
            location,
            content_length: data.len() as u64,
            inline: Some(data),
        }
    }

    /// Record to be read from `path` on demand
    pub fn on_disk(path: impl Into<PathBuf>, offset: u64, content_length: u64) -> Self {
        Self {
            location: Some(RecordLocation {
                path: path.into(),
                offset,
            }),
            content_length,
            inline: None,
        }
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn location(&self) -> Option<&RecordLocation> {
        self.location.as_ref()
    }

    pub fn filename(&self) -> Option<&Path> {
        self.location.as_ref().map(|l| l.path.as_path())
    }

    pub fn offset(&self) -> u64 {
        self.location.as_ref().map_or(0, |l| l.offset)
    }

    pub fn is_inline(&self) -> bool {
        self.inline.is_some()
    }

    /// The in-memory bytes, if any
    pub fn inline_bytes(&self) -> Option<&Bytes> {
        self.inline.as_ref()
    }

    /// Current path of the backing file
    ///
    /// A file written under `partial/` may since have been promoted to
    /// `complete/`; the promoted path is returned in that case.
    pub fn resolve_path(&self) -> io::Result<PathBuf> {
        let location = self
            .location
            .as_ref()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "record has no file"))?;

        if location.path.exists() {
            return Ok(location.path.clone());
        }
        if let Some(promoted) = promoted_path(&location.path)
            && promoted.exists()
        {
            return Ok(promoted);
        }
        Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("record file {} not found", location.path.display()),
        ))
    }

    /// Reader over exactly `content_length` bytes
    pub fn reader(&self) -> io::Result<Box<dyn Read + Send>> {
        if let Some(data) = &self.inline {
            return Ok(Box::new(Cursor::new(data.clone())));
        }
        let mut file = File::open(self.resolve_path()?)?;
        file.seek(SeekFrom::Start(self.offset()))?;
        Ok(Box::new(file.take(self.content_length)))
    }

    /// The whole record
    pub fn read_all(&self) -> io::Result<Bytes> {
        if let Some(data) = &self.inline {
            return Ok(data.clone());
        }
        let len = usize::try_from(self.content_length)
            .map_err(|_| io::Error::other("record too large for memory"))?;
        let mut buf = vec![0u8; len];
        let mut file = File::open(self.resolve_path()?)?;
        file.seek(SeekFrom::Start(self.offset()))?;
        file.read_exact(&mut buf)?;
        Ok(Bytes::from(buf))
    }
}

/// `<dir>/partial/<name>` → `<dir>/complete/<name>`
fn promoted_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?;
    let parent = path.parent()?;
    if parent.file_name()? != PARTIAL_DIR {
        return None;
    }
    Some(parent.parent()?.join(COMPLETE_DIR).join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inline_reread() {
        let record = Record::inline(Bytes::from_static(b"record bytes"), None);
        assert!(record.is_inline());
        assert_eq!(record.content_length(), 12);
        assert_eq!(record.read_all().unwrap(), record.read_all().unwrap());

        let mut out = Vec::new();
        record.reader().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"record bytes");
    }

    #[test]
    fn test_disk_reread() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f.arc.gz");
        fs::write(&path, b"....payload....").unwrap();

        let record = Record::on_disk(&path, 4, 7);
        assert_eq!(record.read_all().unwrap(), Bytes::from_static(b"payload"));
        assert_eq!(record.read_all().unwrap(), Bytes::from_static(b"payload"));

        let mut out = Vec::new();
        record.reader().unwrap().read_to_end(&mut out).unwrap();
        assert_eq!(out, b"payload");
    }

    #[test]
    fn test_disk_short_file_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("f");
        fs::write(&path, b"abc").unwrap();
        let record = Record::on_disk(&path, 0, 10);
        assert_eq!(
            record.read_all().unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_follows_promotion() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("partial")).unwrap();
        fs::create_dir_all(dir.path().join("complete")).unwrap();

        let partial = dir.path().join("partial").join("a.arc.gz");
        fs::write(&partial, b"xxdataxx").unwrap();
        let record = Record::on_disk(&partial, 2, 4);

        fs::rename(&partial, dir.path().join("complete").join("a.arc.gz")).unwrap();

        assert_eq!(
            record.resolve_path().unwrap(),
            dir.path().join("complete").join("a.arc.gz")
        );
        assert_eq!(record.read_all().unwrap(), Bytes::from_static(b"data"));
    }

    #[test]
    fn test_missing_file() {
        let record = Record::on_disk("/nonexistent/partial/x", 0, 1);
        assert_eq!(
            record.read_all().unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
    }
}
