//! SQLite backend
//!
//! Stores where a record lives (file, offset, length), not its bytes, so
//! there is no size ceiling. A hit is served by reading the pool file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use liveweb_archive::Record;
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};

use crate::error::{CacheError, Result};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS cache (
    url        TEXT PRIMARY KEY,
    filename   TEXT NOT NULL,
    offset     INTEGER NOT NULL,
    clen       INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS cache_expires_at ON cache (expires_at);
";

/// Relational cache of record locations
pub struct SqliteCache {
    conn: Mutex<Connection>,
    expire_time: Duration,
}

impl SqliteCache {
    /// Open (or create) the database at `path`
    pub fn open(path: impl AsRef<Path>, expire_time: Duration) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| CacheError::CreateDir {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let cache = Self::with_connection(Connection::open(path)?, expire_time)?;
        tracing::debug!(path = %path.display(), "sqlite cache opened");
        Ok(cache)
    }

    /// In-memory database, for tests and one-shot runs
    pub fn in_memory(expire_time: Duration) -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?, expire_time)
    }

    fn with_connection(conn: Connection, expire_time: Duration) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        let cache = Self {
            conn: Mutex::new(conn),
            expire_time,
        };
        cache.purge_expired()?;
        Ok(cache)
    }

    pub fn get(&self, url: &str) -> Result<Option<Record>> {
        let row = self
            .conn
            .lock()
            .query_row(
                "SELECT filename, offset, clen FROM cache WHERE url = ?1 AND expires_at > ?2",
                params![url, Utc::now().timestamp()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(filename, offset, clen)| {
            Record::on_disk(filename, offset.max(0) as u64, clen.max(0) as u64)
        }))
    }

    /// Remember where `record` lives; records with no file are skipped
    pub fn set(&self, url: &str, record: &Record) -> Result<()> {
        let Some(location) = record.location() else {
            tracing::debug!(url = %url, "record has no file, not cached");
            return Ok(());
        };

        let expires_at = Utc::now().timestamp() + self.expire_time.as_secs() as i64;
        self.conn.lock().execute(
            "INSERT OR REPLACE INTO cache (url, filename, offset, clen, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                url,
                location.path.to_string_lossy(),
                location.offset as i64,
                record.content_length() as i64,
                expires_at
            ],
        )?;
        Ok(())
    }

    /// Delete expired rows, returning how many were removed
    pub fn purge_expired(&self) -> Result<usize> {
        let removed = self.conn.lock().execute(
            "DELETE FROM cache WHERE expires_at <= ?1",
            params![Utc::now().timestamp()],
        )?;
        if removed > 0 {
            tracing::debug!(removed, "expired cache rows purged");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use liveweb_archive::RecordLocation;
    use tempfile::TempDir;

    fn disk_record(dir: &TempDir) -> Record {
        let path = dir.path().join("live-00000.arc.gz");
        fs::write(&path, b"headerRECORDtrailer").unwrap();
        Record::on_disk(path, 6, 6)
    }

    #[test]
    fn test_round_trip() {
        let dir = TempDir::new().unwrap();
        let cache = SqliteCache::in_memory(Duration::from_secs(3600)).unwrap();
        let record = disk_record(&dir);

        assert!(cache.get("http://example.com/").unwrap().is_none());
        cache.set("http://example.com/", &record).unwrap();

        let hit = cache.get("http://example.com/").unwrap().unwrap();
        assert_eq!(hit.filename(), record.filename());
        assert_eq!(hit.offset(), 6);
        assert_eq!(hit.read_all().unwrap(), Bytes::from_static(b"RECORD"));
    }

    #[test]
    fn test_inline_record_with_location_is_stored_as_pointer() {
        let dir = TempDir::new().unwrap();
        let cache = SqliteCache::in_memory(Duration::from_secs(3600)).unwrap();
        let on_disk = disk_record(&dir);

        let record = Record::inline(
            Bytes::from_static(b"RECORD"),
            Some(RecordLocation {
                path: on_disk.filename().unwrap().to_path_buf(),
                offset: 6,
            }),
        );
        cache.set("u", &record).unwrap();

        let hit = cache.get("u").unwrap().unwrap();
        assert!(!hit.is_inline());
        assert_eq!(hit.read_all().unwrap(), Bytes::from_static(b"RECORD"));
    }

    #[test]
    fn test_record_without_file_not_cached() {
        let cache = SqliteCache::in_memory(Duration::from_secs(3600)).unwrap();
        let record = Record::inline(Bytes::from_static(b"bytes"), None);
        cache.set("u", &record).unwrap();
        assert!(cache.get("u").unwrap().is_none());
    }

    #[test]
    fn test_expired_rows_are_misses() {
        let dir = TempDir::new().unwrap();
        let cache = SqliteCache::in_memory(Duration::ZERO).unwrap();
        cache.set("u", &disk_record(&dir)).unwrap();

        assert!(cache.get("u").unwrap().is_none());
        assert_eq!(cache.purge_expired().unwrap(), 1);
    }

    #[test]
    fn test_set_replaces_existing_row() {
        let dir = TempDir::new().unwrap();
        let cache = SqliteCache::in_memory(Duration::from_secs(3600)).unwrap();
        cache.set("u", &disk_record(&dir)).unwrap();
        cache.set("u", &Record::on_disk(dir.path().join("other"), 1, 2)).unwrap();

        let hit = cache.get("u").unwrap().unwrap();
        assert_eq!(hit.filename().unwrap(), dir.path().join("other"));
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let db = dir.path().join("db").join("liveweb.db");
        let record = disk_record(&dir);

        SqliteCache::open(&db, Duration::from_secs(3600))
            .unwrap()
            .set("u", &record)
            .unwrap();

        let reopened = SqliteCache::open(&db, Duration::from_secs(3600)).unwrap();
        assert!(reopened.get("u").unwrap().is_some());
    }
}
