//! Redis backend
//!
//! Stores the full encoded record under the URL with `SETEX`. A hit slides
//! the expiry forward. Records above `max_record_size` are never stored.

use std::io;
use std::time::Duration;

use bytes::Bytes;
use liveweb_archive::{Record, SerialSource};
use liveweb_config::CacheConfig;
use parking_lot::Mutex;
use redis::{
    Client, Connection, ConnectionAddr, ConnectionInfo, IntoConnectionInfo, RedisConnectionInfo,
};

use crate::error::Result;

/// Key of the shared filename serial counter
pub const SEQUENCE_KEY: &str = "filename-sequence";

/// Connection parameters from the `[cache]` section
///
/// Built field by field, so passwords never pass through URL parsing.
fn connection_info(config: &CacheConfig) -> ConnectionInfo {
    ConnectionInfo {
        addr: ConnectionAddr::Tcp(config.redis_host.clone(), config.redis_port),
        redis: RedisConnectionInfo {
            db: config.redis_db,
            password: config.redis_password.clone(),
            ..RedisConnectionInfo::default()
        },
    }
}

/// Lazily connected client with a stack of idle connections
///
/// The lock only guards the stack; commands run without it, so one stalled
/// server round trip does not hold up other callers. A connection that
/// failed a command is dropped, not put back.
struct RedisConn {
    client: Client,
    idle: Mutex<Vec<Connection>>,
    timeout: Duration,
}

impl RedisConn {
    fn open(info: impl IntoConnectionInfo, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::open(info)?,
            idle: Mutex::new(Vec::new()),
            timeout,
        })
    }

    fn connect(&self) -> redis::RedisResult<Connection> {
        let conn = self.client.get_connection_with_timeout(self.timeout)?;
        conn.set_read_timeout(Some(self.timeout))?;
        conn.set_write_timeout(Some(self.timeout))?;
        Ok(conn)
    }

    fn run<T, F>(&self, op: F) -> redis::RedisResult<T>
    where
        F: FnOnce(&mut Connection) -> redis::RedisResult<T>,
    {
        let idle = self.idle.lock().pop();
        let mut conn = match idle {
            Some(conn) => conn,
            None => self.connect()?,
        };

        let result = op(&mut conn);
        if result.is_ok() {
            self.idle.lock().push(conn);
        }
        result
    }
}

/// Key-value cache of whole records
pub struct RedisCache {
    conn: RedisConn,
    expire_time: Duration,
    max_record_size: u64,
}

impl RedisCache {
    /// Client for `info` (a `redis://` URL or [`ConnectionInfo`]); connects on first use
    pub fn new(
        info: impl IntoConnectionInfo,
        timeout: Duration,
        expire_time: Duration,
        max_record_size: u64,
    ) -> Result<Self> {
        Ok(Self {
            conn: RedisConn::open(info, timeout)?,
            expire_time,
            max_record_size,
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(
            connection_info(config),
            config.redis_timeout,
            config.expire_time,
            config.max_record_size.as_u64(),
        )
    }

    fn expire_secs(&self) -> u64 {
        self.expire_time.as_secs().max(1)
    }

    pub fn get(&self, url: &str) -> Result<Option<Record>> {
        let secs = self.expire_secs();
        let data: Option<Vec<u8>> = self.conn.run(|conn| {
            let data: Option<Vec<u8>> = redis::cmd("GET").arg(url).query(conn)?;
            if data.is_some() {
                redis::cmd("EXPIRE").arg(url).arg(secs).query::<()>(conn)?;
            }
            Ok(data)
        })?;

        Ok(data.map(|bytes| Record::inline(Bytes::from(bytes), None)))
    }

    pub fn set(&self, url: &str, record: &Record) -> Result<()> {
        if record.content_length() > self.max_record_size {
            tracing::debug!(
                url = %url,
                length = record.content_length(),
                max = self.max_record_size,
                "record too large to cache"
            );
            return Ok(());
        }

        let data = record.read_all()?;
        let secs = self.expire_secs();
        self.conn.run(|conn| {
            redis::cmd("SETEX")
                .arg(url)
                .arg(secs)
                .arg(data.as_ref())
                .query::<()>(conn)
        })?;
        Ok(())
    }
}

/// Filename serials from a Redis `INCR` counter shared by all processes
pub struct RedisSerial {
    conn: RedisConn,
}

impl RedisSerial {
    pub fn new(info: impl IntoConnectionInfo, timeout: Duration) -> Result<Self> {
        Ok(Self {
            conn: RedisConn::open(info, timeout)?,
        })
    }

    pub fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::new(connection_info(config), config.redis_timeout)
    }
}

impl SerialSource for RedisSerial {
    fn next_serial(&self) -> io::Result<u64> {
        self.conn
            .run(|conn| redis::cmd("INCR").arg(SEQUENCE_KEY).query::<u64>(conn))
            .map_err(io::Error::other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::sync::Arc;
    use std::thread;
    use std::time::Instant;

    // Nothing listens on port 1; commands fail without a server
    const UNREACHABLE: &str = "redis://127.0.0.1:1/0";
    const TIMEOUT: Duration = Duration::from_secs(5);

    fn cache(url: &str, timeout: Duration, max_record_size: u64) -> RedisCache {
        RedisCache::new(url, timeout, Duration::from_secs(60), max_record_size).unwrap()
    }

    #[test]
    fn test_oversized_record_skipped_without_network() {
        let cache = cache(UNREACHABLE, TIMEOUT, 10);
        let record = Record::inline(Bytes::from_static(b"more than ten bytes"), None);
        assert!(cache.set("http://example.com/", &record).is_ok());
    }

    #[test]
    fn test_unreachable_server_is_an_error() {
        let cache = cache(UNREACHABLE, TIMEOUT, 1000);
        assert!(cache.get("http://example.com/").is_err());

        let record = Record::inline(Bytes::from_static(b"small"), None);
        assert!(cache.set("http://example.com/", &record).is_err());
    }

    #[test]
    fn test_serial_reports_io_error() {
        let serial = RedisSerial::new(UNREACHABLE, TIMEOUT).unwrap();
        assert!(serial.next_serial().is_err());
    }

    #[test]
    fn test_bad_url_rejected() {
        let cache = RedisCache::new("not-a-redis-url", TIMEOUT, Duration::from_secs(1), 1);
        assert!(cache.is_err());
    }

    // ========================================================================
    // Connection parameters
    // ========================================================================

    #[test]
    fn test_connection_info_keeps_reserved_password_characters() {
        let config = CacheConfig {
            redis_host: "cache.internal".into(),
            redis_port: 6380,
            redis_db: 3,
            redis_password: Some("p@ss/w:rd%40".into()),
            ..CacheConfig::default()
        };

        let info = connection_info(&config);
        match &info.addr {
            ConnectionAddr::Tcp(host, port) => {
                assert_eq!(host, "cache.internal");
                assert_eq!(*port, 6380);
            }
            other => panic!("expected a tcp address, got {other:?}"),
        }
        assert_eq!(info.redis.db, 3);
        assert_eq!(info.redis.password.as_deref(), Some("p@ss/w:rd%40"));
        assert!(RedisCache::from_config(&config).is_ok());
    }

    // ========================================================================
    // Stalled server
    // ========================================================================

    #[test]
    fn test_stalled_server_times_out() {
        // Accepts via the backlog, never answers
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("redis://{}/0", listener.local_addr().unwrap());
        let cache = cache(&url, Duration::from_millis(200), 1000);

        let started = Instant::now();
        assert!(cache.get("http://example.com/").is_err());
        assert!(started.elapsed() < Duration::from_secs(5));
        drop(listener);
    }

    #[test]
    fn test_stalled_commands_run_side_by_side() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("redis://{}/0", listener.local_addr().unwrap());
        let timeout = Duration::from_millis(600);
        let cache = Arc::new(cache(&url, timeout, 1000));

        let started = Instant::now();
        let workers: Vec<_> = (0..2)
            .map(|i| {
                let cache = Arc::clone(&cache);
                thread::spawn(move || cache.get(&format!("http://example.com/{i}")).is_err())
            })
            .collect();
        for worker in workers {
            assert!(worker.join().unwrap());
        }

        // One after the other would take at least two timeouts
        assert!(started.elapsed() < timeout * 2);
        drop(listener);
    }
}
