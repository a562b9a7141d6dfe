//! Serial numbers for pool filenames

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out monotonically increasing serial numbers
///
/// Implementations backed by a shared store let several processes write
/// into one directory without name clashes.
pub trait SerialSource: Send + Sync {
    fn next_serial(&self) -> io::Result<u64>;
}

/// In-process counter
#[derive(Debug, Default)]
pub struct LocalSerial {
    next: AtomicU64,
}

impl LocalSerial {
    /// Counter whose first serial is `start`
    pub fn starting_at(start: u64) -> Self {
        Self {
            next: AtomicU64::new(start),
        }
    }
}

impl SerialSource for LocalSerial {
    fn next_serial(&self) -> io::Result<u64> {
        Ok(self.next.fetch_add(1, Ordering::Relaxed))
    }
}
