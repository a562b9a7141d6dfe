//! Byte sizes in configuration
//!
//! Sizes may be written as plain integers (`1048576`) or with a 1024-based
//! suffix (`"100KB"`, `"100MB"`, `"1GB"`). Whitespace is ignored and the
//! suffix is case-insensitive.

use std::fmt;
use std::str::FromStr;

use serde::de::{self, Deserializer, Visitor};
use serde::Deserialize;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// A size in bytes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ByteSize(pub u64);

impl ByteSize {
    /// Size of `n` kibibytes
    pub const fn kb(n: u64) -> Self {
        Self(n * KB)
    }

    /// Size of `n` mebibytes
    pub const fn mb(n: u64) -> Self {
        Self(n * MB)
    }

    /// Size of `n` gibibytes
    pub const fn gb(n: u64) -> Self {
        Self(n * GB)
    }

    /// Number of bytes
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Number of bytes as `usize` (saturating on 32-bit targets)
    pub fn as_usize(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl fmt::Display for ByteSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let n = self.0;
        if n >= GB && n % GB == 0 {
            write!(f, "{}GB", n / GB)
        } else if n >= MB && n % MB == 0 {
            write!(f, "{}MB", n / MB)
        } else if n >= KB && n % KB == 0 {
            write!(f, "{}KB", n / KB)
        } else {
            write!(f, "{}", n)
        }
    }
}

/// Error returned when a size string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid size '{0}': expected a number optionally followed by KB, MB or GB")]
pub struct ParseSizeError(String);

impl FromStr for ByteSize {
    type Err = ParseSizeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        let upper = compact.to_ascii_uppercase();

        let (digits, scale) = if let Some(n) = upper.strip_suffix("GB") {
            (n, GB)
        } else if let Some(n) = upper.strip_suffix("MB") {
            (n, MB)
        } else if let Some(n) = upper.strip_suffix("KB") {
            (n, KB)
        } else if let Some(n) = upper.strip_suffix('B') {
            (n, 1)
        } else {
            (upper.as_str(), 1)
        };

        digits
            .parse::<u64>()
            .ok()
            .and_then(|n| n.checked_mul(scale))
            .map(ByteSize)
            .ok_or_else(|| ParseSizeError(s.to_string()))
    }
}

impl<'de> Deserialize<'de> for ByteSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct SizeVisitor;

        impl Visitor<'_> for SizeVisitor {
            type Value = ByteSize;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a byte count or a string such as \"100MB\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<ByteSize, E> {
                Ok(ByteSize(v))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<ByteSize, E> {
                u64::try_from(v)
                    .map(ByteSize)
                    .map_err(|_| E::custom("size must not be negative"))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<ByteSize, E> {
                v.parse().map_err(E::custom)
            }
        }

        deserializer.deserialize_any(SizeVisitor)
    }
}
