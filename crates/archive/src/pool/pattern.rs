//! Filename patterns
//!
//! Literal text with `{token}` substitutions:
//!
//! | Token | Expands to |
//! |-------|------------|
//! | `{timestamp}`, `{timestamp14}` | `YYYYmmddHHMMSS` (UTC) |
//! | `{timestamp17}` | `{timestamp14}` plus milliseconds |
//! | `{timestamp20}` | `{timestamp14}` plus microseconds |
//! | `{date}` | `YYYYmmdd` |
//! | `{serial}`, `{serial:05}` | serial number, optionally zero-padded |
//! | `{host}` | host name |
//! | `{pid}` | process id |
//! | `{port}` | listening port |

use chrono::{DateTime, Utc};

use crate::error::{PoolError, PoolResult};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Timestamp14,
    Timestamp17,
    Timestamp20,
    Date,
    Serial { width: usize },
    Host,
    Pid,
    Port,
}

/// Values substituted into a pattern
#[derive(Debug, Clone)]
pub struct NameContext<'a> {
    pub now: DateTime<Utc>,
    pub serial: u64,
    pub host: &'a str,
    pub pid: u32,
    pub port: u16,
}

/// A parsed filename pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenamePattern {
    source: String,
    segments: Vec<Segment>,
}

impl FilenamePattern {
    /// Parse a pattern, rejecting unknown tokens and path separators
    pub fn parse(pattern: &str) -> PoolResult<Self> {
        if pattern.is_empty() {
            return Err(PoolError::invalid_pattern(pattern, "pattern is empty"));
        }
        if pattern.contains('/') || pattern.contains('\\') {
            return Err(PoolError::invalid_pattern(
                pattern,
                "pattern must not contain path separators",
            ));
        }

        let mut segments = Vec::new();
        let mut rest = pattern;

        while let Some(open) = rest.find('{') {
            if open > 0 {
                segments.push(Segment::Literal(rest[..open].to_string()));
            }
            let Some(close) = rest[open..].find('}') else {
                return Err(PoolError::invalid_pattern(pattern, "unclosed '{'"));
            };
            let token = &rest[open + 1..open + close];
            segments.push(parse_token(pattern, token)?);
            rest = &rest[open + close + 1..];
        }

        if rest.contains('}') {
            return Err(PoolError::invalid_pattern(pattern, "unmatched '}'"));
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Whether the pattern yields a different name for every serial
    pub fn has_serial(&self) -> bool {
        self.segments
            .iter()
            .any(|s| matches!(s, Segment::Serial { .. }))
    }

    /// Expand the pattern
    pub fn render(&self, ctx: &NameContext<'_>) -> String {
        let mut name = String::with_capacity(self.source.len() + 16);

        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => name.push_str(text),
                Segment::Timestamp14 => {
                    name.push_str(&ctx.now.format("%Y%m%d%H%M%S").to_string())
                }
                Segment::Timestamp17 => {
                    name.push_str(&ctx.now.format("%Y%m%d%H%M%S%3f").to_string())
                }
                Segment::Timestamp20 => {
                    name.push_str(&ctx.now.format("%Y%m%d%H%M%S%6f").to_string())
                }
                Segment::Date => name.push_str(&ctx.now.format("%Y%m%d").to_string()),
                Segment::Serial { width } => {
                    name.push_str(&format!("{:0width$}", ctx.serial, width = *width))
                }
                Segment::Host => name.push_str(ctx.host),
                Segment::Pid => name.push_str(&ctx.pid.to_string()),
                Segment::Port => name.push_str(&ctx.port.to_string()),
            }
        }

        name
    }
}

fn parse_token(pattern: &str, token: &str) -> PoolResult<Segment> {
    let segment = match token {
        "timestamp" | "timestamp14" => Segment::Timestamp14,
        "timestamp17" => Segment::Timestamp17,
        "timestamp20" => Segment::Timestamp20,
        "date" => Segment::Date,
        "serial" => Segment::Serial { width: 0 },
        "host" => Segment::Host,
        "pid" => Segment::Pid,
        "port" => Segment::Port,
        _ => {
            if let Some(digits) = token.strip_prefix("serial:")
                && !digits.is_empty()
                && digits.bytes().all(|b| b.is_ascii_digit())
            {
                let width = digits.parse::<usize>().map_err(|_| {
                    PoolError::invalid_pattern(pattern, format!("bad serial width '{}'", digits))
                })?;
                return Ok(Segment::Serial { width });
            }
            return Err(PoolError::invalid_pattern(
                pattern,
                format!("unknown token '{{{}}}'", token),
            ));
        }
    };
    Ok(segment)
}
