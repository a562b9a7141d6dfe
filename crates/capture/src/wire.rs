//! Wire capture: a tee on the read side of a stream
//!
//! [`WireCapture`] sits between the HTTP reader and the buffered socket.
//! Every byte handed to the reader is first appended to the sink, so the
//! sink ends up holding exactly what was consumed off the wire, framing
//! included (chunk-size lines, trailers, the terminating `0\r\n\r\n`).
//! Bytes the socket buffered but nobody consumed are not captured.

use std::io::{self, BufRead, Read, Write};

use thiserror::Error;

use crate::spill::SpillBuffer;

/// The capture grew past its configured ceiling
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("capture of {captured} bytes exceeds limit of {limit} bytes")]
pub struct CaptureOverflow {
    pub limit: u64,
    pub captured: u64,
}

impl CaptureOverflow {
    /// Recover a `CaptureOverflow` carried by an `io::Error`
    pub fn from_io(err: &io::Error) -> Option<CaptureOverflow> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<CaptureOverflow>())
            .copied()
    }
}

/// Line-oriented reads with a length cap
///
/// The HTTP reader needs `readline` on whatever it parses from: the live
/// capture stream, or a stored payload when a record is replayed.
pub trait LineRead: Read {
    /// Append one line (including its `\n`) to `line`, reading at most
    /// `limit` bytes. Returns the number of bytes appended; 0 means EOF.
    fn read_line_limited(&mut self, line: &mut Vec<u8>, limit: usize) -> io::Result<usize>;
}

impl LineRead for &[u8] {
    fn read_line_limited(&mut self, line: &mut Vec<u8>, limit: usize) -> io::Result<usize> {
        read_line_from(self, line, limit, |_| Ok(()))
    }
}

impl<R: Read> LineRead for io::BufReader<R> {
    fn read_line_limited(&mut self, line: &mut Vec<u8>, limit: usize) -> io::Result<usize> {
        read_line_from(self, line, limit, |_| Ok(()))
    }
}

/// Shared line reader: pulls from `reader` until `\n`, EOF or `limit`,
/// handing every consumed slice to `on_consume`.
fn read_line_from<B, F>(
    reader: &mut B,
    line: &mut Vec<u8>,
    limit: usize,
    mut on_consume: F,
) -> io::Result<usize>
where
    B: BufRead + ?Sized,
    F: FnMut(&[u8]) -> io::Result<()>,
{
    let start = line.len();

    loop {
        let room = limit - (line.len() - start);
        if room == 0 {
            break;
        }

        let (used, found_newline) = {
            let available = reader.fill_buf()?;
            if available.is_empty() {
                break;
            }
            let window = &available[..available.len().min(room)];
            let (used, found) = match window.iter().position(|&b| b == b'\n') {
                Some(i) => (i + 1, true),
                None => (window.len(), false),
            };
            line.extend_from_slice(&window[..used]);
            (used, found)
        };

        reader.consume(used);
        on_consume(&line[line.len() - used..])?;

        if found_newline {
            break;
        }
    }

    Ok(line.len() - start)
}

/// Read-side tee: mirrors every consumed byte into a sink
pub struct WireCapture<R, W = SpillBuffer> {
    inner: R,
    sink: W,
    captured: u64,
    max_size: Option<u64>,
}

impl<R: BufRead, W: Write> WireCapture<R, W> {
    pub fn new(inner: R, sink: W) -> Self {
        Self {
            inner,
            sink,
            captured: 0,
            max_size: None,
        }
    }

    /// Fail with [`CaptureOverflow`] once more than `max` bytes were captured
    pub fn with_max_size(mut self, max: u64) -> Self {
        self.max_size = Some(max);
        self
    }

    /// Bytes captured so far
    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn get_ref(&self) -> &R {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn sink(&self) -> &W {
        &self.sink
    }

    /// Split into the wrapped reader and the sink
    pub fn into_parts(self) -> (R, W) {
        (self.inner, self.sink)
    }

    fn record(
        sink: &mut W,
        captured: &mut u64,
        max_size: Option<u64>,
        bytes: &[u8],
    ) -> io::Result<()> {
        sink.write_all(bytes)?;
        *captured += bytes.len() as u64;

        if let Some(limit) = max_size
            && *captured > limit
        {
            return Err(io::Error::other(CaptureOverflow {
                limit,
                captured: *captured,
            }));
        }
        Ok(())
    }
}

impl<R: BufRead, W: Write> Read for WireCapture<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        Self::record(&mut self.sink, &mut self.captured, self.max_size, &buf[..n])?;
        Ok(n)
    }
}

impl<R: BufRead, W: Write> LineRead for WireCapture<R, W> {
    fn read_line_limited(&mut self, line: &mut Vec<u8>, limit: usize) -> io::Result<usize> {
        let Self {
            inner,
            sink,
            captured,
            max_size,
        } = self;
        read_line_from(inner, line, limit, |bytes| {
            Self::record(sink, captured, *max_size, bytes)
        })
    }
}
