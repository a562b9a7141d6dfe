//! Minimal HTTP/1.x response reader
//!
//! Reads a status line, headers and a body from any [`LineRead`]. The
//! fetcher runs it on top of a [`WireCapture`](crate::wire::WireCapture),
//! so parsing is what drives the capture; the same functions replay a
//! stored capture when a record is served in pass-through mode.

use std::io::{self, Read, Write};

use thiserror::Error;

use crate::wire::LineRead;

/// Longest status, header or chunk-size line accepted
pub const MAX_LINE: usize = 64 * 1024;

/// Most header lines accepted in one response
pub const MAX_HEADERS: usize = 512;

/// Failure while reading an HTTP message
#[derive(Debug, Error)]
pub enum HttpError {
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The stream ended before the named part was complete
    #[error("connection closed during {0}")]
    Incomplete(&'static str),

    #[error("malformed {what}: {detail}")]
    Malformed { what: &'static str, detail: String },
}

impl HttpError {
    fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        Self::Malformed {
            what,
            detail: detail.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HttpError>;

/// `HTTP/1.1 200 OK`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub version: String,
    pub code: u16,
    pub reason: String,
}

/// Status line plus headers, in wire order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusLine,
    pub headers: Vec<(String, String)>,
}

/// How the body of a response is delimited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    Empty,
    Length(u64),
    Chunked,
    UntilClose,
}

impl ResponseHead {
    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Media type without parameters (`text/html; charset=utf-8` → `text/html`)
    ///
    /// Stops at the first `;` or whitespace. `None` when what is left is
    /// empty or not printable ASCII, since the value ends up as one field of
    /// a space-separated archive header line.
    pub fn content_type(&self) -> Option<&str> {
        let value = self.header("content-type")?;
        let media = value.split(';').next()?.split_ascii_whitespace().next()?;
        media.bytes().all(|b| b.is_ascii_graphic()).then_some(media)
    }

    pub fn content_length(&self) -> Option<u64> {
        self.header("content-length")?.trim().parse().ok()
    }

    pub fn is_chunked(&self) -> bool {
        self.header("transfer-encoding").is_some_and(|v| {
            v.split(',')
                .next_back()
                .is_some_and(|last| last.trim().eq_ignore_ascii_case("chunked"))
        })
    }

    /// Body framing for a response to a GET
    pub fn framing(&self) -> Framing {
        let code = self.status.code;
        if (100..200).contains(&code) || code == 204 || code == 304 {
            return Framing::Empty;
        }
        if self.is_chunked() {
            return Framing::Chunked;
        }
        match self.content_length() {
            Some(0) => Framing::Empty,
            Some(n) => Framing::Length(n),
            None => Framing::UntilClose,
        }
    }
}

/// Read one line; `None` at a clean EOF
fn read_line<R: LineRead>(reader: &mut R, what: &'static str) -> Result<Option<Vec<u8>>> {
    let mut line = Vec::new();
    let n = reader.read_line_limited(&mut line, MAX_LINE)?;
    if n == 0 {
        return Ok(None);
    }
    if line.last() != Some(&b'\n') {
        if n == MAX_LINE {
            return Err(HttpError::malformed(what, "line too long"));
        }
        return Err(HttpError::Incomplete(what));
    }
    Ok(Some(line))
}

fn trim_eol(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Parse `HTTP/x.y NNN reason`
pub fn parse_status_line(line: &[u8]) -> Result<StatusLine> {
    let text = String::from_utf8_lossy(trim_eol(line));
    let mut parts = text.splitn(3, ' ');

    let version = parts.next().unwrap_or("");
    if !version.starts_with("HTTP/") {
        return Err(HttpError::malformed("status line", text.to_string()));
    }

    let code = parts.next().unwrap_or("");
    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HttpError::malformed("status line", text.to_string()));
    }
    let code: u16 = code
        .parse()
        .map_err(|_| HttpError::malformed("status line", text.to_string()))?;

    Ok(StatusLine {
        version: version.to_string(),
        code,
        reason: parts.next().unwrap_or("").trim().to_string(),
    })
}

/// Read the status line
pub fn read_status_line<R: LineRead>(reader: &mut R) -> Result<StatusLine> {
    match read_line(reader, "status line")? {
        Some(line) => parse_status_line(&line),
        None => Err(HttpError::Incomplete("status line")),
    }
}

/// Read header lines up to and including the blank line
pub fn read_headers<R: LineRead>(reader: &mut R) -> Result<Vec<(String, String)>> {
    let mut headers: Vec<(String, String)> = Vec::new();

    loop {
        let Some(line) = read_line(reader, "headers")? else {
            return Err(HttpError::Incomplete("headers"));
        };
        let line = trim_eol(&line);
        if line.is_empty() {
            return Ok(headers);
        }

        // obs-fold continuation
        if matches!(line[0], b' ' | b'\t') {
            let Some((_, value)) = headers.last_mut() else {
                return Err(HttpError::malformed("header", "continuation before first header"));
            };
            value.push(' ');
            value.push_str(String::from_utf8_lossy(line).trim());
            continue;
        }

        let Some(colon) = line.iter().position(|&b| b == b':') else {
            return Err(HttpError::malformed(
                "header",
                String::from_utf8_lossy(line).to_string(),
            ));
        };
        if headers.len() >= MAX_HEADERS {
            return Err(HttpError::malformed("headers", "too many header lines"));
        }

        let name = String::from_utf8_lossy(&line[..colon]).trim().to_string();
        let value = String::from_utf8_lossy(&line[colon + 1..]).trim().to_string();
        headers.push((name, value));
    }
}

/// Read a complete response head, skipping interim `1xx` responses
pub fn read_response_head<R: LineRead>(reader: &mut R) -> Result<ResponseHead> {
    loop {
        let status = read_status_line(reader)?;
        let headers = read_headers(reader)?;
        if (100..200).contains(&status.code) && status.code != 101 {
            continue;
        }
        return Ok(ResponseHead { status, headers });
    }
}

/// Read the body per `framing`, writing the decoded bytes to `out`
///
/// Returns the decoded body length. Everything the framing needs is read
/// from `reader`, chunk-size lines and trailers included.
pub fn read_body<R, W>(reader: &mut R, framing: Framing, out: &mut W) -> Result<u64>
where
    R: LineRead,
    W: Write + ?Sized,
{
    match framing {
        Framing::Empty => Ok(0),
        Framing::Length(len) => {
            let copied = io::copy(&mut (&mut *reader).take(len), out)?;
            if copied < len {
                return Err(HttpError::Incomplete("body"));
            }
            Ok(copied)
        }
        Framing::UntilClose => Ok(io::copy(reader, out)?),
        Framing::Chunked => read_chunked(reader, out),
    }
}

fn read_chunked<R, W>(reader: &mut R, out: &mut W) -> Result<u64>
where
    R: LineRead,
    W: Write + ?Sized,
{
    let mut total = 0u64;

    loop {
        let Some(line) = read_line(reader, "chunk size")? else {
            return Err(HttpError::Incomplete("chunk size"));
        };
        let size = parse_chunk_size(&line)?;

        if size == 0 {
            // Trailer section; a peer that closes right after the last
            // chunk has still sent a complete body
            while let Some(line) = read_line(reader, "trailers")? {
                if trim_eol(&line).is_empty() {
                    break;
                }
            }
            return Ok(total);
        }

        let copied = io::copy(&mut (&mut *reader).take(size), out)?;
        total += copied;
        if copied < size {
            return Err(HttpError::Incomplete("chunk"));
        }

        match read_line(reader, "chunk")? {
            Some(line) if trim_eol(&line).is_empty() => {}
            Some(_) => return Err(HttpError::malformed("chunk", "missing CRLF after chunk data")),
            None => return Err(HttpError::Incomplete("chunk")),
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<u64> {
    let line = trim_eol(line);
    let digits = line.split(|&b| b == b';').next().unwrap_or(line);
    let digits = std::str::from_utf8(digits)
        .map_err(|_| HttpError::malformed("chunk size", "not ASCII"))?
        .trim();
    u64::from_str_radix(digits, 16).map_err(|_| HttpError::malformed("chunk size", digits))
}

/// A parsed response with its decoded body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub head: ResponseHead,
    pub body: Vec<u8>,
}

/// Parse a complete captured response from memory
pub fn parse_response(mut bytes: &[u8]) -> Result<Response> {
    let head = read_response_head(&mut bytes)?;
    let mut body = Vec::new();
    read_body(&mut bytes, head.framing(), &mut body)?;
    Ok(Response { head, body })
}

#[cfg(test)]
#[path = "http_test.rs"]
mod http_test;
