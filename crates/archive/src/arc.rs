//! ARC v1 records
//!
//! Each record is its own gzip member:
//!
//! ```text
//! <url> <ip> <yyyymmddhhmmss> <content-type> <length>\n
//! <length bytes of captured HTTP response>\n
//! ```
//!
//! A file starts with a `filedesc://` record describing the file itself,
//! so files can be concatenated and still be read member by member.

use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, NaiveDateTime, Utc};
use flate2::Compression;
use flate2::bufread::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{ArchiveError, Result};

/// Timestamp layout in ARC header lines
const ARC_DATE_FORMAT: &str = "%Y%m%d%H%M%S";

/// Media type for a single encoded record
pub const ARC_RECORD_CONTENT_TYPE: &str = "application/x-arc-record";

/// Organisation named in the `filedesc` record
const ARC_ORIGIN: &str = "InternetArchive";

/// Header line fields of one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcMetadata {
    pub url: String,
    pub ip: IpAddr,
    pub date: DateTime<Utc>,
    pub content_type: String,
    /// Exact payload length in bytes
    pub length: u64,
}

impl ArcMetadata {
    /// The header line, without its newline
    pub fn header_line(&self) -> String {
        format!(
            "{} {} {} {} {}",
            self.url,
            self.ip,
            self.date.format(ARC_DATE_FORMAT),
            self.content_type,
            self.length
        )
    }

    /// Parse a header line
    pub fn parse(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let bad = || ArchiveError::invalid_record(format!("bad header line '{}'", line));

        // URL first; split from the right so the URL keeps any odd characters
        let mut fields = line.rsplitn(5, ' ');
        let length = fields.next().ok_or_else(bad)?;
        let content_type = fields.next().ok_or_else(bad)?;
        let date = fields.next().ok_or_else(bad)?;
        let ip = fields.next().ok_or_else(bad)?;
        let url = fields.next().ok_or_else(bad)?;

        let date = NaiveDateTime::parse_from_str(date, ARC_DATE_FORMAT)
            .map_err(|_| bad())?
            .and_utc();

        Ok(Self {
            url: url.to_string(),
            ip: ip.parse().map_err(|_| bad())?,
            date,
            content_type: content_type.to_string(),
            length: length.parse().map_err(|_| bad())?,
        })
    }
}

/// A record taken apart again
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRecord {
    pub metadata: ArcMetadata,
    pub payload: Vec<u8>,
}

/// Serializes records into an archive format
pub trait RecordEncoder: Send + Sync {
    /// Write one record: `meta` followed by exactly `meta.length` bytes of
    /// `payload`. Returns the number of bytes written to `out`.
    fn encode(&self, meta: &ArcMetadata, payload: &mut dyn Read, out: &mut dyn Write) -> io::Result<u64>;

    /// Write the header that starts every new file
    fn file_header(&self, name: &str, out: &mut dyn Write) -> io::Result<u64>;

    /// Take an encoded record apart
    fn decode(&self, record: &[u8]) -> Result<DecodedRecord>;
}

/// ARC v1 with one gzip member per record
#[derive(Debug, Clone, Copy)]
pub struct ArcGzipEncoder {
    level: Compression,
}

impl ArcGzipEncoder {
    pub fn new(level: Compression) -> Self {
        Self { level }
    }
}

impl Default for ArcGzipEncoder {
    fn default() -> Self {
        Self::new(Compression::default())
    }
}

impl RecordEncoder for ArcGzipEncoder {
    fn encode(&self, meta: &ArcMetadata, payload: &mut dyn Read, out: &mut dyn Write) -> io::Result<u64> {
        let mut gz = GzEncoder::new(CountingWriter::new(out), self.level);

        gz.write_all(meta.header_line().as_bytes())?;
        gz.write_all(b"\n")?;

        let copied = io::copy(&mut payload.take(meta.length), &mut gz)?;
        if copied != meta.length {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "payload ended after {} of {} bytes",
                    copied, meta.length
                ),
            ));
        }
        gz.write_all(b"\n")?;

        Ok(gz.finish()?.count)
    }

    fn file_header(&self, name: &str, out: &mut dyn Write) -> io::Result<u64> {
        let body = format!(
            "1 0 {}\nURL IP-address Archive-date Content-type Archive-length\n",
            ARC_ORIGIN
        );
        let meta = ArcMetadata {
            url: format!("filedesc://{}", name),
            ip: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            date: Utc::now(),
            content_type: "text/plain".to_string(),
            length: body.len() as u64,
        };
        self.encode(&meta, &mut body.as_bytes(), out)
    }

    fn decode(&self, record: &[u8]) -> Result<DecodedRecord> {
        let mut decoder = GzDecoder::new(record);
        let mut data = Vec::new();
        decoder.read_to_end(&mut data)?;
        split_record(&data)
    }
}

fn split_record(data: &[u8]) -> Result<DecodedRecord> {
    let newline = data
        .iter()
        .position(|&b| b == b'\n')
        .ok_or_else(|| ArchiveError::invalid_record("missing header line"))?;
    let header = std::str::from_utf8(&data[..newline])
        .map_err(|_| ArchiveError::invalid_record("header line is not UTF-8"))?;
    let metadata = ArcMetadata::parse(header)?;

    let body = &data[newline + 1..];
    let length = usize::try_from(metadata.length)
        .map_err(|_| ArchiveError::invalid_record("length out of range"))?;
    if body.len() < length {
        return Err(ArchiveError::invalid_record(format!(
            "payload is {} bytes, header says {}",
            body.len(),
            length
        )));
    }

    Ok(DecodedRecord {
        payload: body[..length].to_vec(),
        metadata,
    })
}

struct CountingWriter<W> {
    inner: W,
    count: u64,
}

impl<W: Write> CountingWriter<W> {
    fn new(inner: W) -> Self {
        Self { inner, count: 0 }
    }
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

struct CountingReader<R> {
    inner: R,
    consumed: u64,
}

impl<R: BufRead> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.consumed += n as u64;
        Ok(n)
    }
}

impl<R: BufRead> BufRead for CountingReader<R> {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        self.inner.fill_buf()
    }

    fn consume(&mut self, amt: usize) {
        self.consumed += amt as u64;
        self.inner.consume(amt);
    }
}

/// One record found in an ARC file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArcEntry {
    /// Offset of the gzip member in the file
    pub offset: u64,
    /// Compressed size of the member
    pub length: u64,
    pub record: DecodedRecord,
}

/// Iterates the records of a gzip-per-record ARC stream
pub struct ArcFileReader<R> {
    reader: Option<CountingReader<R>>,
}

impl<R: Read> ArcFileReader<BufReader<R>> {
    pub fn new(inner: R) -> Self {
        Self {
            reader: Some(CountingReader {
                inner: BufReader::new(inner),
                consumed: 0,
            }),
        }
    }
}

impl<R: BufRead> ArcFileReader<R> {
    fn next_entry(&mut self) -> Result<Option<ArcEntry>> {
        let Some(mut reader) = self.reader.take() else {
            return Ok(None);
        };
        if reader.fill_buf()?.is_empty() {
            return Ok(None);
        }

        let offset = reader.consumed;
        let mut decoder = GzDecoder::new(reader);
        let mut data = Vec::new();
        decoder.read_to_end(&mut data)?;

        let reader = decoder.into_inner();
        let length = reader.consumed - offset;
        self.reader = Some(reader);

        Ok(Some(ArcEntry {
            offset,
            length,
            record: split_record(&data)?,
        }))
    }
}

impl<R: BufRead> Iterator for ArcFileReader<R> {
    type Item = Result<ArcEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_entry().transpose()
    }
}

#[cfg(test)]
#[path = "arc_test.rs"]
mod arc_test;
