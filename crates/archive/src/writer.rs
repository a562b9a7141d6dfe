//! Transaction → archive record → pool file

use std::io::{self, Write};

use bytes::Bytes;
use liveweb_capture::Transaction;

use crate::arc::{ArcGzipEncoder, ArcMetadata, RecordEncoder};
use crate::error::Result;
use crate::pool::{FileInit, FilePool, SizedWrite};
use crate::record::{Record, RecordLocation};

/// Payloads below this size are encoded in memory first (1MB)
pub const DEFAULT_INLINE_THRESHOLD: u64 = 1024 * 1024;

/// Writes captured transactions as archive records
#[derive(Debug, Clone)]
pub struct ArchiveWriter<E = ArcGzipEncoder> {
    encoder: E,
    inline_threshold: u64,
}

impl Default for ArchiveWriter<ArcGzipEncoder> {
    fn default() -> Self {
        Self::new(ArcGzipEncoder::default())
    }
}

impl<E: RecordEncoder> ArchiveWriter<E> {
    pub fn new(encoder: E) -> Self {
        Self {
            encoder,
            inline_threshold: DEFAULT_INLINE_THRESHOLD,
        }
    }

    pub fn with_inline_threshold(mut self, threshold: u64) -> Self {
        self.inline_threshold = threshold;
        self
    }

    pub fn encoder(&self) -> &E {
        &self.encoder
    }

    /// Record metadata for `tx`
    ///
    /// The length is the captured byte count. A failed fetch gets the
    /// bad-gateway sentinels from the transaction.
    pub fn metadata(tx: &Transaction) -> ArcMetadata {
        ArcMetadata {
            url: tx.url().to_string(),
            ip: tx.remote_ip(),
            date: tx.fetched_at(),
            content_type: tx.content_type().to_string(),
            length: tx.payload_len(),
        }
    }

    /// Write `tx` into a file checked out from `pool`
    pub fn write(&self, tx: &mut Transaction, pool: &FilePool) -> Result<Record> {
        let mut handle = pool.acquire()?;
        let record = self.write_to(tx, &mut handle)?;
        handle.release()?;
        Ok(record)
    }

    /// Write `tx` at the current end of `out`
    ///
    /// Small records are encoded into memory, written out in one go and
    /// returned inline. Large ones are streamed straight into `out` and
    /// returned as a file reference. A record that fails part way is cut
    /// off again so the file still ends on a whole record.
    pub fn write_to<W: SizedWrite>(&self, tx: &mut Transaction, out: &mut W) -> Result<Record> {
        let meta = Self::metadata(tx);
        let offset = out.size();

        let record = match self.encode_into(&meta, tx, out, offset) {
            Ok(record) => record,
            Err(e) => {
                if let Err(cut) = out.truncate(offset) {
                    tracing::error!(url = %meta.url, offset, error = %cut, "failed to cut partial record");
                }
                return Err(e);
            }
        };

        tracing::debug!(
            url = %meta.url,
            file = %out.name(),
            offset,
            length = record.content_length(),
            payload = meta.length,
            inline = record.is_inline(),
            "archive record written"
        );

        Ok(record)
    }

    fn encode_into<W: SizedWrite>(
        &self,
        meta: &ArcMetadata,
        tx: &mut Transaction,
        out: &mut W,
        offset: u64,
    ) -> Result<Record> {
        if meta.length < self.inline_threshold {
            let mut buf = Vec::new();
            self.encoder.encode(meta, &mut tx.payload()?, &mut buf)?;
            out.write_all(&buf)?;
            out.flush()?;

            let location = RecordLocation {
                path: out.path().to_path_buf(),
                offset,
            };
            Ok(Record::inline(Bytes::from(buf), Some(location)))
        } else {
            let length = self.encoder.encode(meta, &mut tx.payload()?, out)?;
            out.flush()?;
            Ok(Record::on_disk(out.path(), offset, length))
        }
    }
}

/// Pool init hook writing the encoder's file header
#[derive(Debug, Clone, Default)]
pub struct FileHeader<E>(pub E);

impl<E: RecordEncoder> FileInit for FileHeader<E> {
    fn init(&self, name: &str, out: &mut dyn Write) -> io::Result<()> {
        self.0.file_header(name, out).map(|_| ())
    }
}

#[cfg(test)]
#[path = "writer_test.rs"]
mod writer_test;
