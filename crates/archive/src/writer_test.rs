//! Tests for the archive writer

use std::fs::{self, File};
use std::io::Read;
use std::sync::Arc;

use liveweb_capture::{ErrorCode, ProxyError};
use tempfile::TempDir;

use super::*;
use crate::arc::{ArcFileReader, DecodedRecord};
use crate::pool::{LocalSerial, PoolConfig};

fn pool(dir: &TempDir, max_file_size: u64, with_header: bool) -> FilePool {
    let config = PoolConfig {
        directory: dir.path().to_path_buf(),
        pattern: "live-{serial:05}.arc.gz".into(),
        capacity: 1,
        max_file_size,
        port: 0,
    };
    let init: Option<Arc<dyn FileInit>> = if with_header {
        Some(Arc::new(FileHeader(ArcGzipEncoder::default())))
    } else {
        None
    };
    FilePool::with_parts(config, Arc::new(LocalSerial::default()), init).unwrap()
}

fn bad_gateway() -> Transaction {
    Transaction::bad_gateway(
        "http://example.com/down",
        ProxyError::new(ErrorCode::ConnectionRefused),
    )
}

#[test]
fn test_metadata_for_bad_gateway() {
    let tx = bad_gateway();
    let meta = ArchiveWriter::<ArcGzipEncoder>::metadata(&tx);
    assert_eq!(meta.url, "http://example.com/down");
    assert_eq!(meta.ip.to_string(), "0.0.0.0");
    assert_eq!(meta.content_type, "unk");
    assert_eq!(meta.length, 22);
}

#[test]
fn test_small_record_is_inline_and_on_disk() {
    let dir = TempDir::new().unwrap();
    let pool = pool(&dir, 1_000_000, false);
    let writer = ArchiveWriter::default();

    let mut tx = bad_gateway();
    let record = writer.write(&mut tx, &pool).unwrap();

    assert!(record.is_inline());
    assert_eq!(record.offset(), 0);
    let path = record.filename().unwrap().to_path_buf();
    assert_eq!(path, pool.partial_dir().join("live-00000.arc.gz"));

    let bytes = record.read_all().unwrap();
    assert_eq!(fs::read(&path).unwrap(), bytes.to_vec());

    let decoded = writer.encoder().decode(&bytes).unwrap();
    assert_eq!(decoded.payload, liveweb_capture::BAD_GATEWAY_PAYLOAD);
    assert_eq!(decoded.metadata.content_type, "unk");
}

#[test]
fn test_large_record_streams_to_disk() {
    let dir = TempDir::new().unwrap();
    let pool = pool(&dir, 1_000_000, false);
    let writer = ArchiveWriter::default().with_inline_threshold(0);

    let mut tx = bad_gateway();
    let record = writer.write(&mut tx, &pool).unwrap();

    assert!(!record.is_inline());
    let first = record.read_all().unwrap();
    let second = record.read_all().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.len() as u64, record.content_length());

    let decoded = writer.encoder().decode(&first).unwrap();
    assert_eq!(decoded.metadata.url, "http://example.com/down");
}

#[test]
fn test_records_follow_file_header() {
    let dir = TempDir::new().unwrap();
    let pool = pool(&dir, 1_000_000, true);
    let writer = ArchiveWriter::default();

    let first = writer.write(&mut bad_gateway(), &pool).unwrap();
    let second = writer.write(&mut bad_gateway(), &pool).unwrap();

    assert!(first.offset() > 0);
    assert_eq!(second.offset(), first.offset() + first.content_length());

    let file = fs::read(pool.partial_dir().join("live-00000.arc.gz")).unwrap();
    let entries: Vec<_> = crate::arc::ArcFileReader::new(&file[..])
        .collect::<Result<_>>()
        .unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].record.metadata.url, "filedesc://live-00000.arc.gz");
    assert_eq!(entries[2].offset, second.offset());
}

#[test]
fn test_disk_record_readable_after_promotion() {
    let dir = TempDir::new().unwrap();
    let pool = pool(&dir, 1, false);
    let writer = ArchiveWriter::default().with_inline_threshold(0);

    let record = writer.write(&mut bad_gateway(), &pool).unwrap();

    // The file crossed the limit on release and moved to complete/
    assert!(pool.complete_dir().join("live-00000.arc.gz").exists());
    assert_eq!(
        record.filename().unwrap(),
        pool.partial_dir().join("live-00000.arc.gz")
    );
    let bytes = record.read_all().unwrap();
    assert!(writer.encoder().decode(&bytes).is_ok());
}

/// Writes part of a record, then fails
struct BrokenEncoder;

impl RecordEncoder for BrokenEncoder {
    fn encode(&self, _: &ArcMetadata, _: &mut dyn Read, out: &mut dyn Write) -> io::Result<u64> {
        out.write_all(b"\x1f\x8b half a member")?;
        Err(io::Error::other("encoder failed"))
    }

    fn file_header(&self, name: &str, out: &mut dyn Write) -> io::Result<u64> {
        ArcGzipEncoder::default().file_header(name, out)
    }

    fn decode(&self, record: &[u8]) -> Result<DecodedRecord> {
        ArcGzipEncoder::default().decode(record)
    }
}

#[test]
fn test_failed_record_is_cut_from_file() {
    let dir = TempDir::new().unwrap();
    let pool = pool(&dir, 1_000_000, true);
    let good = ArchiveWriter::default().with_inline_threshold(0);
    let broken = ArchiveWriter::new(BrokenEncoder).with_inline_threshold(0);

    good.write(&mut bad_gateway(), &pool).unwrap();
    assert!(broken.write(&mut bad_gateway(), &pool).is_err());
    let last = good.write(&mut bad_gateway(), &pool).unwrap();
    pool.close().unwrap();

    let file = File::open(pool.partial_dir().join("live-00000.arc.gz")).unwrap();
    let entries: Vec<_> = ArcFileReader::new(file).map(|e| e.unwrap()).collect();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].offset, last.offset());
    assert_eq!(entries[2].record.metadata.url, "http://example.com/down");
}
