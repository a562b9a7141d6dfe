//! Tests for the spill buffer

use std::io::{Read, Seek, SeekFrom, Write};

use tempfile::TempDir;

use super::SpillBuffer;

#[test]
fn test_empty_buffer_reads_nothing() {
    let mut buf = SpillBuffer::new(100);
    let mut out = Vec::new();
    buf.read_to_end(&mut out).unwrap();
    assert!(out.is_empty());
    assert!(buf.is_empty());
    assert!(buf.in_memory());
}

#[test]
fn test_write_seek_read_in_memory() {
    let mut buf = SpillBuffer::new(100);
    buf.write_all(b"helloworld").unwrap();
    assert_eq!(buf.stream_position().unwrap(), 10);
    assert_eq!(buf.len(), 10);

    buf.seek(SeekFrom::Start(0)).unwrap();
    let mut out = String::new();
    buf.read_to_string(&mut out).unwrap();
    assert_eq!(out, "helloworld");
}

#[test]
fn test_at_threshold_stays_in_memory() {
    let mut buf = SpillBuffer::new(100);
    for _ in 0..10 {
        buf.write_all(b"helloworld").unwrap();
    }
    assert_eq!(buf.len(), 100);
    assert!(buf.in_memory());
    assert!(buf.path().is_none());
}

#[test]
fn test_crossing_threshold_spills_and_preserves_bytes() {
    let mut buf = SpillBuffer::new(100);
    for _ in 0..10 {
        buf.write_all(b"helloworld").unwrap();
    }
    assert!(buf.in_memory());

    buf.write_all(b"helloworld").unwrap();
    assert!(!buf.in_memory());
    assert!(buf.path().is_some());
    assert_eq!(buf.stream_position().unwrap(), 110);

    assert_eq!(buf.to_vec().unwrap(), b"helloworld".repeat(11));
}

#[test]
fn test_single_large_write_spills() {
    let mut buf = SpillBuffer::new(16);
    let data = vec![7u8; 1000];
    buf.write_all(&data).unwrap();
    assert!(!buf.in_memory());
    assert_eq!(buf.len(), 1000);
    assert_eq!(buf.to_vec().unwrap(), data);
}

#[test]
fn test_spills_only_once() {
    let dir = TempDir::new().unwrap();
    let mut buf = SpillBuffer::new(8).with_directory(dir.path());

    buf.write_all(b"0123456789").unwrap();
    let first = buf.path().unwrap().to_path_buf();

    buf.write_all(b"abcdefghij").unwrap();
    buf.write_all(b"klmnopqrst").unwrap();
    assert_eq!(buf.path().unwrap(), first);
    assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    assert_eq!(buf.to_vec().unwrap(), b"0123456789abcdefghijklmnopqrst");
}

#[test]
fn test_seek_preserved_across_spill() {
    let mut buf = SpillBuffer::new(10);
    buf.write_all(b"abcdef").unwrap();
    buf.seek(SeekFrom::Start(2)).unwrap();

    // Overwrites "cdef" and extends past the threshold
    buf.write_all(b"CDEFGHIJKL").unwrap();
    assert!(!buf.in_memory());
    assert_eq!(buf.len(), 12);
    assert_eq!(buf.to_vec().unwrap(), b"abCDEFGHIJKL");
}

#[test]
fn test_overwrite_does_not_grow_len() {
    let mut buf = SpillBuffer::new(100);
    buf.write_all(b"abcdef").unwrap();
    buf.seek(SeekFrom::Start(0)).unwrap();
    buf.write_all(b"xy").unwrap();
    assert_eq!(buf.len(), 6);
    assert_eq!(buf.to_vec().unwrap(), b"xycdef");
}

#[test]
fn test_close_removes_temp_file() {
    let dir = TempDir::new().unwrap();
    let mut buf = SpillBuffer::new(4).with_directory(dir.path());
    buf.write_all(b"more than four bytes").unwrap();

    let path = buf.path().unwrap().to_path_buf();
    assert!(path.exists());

    buf.close().unwrap();
    assert!(!path.exists());
}

#[test]
fn test_drop_removes_temp_file() {
    let dir = TempDir::new().unwrap();
    let path = {
        let mut buf = SpillBuffer::new(4).with_directory(dir.path());
        buf.write_all(b"more than four bytes").unwrap();
        buf.path().unwrap().to_path_buf()
    };
    assert!(!path.exists());
}
