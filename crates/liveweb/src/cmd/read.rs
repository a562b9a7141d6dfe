//! Read command - list the records of ARC files
//!
//! One line per record: offset, compressed length, date, captured length,
//! content type and URL.
//!
//! # Usage
//!
//! ```bash
//! liveweb read records/complete/live-00001.arc.gz
//! liveweb read records/complete/                     # every .arc.gz file
//! liveweb read live-00001.arc.gz --offset 1234 --payload
//! ```

use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use liveweb_archive::{ArcEntry, ArcFileReader};

/// Read command arguments
#[derive(Args, Debug)]
pub struct ReadArgs {
    /// Archive file or directory of archive files
    #[arg(value_name = "INPUT")]
    input: PathBuf,

    /// Only show the record starting at this offset
    #[arg(long)]
    offset: Option<u64>,

    /// Write the captured payload of the selected records instead of a listing
    #[arg(long)]
    payload: bool,
}

/// Run the read command
pub fn run(args: ReadArgs) -> Result<()> {
    let mut out = io::stdout().lock();

    if args.input.is_dir() {
        for path in archive_files(&args.input)? {
            writeln!(out, "# {}", path.display())?;
            read_file(&path, &args, &mut out)?;
        }
        Ok(())
    } else {
        read_file(&args.input, &args, &mut out)
    }
}

fn read_file(path: &Path, args: &ReadArgs, out: &mut dyn Write) -> Result<()> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;

    for entry in ArcFileReader::new(file) {
        let entry = entry.with_context(|| format!("failed to read record from {}", path.display()))?;
        if args.offset.is_some_and(|offset| offset != entry.offset) {
            continue;
        }

        if args.payload {
            out.write_all(&entry.record.payload)?;
        } else {
            writeln!(out, "{}", format_entry(&entry))?;
        }
    }

    Ok(())
}

/// Sorted `.arc.gz` files directly under `dir`
fn archive_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read directory {}", dir.display()))? {
        let path = entry?.path();
        if is_archive_file(&path) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn is_archive_file(path: &Path) -> bool {
    path.is_file()
        && path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.ends_with(".arc.gz") || n.ends_with(".arc"))
}

fn format_entry(entry: &ArcEntry) -> String {
    let meta = &entry.record.metadata;
    format!(
        "{:>10} {:>8} {} {:>9} {} {}",
        entry.offset,
        entry.length,
        meta.date.format("%Y-%m-%d %H:%M:%S"),
        meta.length,
        meta.content_type,
        meta.url
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use liveweb_archive::{ArcGzipEncoder, ArcMetadata, DecodedRecord, RecordEncoder};
    use tempfile::TempDir;

    fn entry(offset: u64) -> ArcEntry {
        let meta = ArcMetadata::parse("http://example.com/ 93.184.216.34 20240102030405 text/html 1234")
            .unwrap();
        ArcEntry {
            offset,
            length: 99,
            record: DecodedRecord {
                metadata: meta,
                payload: Vec::new(),
            },
        }
    }

    #[test]
    fn test_format_entry() {
        let line = format_entry(&entry(42));
        assert!(line.contains("2024-01-02 03:04:05"));
        assert!(line.ends_with("1234 text/html http://example.com/"));
        assert!(line.trim_start().starts_with("42 "));
    }

    #[test]
    fn test_read_file_lists_and_selects() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.arc.gz");
        let encoder = ArcGzipEncoder::default();

        let mut data = Vec::new();
        encoder.file_header("test.arc.gz", &mut data).unwrap();
        let second = data.len() as u64;
        let meta = ArcMetadata::parse("http://example.com/ 127.0.0.1 20240102030405 text/plain 5")
            .unwrap();
        encoder.encode(&meta, &mut &b"hello"[..], &mut data).unwrap();
        fs::write(&path, &data).unwrap();

        let args = ReadArgs {
            input: path.clone(),
            offset: None,
            payload: false,
        };
        let mut out = Vec::new();
        read_file(&path, &args, &mut out).unwrap();
        let listing = String::from_utf8(out).unwrap();
        assert_eq!(listing.lines().count(), 2);
        assert!(listing.contains("filedesc://test.arc.gz"));

        let args = ReadArgs {
            input: path.clone(),
            offset: Some(second),
            payload: true,
        };
        let mut out = Vec::new();
        read_file(&path, &args, &mut out).unwrap();
        assert_eq!(out, b"hello");

        assert_eq!(archive_files(dir.path()).unwrap(), vec![path]);
    }
}
