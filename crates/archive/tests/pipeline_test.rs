//! Fetch → archive round trips against a loopback server

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use liveweb_archive::{
    ArcFileReader, ArcGzipEncoder, ArchiveWriter, FileHeader, FilePool, LocalSerial, PoolConfig,
    RecordEncoder,
};
use liveweb_capture::{Fetcher, FetcherConfig};
use tempfile::TempDir;

fn serve_once(response: Vec<u8>) -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("http://{}/hello", listener.local_addr().unwrap());
    let handle = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut byte = [0u8; 1];
        while !request.ends_with(b"\r\n\r\n") && stream.read(&mut byte).unwrap_or(0) == 1 {
            request.push(byte[0]);
        }
        stream.write_all(&response).unwrap();
    });
    (url, handle)
}

fn pool(dir: &TempDir) -> FilePool {
    FilePool::with_parts(
        PoolConfig {
            directory: dir.path().to_path_buf(),
            pattern: "live-{serial:05}.arc.gz".into(),
            capacity: 2,
            max_file_size: 10 * 1024 * 1024,
            port: 0,
        },
        Arc::new(LocalSerial::default()),
        Some(Arc::new(FileHeader(ArcGzipEncoder::default()))),
    )
    .unwrap()
}

fn fetcher() -> Fetcher {
    Fetcher::new(FetcherConfig {
        initial_data_timeout: Duration::from_secs(2),
        read_timeout: Duration::from_secs(2),
        ..FetcherConfig::default()
    })
}

#[test]
fn test_chunked_length_is_wire_length() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n5\r\nworld\r\n0\r\n\r\n".to_vec();
    let (url, server) = serve_once(raw.clone());

    let dir = TempDir::new().unwrap();
    let pool = pool(&dir);
    let writer = ArchiveWriter::default();

    let mut tx = fetcher().fetch(&url).unwrap();
    server.join().unwrap();
    let record = writer.write(&mut tx, &pool).unwrap();

    let decoded = writer.encoder().decode(&record.read_all().unwrap()).unwrap();
    assert_eq!(decoded.metadata.length, raw.len() as u64);
    assert_eq!(decoded.metadata.content_type, "text/plain");
    assert_eq!(decoded.metadata.ip.to_string(), "127.0.0.1");
    assert_eq!(decoded.metadata.url, url);
    assert_eq!(decoded.payload, raw);
}

#[test]
fn test_content_type_with_spaces_still_decodes() {
    let raw = b"HTTP/1.1 200 OK\r\nContent-Type: text/html charset=utf-8\r\nContent-Length: 2\r\n\r\nhi".to_vec();
    let (url, server) = serve_once(raw.clone());

    let dir = TempDir::new().unwrap();
    let pool = pool(&dir);
    let writer = ArchiveWriter::default();

    let mut tx = fetcher().fetch(&url).unwrap();
    server.join().unwrap();
    let record = writer.write(&mut tx, &pool).unwrap();

    let decoded = writer.encoder().decode(&record.read_all().unwrap()).unwrap();
    assert_eq!(decoded.metadata.content_type, "text/html");
    assert_eq!(decoded.payload, raw);
}

#[test]
fn test_large_response_streams_and_rereads() {
    let body = vec![b'z'; 300 * 1024];
    let mut raw = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: application/octet-stream\r\nContent-Length: {}\r\n\r\n",
        body.len()
    )
    .into_bytes();
    raw.extend_from_slice(&body);
    let (url, server) = serve_once(raw.clone());

    let dir = TempDir::new().unwrap();
    let pool = pool(&dir);
    let writer = ArchiveWriter::default().with_inline_threshold(64 * 1024);

    let mut tx = fetcher().fetch(&url).unwrap();
    server.join().unwrap();
    let record = writer.write(&mut tx, &pool).unwrap();

    assert!(!record.is_inline());
    let first = record.read_all().unwrap();
    assert_eq!(first, record.read_all().unwrap());

    let decoded = writer.encoder().decode(&first).unwrap();
    assert_eq!(decoded.payload, raw);

    pool.close().unwrap();
    let file = std::fs::File::open(record.resolve_path().unwrap()).unwrap();
    let urls: Vec<String> = ArcFileReader::new(file)
        .map(|e| e.unwrap().record.metadata.url)
        .collect();
    assert_eq!(urls.len(), 2);
    assert_eq!(urls[1], url);
}

#[test]
fn test_failed_fetch_still_archived() {
    let port = TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port();
    let url = format!("http://127.0.0.1:{}/", port);

    let dir = TempDir::new().unwrap();
    let pool = pool(&dir);
    let writer = ArchiveWriter::default();

    let mut tx = fetcher().fetch_or_bad_gateway(&url);
    let record = writer.write(&mut tx, &pool).unwrap();

    let decoded = writer.encoder().decode(&record.read_all().unwrap()).unwrap();
    assert_eq!(decoded.payload, b"HTTP 502 Bad Gateway\n\n");
    assert_eq!(decoded.metadata.ip.to_string(), "0.0.0.0");
}
