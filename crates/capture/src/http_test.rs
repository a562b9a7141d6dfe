//! Tests for the HTTP response reader

use super::*;

fn head(bytes: &[u8]) -> ResponseHead {
    let mut reader = bytes;
    read_response_head(&mut reader).unwrap()
}

// ============================================================================
// Status line
// ============================================================================

#[test]
fn test_parse_status_line() {
    let status = parse_status_line(b"HTTP/1.1 404 Not Found\r\n").unwrap();
    assert_eq!(status.version, "HTTP/1.1");
    assert_eq!(status.code, 404);
    assert_eq!(status.reason, "Not Found");
}

#[test]
fn test_status_line_without_reason() {
    let status = parse_status_line(b"HTTP/1.0 200\n").unwrap();
    assert_eq!(status.code, 200);
    assert_eq!(status.reason, "");
}

#[test]
fn test_status_line_rejects_garbage() {
    assert!(matches!(
        parse_status_line(b"<html>hello</html>\r\n"),
        Err(HttpError::Malformed { .. })
    ));
    assert!(matches!(
        parse_status_line(b"HTTP/1.1 20x OK\r\n"),
        Err(HttpError::Malformed { .. })
    ));
}

#[test]
fn test_empty_stream_is_incomplete() {
    let mut reader: &[u8] = b"";
    assert!(matches!(
        read_status_line(&mut reader),
        Err(HttpError::Incomplete("status line"))
    ));
}

// ============================================================================
// Headers
// ============================================================================

#[test]
fn test_headers_and_accessors() {
    let head = head(
        b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: 12\r\n\r\n",
    );
    assert_eq!(head.header("content-type"), Some("text/html; charset=utf-8"));
    assert_eq!(head.content_type(), Some("text/html"));
    assert_eq!(head.content_length(), Some(12));
    assert_eq!(head.framing(), Framing::Length(12));
}

#[test]
fn test_content_type_is_one_token() {
    let spaced = head(b"HTTP/1.1 200 OK\r\nContent-Type: text/html charset=utf-8\r\n\r\n");
    assert_eq!(spaced.content_type(), Some("text/html"));

    let padded = head(b"HTTP/1.1 200 OK\r\nContent-Type:   text/plain ;q=1\r\n\r\n");
    assert_eq!(padded.content_type(), Some("text/plain"));

    let empty = head(b"HTTP/1.1 200 OK\r\nContent-Type: ; charset=utf-8\r\n\r\n");
    assert_eq!(empty.content_type(), None);

    let non_ascii = head("HTTP/1.1 200 OK\r\nContent-Type: t\u{e9}xt/html\r\n\r\n".as_bytes());
    assert_eq!(non_ascii.content_type(), None);
}

#[test]
fn test_folded_header_is_joined() {
    let head = head(b"HTTP/1.1 200 OK\r\nX-Long: one\r\n  two\r\n\r\n");
    assert_eq!(head.header("x-long"), Some("one two"));
}

#[test]
fn test_header_without_colon_is_malformed() {
    let mut reader: &[u8] = b"HTTP/1.1 200 OK\r\nbroken header\r\n\r\n";
    assert!(matches!(
        read_response_head(&mut reader),
        Err(HttpError::Malformed { what: "header", .. })
    ));
}

#[test]
fn test_eof_in_headers_is_incomplete() {
    let mut reader: &[u8] = b"HTTP/1.1 200 OK\r\nServer: x\r\n";
    assert!(matches!(
        read_response_head(&mut reader),
        Err(HttpError::Incomplete("headers"))
    ));
}

#[test]
fn test_interim_responses_are_skipped() {
    let head = head(b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 201 Created\r\n\r\n");
    assert_eq!(head.status.code, 201);
}

#[test]
fn test_framing_rules() {
    assert_eq!(head(b"HTTP/1.1 204 No Content\r\n\r\n").framing(), Framing::Empty);
    assert_eq!(
        head(b"HTTP/1.1 304 Not Modified\r\nContent-Length: 10\r\n\r\n").framing(),
        Framing::Empty
    );
    assert_eq!(
        head(b"HTTP/1.1 200 OK\r\nTransfer-Encoding: gzip, chunked\r\nContent-Length: 3\r\n\r\n")
            .framing(),
        Framing::Chunked
    );
    assert_eq!(head(b"HTTP/1.0 200 OK\r\n\r\n").framing(), Framing::UntilClose);
}

// ============================================================================
// Bodies
// ============================================================================

#[test]
fn test_length_body() {
    let mut reader: &[u8] = b"hello world, and more";
    let mut body = Vec::new();
    let n = read_body(&mut reader, Framing::Length(11), &mut body).unwrap();
    assert_eq!(n, 11);
    assert_eq!(body, b"hello world");
    assert_eq!(reader, b", and more");
}

#[test]
fn test_short_length_body_is_incomplete() {
    let mut reader: &[u8] = b"short";
    let mut body = Vec::new();
    assert!(matches!(
        read_body(&mut reader, Framing::Length(100), &mut body),
        Err(HttpError::Incomplete("body"))
    ));
}

#[test]
fn test_chunked_body_decoded() {
    let mut reader: &[u8] = b"5\r\nhello\r\n6;ext=1\r\n world\r\n0\r\nX-Trailer: yes\r\n\r\nleftover";
    let mut body = Vec::new();
    let n = read_body(&mut reader, Framing::Chunked, &mut body).unwrap();
    assert_eq!(n, 11);
    assert_eq!(body, b"hello world");
    assert_eq!(reader, b"leftover");
}

#[test]
fn test_chunked_eof_after_last_chunk_is_complete() {
    let mut reader: &[u8] = b"3\r\nabc\r\n0\r\n";
    let mut body = Vec::new();
    assert_eq!(read_body(&mut reader, Framing::Chunked, &mut body).unwrap(), 3);
}

#[test]
fn test_chunked_truncated_is_incomplete() {
    let mut reader: &[u8] = b"a\r\nabc";
    let mut body = Vec::new();
    assert!(matches!(
        read_body(&mut reader, Framing::Chunked, &mut body),
        Err(HttpError::Incomplete("chunk"))
    ));
}

#[test]
fn test_bad_chunk_size_is_malformed() {
    let mut reader: &[u8] = b"zz\r\nabc\r\n";
    let mut body = Vec::new();
    assert!(matches!(
        read_body(&mut reader, Framing::Chunked, &mut body),
        Err(HttpError::Malformed { what: "chunk size", .. })
    ));
}

#[test]
fn test_until_close_body() {
    let mut reader: &[u8] = b"everything until EOF";
    let mut body = Vec::new();
    read_body(&mut reader, Framing::UntilClose, &mut body).unwrap();
    assert_eq!(body, b"everything until EOF");
}

#[test]
fn test_parse_response() {
    let response = parse_response(
        b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n0\r\n\r\n",
    )
    .unwrap();
    assert_eq!(response.head.status.code, 200);
    assert_eq!(response.body, b"Wiki");
}
