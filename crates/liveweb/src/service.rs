//! HTTP front end of the proxy
//!
//! Every GET is turned into a target URL, captured on a blocking thread and
//! answered either with the archive record itself or, in pass-through mode,
//! with the original response rebuilt from that record.

use std::io::SeekFrom;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use liveweb_archive::{ARC_RECORD_CONTENT_TYPE, ArchiveError, Record, RecordEncoder};
use liveweb_capture::http;
use liveweb_config::ServeMode;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Semaphore;
use tokio_util::io::ReaderStream;
use tower_http::trace::TraceLayer;

use crate::context::AppContext;

/// Prefix for reaching the proxy with a plain URL (`/_web/http://host/path`)
pub const WEB_PREFIX: &str = "/_web/";

/// Headers describing the original connection, not the rebuilt response
const HOP_BY_HOP: [&str; 5] = [
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "proxy-connection",
];

#[derive(Clone)]
struct ProxyState {
    ctx: Arc<AppContext>,
    jobs: Arc<Semaphore>,
}

/// Router answering every path with the proxy handler
///
/// At most `max_jobs` captures run at once; later requests wait for a slot.
pub fn router(ctx: Arc<AppContext>, max_jobs: usize) -> Router {
    let state = ProxyState {
        ctx,
        jobs: Arc::new(Semaphore::new(max_jobs.max(1))),
    };

    Router::new()
        .fallback(proxy)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Target URL of an inbound request
///
/// Accepts absolute-form proxy requests, the `/_web/` prefix, and
/// origin-form requests with a `Host` header (as forwarded by a reverse
/// proxy that strips the scheme and host).
pub fn request_url(uri: &Uri, host: Option<&str>) -> Option<String> {
    if uri.scheme().is_some() && uri.authority().is_some() {
        return Some(uri.to_string());
    }

    let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
    if let Some(url) = path.strip_prefix(WEB_PREFIX) {
        return (!url.is_empty()).then(|| url.to_string());
    }

    let host = host.filter(|h| !h.is_empty())?;
    Some(format!("http://{}{}", host, path))
}

/// What the blocking job hands back to the async side
enum Reply {
    Inline(bytes::Bytes),
    OnDisk { path: PathBuf, offset: u64, len: u64 },
    Http(http::Response),
    /// Payload that is not an HTTP message (a bad-gateway record)
    Raw(Vec<u8>),
}

async fn proxy(
    State(state): State<ProxyState>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    if method != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET")],
            "only GET is supported\n",
        )
            .into_response();
    }

    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let Some(url) = request_url(&uri, host) else {
        return (StatusCode::BAD_REQUEST, "no target URL in request\n").into_response();
    };

    let Ok(_permit) = state.jobs.clone().acquire_owned().await else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let ctx = Arc::clone(&state.ctx);
    let job_url = url.clone();
    let reply = match tokio::task::spawn_blocking(move || run_capture(&ctx, &job_url)).await {
        Ok(Ok(reply)) => reply,
        Ok(Err(e)) => {
            tracing::error!(url = %url, error = %e, "capture failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, "archive write failed\n").into_response();
        }
        Err(e) => {
            tracing::error!(url = %url, error = %e, "capture task panicked");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    match into_response(reply).await {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(url = %url, error = %e, "failed to open archived record");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

fn run_capture(ctx: &AppContext, url: &str) -> Result<Reply, ArchiveError> {
    let record = ctx.capture(url)?;

    match ctx.mode() {
        ServeMode::Archive => archive_reply(&record),
        ServeMode::Passthrough => {
            let decoded = ctx.writer().encoder().decode(&record.read_all()?)?;
            Ok(match http::parse_response(&decoded.payload) {
                Ok(response) => Reply::Http(response),
                Err(e) => {
                    tracing::debug!(url = %url, error = %e, "archived payload is not HTTP");
                    Reply::Raw(decoded.payload)
                }
            })
        }
    }
}

fn archive_reply(record: &Record) -> Result<Reply, ArchiveError> {
    if let Some(bytes) = record.inline_bytes() {
        return Ok(Reply::Inline(bytes.clone()));
    }
    Ok(Reply::OnDisk {
        path: record.resolve_path()?,
        offset: record.offset(),
        len: record.content_length(),
    })
}

async fn into_response(reply: Reply) -> std::io::Result<Response> {
    let response = match reply {
        Reply::Inline(bytes) => arc_response(bytes.len() as u64, Body::from(bytes)),
        Reply::OnDisk { path, offset, len } => {
            let mut file = tokio::fs::File::open(&path).await?;
            file.seek(SeekFrom::Start(offset)).await?;
            let stream = ReaderStream::new(file.take(len));
            arc_response(len, Body::from_stream(stream))
        }
        Reply::Http(original) => passthrough_response(original),
        Reply::Raw(payload) => (StatusCode::BAD_GATEWAY, payload).into_response(),
    };
    Ok(response)
}

fn arc_response(len: u64, body: Body) -> Response {
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(ARC_RECORD_CONTENT_TYPE)),
            (header::CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        body,
    )
        .into_response()
}

fn passthrough_response(original: http::Response) -> Response {
    let status = StatusCode::from_u16(original.head.status.code).unwrap_or(StatusCode::BAD_GATEWAY);

    let mut headers = HeaderMap::new();
    for (name, value) in &original.head.headers {
        if HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)) {
            continue;
        }
        // Headers axum cannot represent are dropped
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            headers.append(name, value);
        }
    }

    (status, headers, original.body).into_response()
}

#[cfg(test)]
#[path = "service_test.rs"]
mod service_test;
