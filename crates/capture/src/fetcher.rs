//! Live fetcher
//!
//! One blocking GET per call. The stages run in order and each one maps its
//! failures onto its own error codes:
//!
//! ```text
//! parse URL ─► resolve ─► connect ─► send ─► status line ─► headers ─► body
//!  BadUrl      20/21      30/31/32    32      40 (initial)   41/42 (read)
//! ```
//!
//! `ResponseTooBig` and `RequestTookTooLong` can surface at any point after
//! connect; they come out of the [`BoundedSocket`] underneath the parser.

use std::io::{self, BufReader, Write};
use std::net::{SocketAddr, TcpStream};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::bounded::BoundedSocket;
use crate::error::{ErrorCode, ProxyError, is_timeout};
use crate::http::{self, HttpError, ResponseHead};
use crate::resolve::resolve;
use crate::spill::{DEFAULT_SPILL_THRESHOLD, SpillBuffer};
use crate::target::Target;
use crate::transaction::Transaction;
use crate::wire::{CaptureOverflow, WireCapture};

/// Socket read buffer size
const READ_BUFFER_SIZE: usize = 16 * 1024;

/// Fetcher timeouts and limits
#[derive(Debug, Clone)]
pub struct FetcherConfig {
    pub user_agent: String,
    pub dns_timeout: Duration,
    pub connect_timeout: Duration,
    /// Wait for the status line after the request is sent
    pub initial_data_timeout: Duration,
    /// Inactivity between two reads once the response has started
    pub read_timeout: Duration,
    /// Wall-clock budget from connect to the last body byte
    pub max_request_time: Option<Duration>,
    /// Ceiling on bytes received
    pub max_response_size: Option<u64>,
    pub spill_threshold: usize,
    pub spill_directory: Option<PathBuf>,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            user_agent: "ia_archiver(OS-Wayback)".to_string(),
            dns_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(10),
            initial_data_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(10),
            max_request_time: Some(Duration::from_secs(300)),
            max_response_size: Some(100 * 1024 * 1024),
            spill_threshold: DEFAULT_SPILL_THRESHOLD,
            spill_directory: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    Status,
    Body,
}

/// Performs live fetches with the configured limits
#[derive(Debug, Clone, Default)]
pub struct Fetcher {
    config: FetcherConfig,
}

impl Fetcher {
    pub fn new(config: FetcherConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Fetch `url`, failing with a classified [`ProxyError`]
    pub fn fetch(&self, url: &str) -> Result<Transaction, ProxyError> {
        let started = Instant::now();
        let target = Target::parse(url)?;
        let addrs = resolve(&target.host, target.port, self.config.dns_timeout)?;

        let (stream, peer) = self.connect(&addrs)?;
        let connected_at = Instant::now();

        tracing::debug!(
            url = %url,
            peer = %peer,
            connect_ms = started.elapsed().as_millis() as u64,
            "connected"
        );

        self.send(&stream, &target)?;

        let mut socket = BoundedSocket::new(stream)
            .started_at(connected_at)
            .with_max_time(self.config.max_request_time)
            .with_max_size(self.config.max_response_size);
        socket.set_read_timeout(Some(self.config.initial_data_timeout));

        let mut capture = WireCapture::new(
            BufReader::with_capacity(READ_BUFFER_SIZE, socket),
            self.spill_buffer(),
        );
        if let Some(max) = self.config.max_response_size {
            capture = capture.with_max_size(max);
        }

        let head = self.read_head(&mut capture)?;
        let body_offset = capture.captured();

        http::read_body(&mut capture, head.framing(), &mut io::sink())
            .map_err(|e| self.classify(Stage::Body, e))?;

        capture.get_mut().get_mut().check()?;

        let captured = capture.captured();
        let (_, spill) = capture.into_parts();

        tracing::debug!(
            url = %url,
            status = head.status.code,
            bytes = captured,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "fetched"
        );

        Ok(Transaction::captured(
            url,
            peer.ip(),
            head,
            spill,
            body_offset,
            Utc::now(),
        ))
    }

    /// Fetch `url`; a failure becomes a synthetic bad-gateway transaction
    pub fn fetch_or_bad_gateway(&self, url: &str) -> Transaction {
        match self.fetch(url) {
            Ok(tx) => tx,
            Err(err) => {
                tracing::warn!(
                    url = %url,
                    code = err.code().as_u16(),
                    error = %err,
                    "live fetch failed, recording bad gateway"
                );
                Transaction::bad_gateway(url, err)
            }
        }
    }

    fn spill_buffer(&self) -> SpillBuffer {
        let buffer = SpillBuffer::new(self.config.spill_threshold);
        match &self.config.spill_directory {
            Some(dir) => buffer.with_directory(dir),
            None => buffer,
        }
    }

    /// Try each resolved address in turn; the last failure is reported
    fn connect(&self, addrs: &[SocketAddr]) -> Result<(TcpStream, SocketAddr), ProxyError> {
        let timeout = self.config.connect_timeout;
        let mut last_err = None;

        for addr in addrs {
            match TcpStream::connect_timeout(addr, timeout) {
                Ok(stream) => {
                    let peer = stream.peer_addr().unwrap_or(*addr);
                    return Ok((stream, peer));
                }
                Err(e) => {
                    tracing::debug!(addr = %addr, error = %e, "connect failed");
                    last_err = Some(e);
                }
            }
        }

        let Some(err) = last_err else {
            return Err(ProxyError::new(ErrorCode::InvalidDomain).with_cause("no addresses"));
        };

        Err(match err.kind() {
            io::ErrorKind::ConnectionRefused => {
                ProxyError::new(ErrorCode::ConnectionRefused).with_cause(err)
            }
            _ if is_timeout(&err) => ProxyError::new(ErrorCode::ConnectTimeout)
                .with_timeout(timeout)
                .with_cause(err),
            _ => ProxyError::new(ErrorCode::ConnectionError).with_cause(err),
        })
    }

    fn send(&self, stream: &TcpStream, target: &Target) -> Result<(), ProxyError> {
        let request = target.request(&self.config.user_agent);
        let connection_error = |e: io::Error| ProxyError::new(ErrorCode::ConnectionError).with_cause(e);

        stream
            .set_write_timeout(Some(self.config.connect_timeout))
            .map_err(connection_error)?;
        let mut writer = stream;
        writer.write_all(request.as_bytes()).map_err(connection_error)?;
        writer.flush().map_err(connection_error)
    }

    /// Status line under the initial-data timeout, then headers under the
    /// read timeout. Interim `1xx` responses are captured and skipped.
    fn read_head(
        &self,
        capture: &mut WireCapture<BufReader<BoundedSocket<TcpStream>>>,
    ) -> Result<ResponseHead, ProxyError> {
        let mut stage = Stage::Status;

        loop {
            let status = http::read_status_line(capture).map_err(|e| self.classify(stage, e))?;

            stage = Stage::Body;
            capture
                .get_mut()
                .get_mut()
                .set_read_timeout(Some(self.config.read_timeout));

            let headers = http::read_headers(capture).map_err(|e| self.classify(stage, e))?;

            if (100..200).contains(&status.code) && status.code != 101 {
                continue;
            }
            return Ok(ResponseHead { status, headers });
        }
    }

    fn classify(&self, stage: Stage, err: HttpError) -> ProxyError {
        match err {
            HttpError::Io(e) => self.classify_io(stage, e),
            HttpError::Incomplete(what) => ProxyError::new(ErrorCode::ConnectionDropped)
                .with_cause(format!("connection closed during {}", what)),
            HttpError::Malformed { .. } => {
                ProxyError::new(ErrorCode::InvalidResponse).with_cause(err)
            }
        }
    }

    fn classify_io(&self, stage: Stage, err: io::Error) -> ProxyError {
        if let Some(proxy) = ProxyError::from_io(&err) {
            return proxy;
        }
        if let Some(overflow) = CaptureOverflow::from_io(&err) {
            return ProxyError::new(ErrorCode::ResponseTooBig).with_limit(overflow.limit);
        }

        match stage {
            Stage::Status if is_timeout(&err) => ProxyError::new(ErrorCode::InitialDataTimeout)
                .with_timeout(self.config.initial_data_timeout),
            Stage::Status => ProxyError::new(ErrorCode::InitialDataTimeout).with_cause(err),
            Stage::Body if is_timeout(&err) => {
                ProxyError::new(ErrorCode::ReadTimeout).with_timeout(self.config.read_timeout)
            }
            Stage::Body => ProxyError::new(ErrorCode::ConnectionDropped).with_cause(err),
        }
    }
}
