//! One captured HTTP exchange

use std::io::{self, Read, Seek, SeekFrom};
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, Utc};

use crate::error::ProxyError;
use crate::http::ResponseHead;
use crate::spill::SpillBuffer;

/// Content type recorded when the response has none, or on failure
pub const DEFAULT_CONTENT_TYPE: &str = "unk";

/// Payload archived in place of a failed fetch
pub const BAD_GATEWAY_PAYLOAD: &[u8] = b"HTTP 502 Bad Gateway\n\n";

/// Remote address recorded for a failed fetch
pub const UNKNOWN_IP: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Result of a fetch: the raw wire bytes plus what was parsed from them
///
/// A failed fetch is still a transaction. It carries the [`ProxyError`] and
/// archives as a fixed bad-gateway payload, so every request ends in a
/// record.
#[derive(Debug)]
pub struct Transaction {
    url: String,
    remote_ip: Option<IpAddr>,
    head: Option<ResponseHead>,
    content_type: String,
    capture: SpillBuffer,
    body_offset: u64,
    failure: Option<ProxyError>,
    fetched_at: DateTime<Utc>,
}

impl Transaction {
    pub(crate) fn captured(
        url: &str,
        remote_ip: IpAddr,
        head: ResponseHead,
        capture: SpillBuffer,
        body_offset: u64,
        fetched_at: DateTime<Utc>,
    ) -> Self {
        let content_type = head
            .content_type()
            .unwrap_or(DEFAULT_CONTENT_TYPE)
            .to_string();

        Self {
            url: url.to_string(),
            remote_ip: Some(remote_ip),
            head: Some(head),
            content_type,
            capture,
            body_offset,
            failure: None,
            fetched_at,
        }
    }

    /// Synthetic 502 standing in for a failed fetch
    pub fn bad_gateway(url: &str, error: ProxyError) -> Self {
        Self {
            url: url.to_string(),
            remote_ip: None,
            head: None,
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            capture: SpillBuffer::new(0),
            body_offset: 0,
            failure: Some(error),
            fetched_at: Utc::now(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Peer address, or `0.0.0.0` for a failed fetch
    pub fn remote_ip(&self) -> IpAddr {
        self.remote_ip.unwrap_or(UNKNOWN_IP)
    }

    pub fn head(&self) -> Option<&ResponseHead> {
        self.head.as_ref()
    }

    /// HTTP status; 502 for a failed fetch
    pub fn status(&self) -> u16 {
        self.head.as_ref().map_or(502, |h| h.status.code)
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub fn failure(&self) -> Option<&ProxyError> {
        self.failure.as_ref()
    }

    pub fn is_bad_gateway(&self) -> bool {
        self.failure.is_some()
    }

    pub fn fetched_at(&self) -> DateTime<Utc> {
        self.fetched_at
    }

    /// Offset in the capture where the body starts
    pub fn body_offset(&self) -> u64 {
        self.body_offset
    }

    /// Length of the payload that gets archived
    ///
    /// The real captured byte count, framing included, never a header value.
    pub fn payload_len(&self) -> u64 {
        if self.is_bad_gateway() {
            BAD_GATEWAY_PAYLOAD.len() as u64
        } else {
            self.capture.len()
        }
    }

    /// Reader over the archived payload, from its first byte
    pub fn payload(&mut self) -> io::Result<Box<dyn Read + '_>> {
        if self.is_bad_gateway() {
            return Ok(Box::new(BAD_GATEWAY_PAYLOAD));
        }
        self.capture.seek(SeekFrom::Start(0))?;
        let len = self.capture.len();
        Ok(Box::new((&mut self.capture).take(len)))
    }

    /// Whole payload in memory
    pub fn payload_bytes(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(usize::try_from(self.payload_len()).unwrap_or(0));
        self.payload()?.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Release the capture, removing any spill file
    pub fn close(self) -> io::Result<()> {
        self.capture.close()
    }
}
