//! Fetch failure taxonomy
//!
//! Every way a live fetch can fail maps to exactly one [`ErrorCode`]. Codes
//! are grouped by the stage that raised them; the tens digit is the group.
//!
//! | Group | Codes |
//! |-------|-------|
//! | 1x input | `BadUrl` |
//! | 2x name resolution | `InvalidDomain`, `DnsTimeout` |
//! | 3x connect | `ConnectionRefused`, `ConnectTimeout`, `ConnectionError` |
//! | 4x response | `InitialDataTimeout`, `ReadTimeout`, `ConnectionDropped`, `InvalidResponse` |
//! | 5x limits | `ResponseTooBig`, `RequestTookTooLong` |
//!
//! A [`ProxyError`] can ride through `std::io::Read` layers inside an
//! `io::Error` (see [`ProxyError::into_io`] / [`ProxyError::from_io`]) so a
//! limit tripped deep in the socket stack reaches the fetcher with its code.

use std::fmt;
use std::io;
use std::time::Duration;

/// Stable failure code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadUrl,
    InvalidDomain,
    DnsTimeout,
    ConnectionRefused,
    ConnectTimeout,
    ConnectionError,
    InitialDataTimeout,
    ReadTimeout,
    ConnectionDropped,
    InvalidResponse,
    ResponseTooBig,
    RequestTookTooLong,
}

impl ErrorCode {
    /// Numeric code
    pub const fn as_u16(self) -> u16 {
        match self {
            Self::BadUrl => 10,
            Self::InvalidDomain => 20,
            Self::DnsTimeout => 21,
            Self::ConnectionRefused => 30,
            Self::ConnectTimeout => 31,
            Self::ConnectionError => 32,
            Self::InitialDataTimeout => 40,
            Self::ReadTimeout => 41,
            Self::ConnectionDropped => 42,
            Self::InvalidResponse => 43,
            Self::ResponseTooBig => 50,
            Self::RequestTookTooLong => 51,
        }
    }

    /// Fixed short message
    pub const fn message(self) -> &'static str {
        match self {
            Self::BadUrl => "Invalid URL",
            Self::InvalidDomain => "Invalid domain",
            Self::DnsTimeout => "DNS lookup timed out",
            Self::ConnectionRefused => "Connection refused",
            Self::ConnectTimeout => "Connect timeout",
            Self::ConnectionError => "Connection error",
            Self::InitialDataTimeout => "Initial data timeout",
            Self::ReadTimeout => "Read timeout",
            Self::ConnectionDropped => "Connection dropped",
            Self::InvalidResponse => "Invalid HTTP response",
            Self::ResponseTooBig => "Response too big",
            Self::RequestTookTooLong => "Request took too long",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:02} {}", self.as_u16(), self.message())
    }
}

/// The budget that was exceeded, when there is one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    /// A timeout of this length elapsed
    Timeout(Duration),
    /// A byte ceiling of this size was crossed
    Limit(u64),
}

/// A classified fetch failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyError {
    code: ErrorCode,
    cause: Option<String>,
    context: Option<ErrorContext>,
}

impl ProxyError {
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            cause: None,
            context: None,
        }
    }

    /// Attach a human-readable cause
    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.cause = Some(cause.to_string());
        self
    }

    /// Record the timeout that elapsed
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.context = Some(ErrorContext::Timeout(timeout));
        self
    }

    /// Record the byte ceiling that was crossed
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.context = Some(ErrorContext::Limit(limit));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn message(&self) -> &'static str {
        self.code.message()
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }

    pub fn context(&self) -> Option<ErrorContext> {
        self.context
    }

    /// Wrap into an `io::Error` so it can cross `Read` boundaries
    pub fn into_io(self) -> io::Error {
        io::Error::other(self)
    }

    /// Recover a `ProxyError` carried by an `io::Error`
    pub fn from_io(err: &io::Error) -> Option<ProxyError> {
        err.get_ref()
            .and_then(|inner| inner.downcast_ref::<ProxyError>())
            .cloned()
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code)?;
        match self.context {
            Some(ErrorContext::Timeout(t)) => write!(f, " after {:?}", t)?,
            Some(ErrorContext::Limit(n)) => write!(f, " (limit {} bytes)", n)?,
            None => {}
        }
        if let Some(cause) = &self.cause {
            write!(f, ": {}", cause)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProxyError {}

impl From<ErrorCode> for ProxyError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

/// True for the error kinds a socket read timeout produces
///
/// Unix reports an elapsed `SO_RCVTIMEO` as `WouldBlock`, Windows as
/// `TimedOut`.
pub fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_unique() {
        let all = [
            ErrorCode::BadUrl,
            ErrorCode::InvalidDomain,
            ErrorCode::DnsTimeout,
            ErrorCode::ConnectionRefused,
            ErrorCode::ConnectTimeout,
            ErrorCode::ConnectionError,
            ErrorCode::InitialDataTimeout,
            ErrorCode::ReadTimeout,
            ErrorCode::ConnectionDropped,
            ErrorCode::InvalidResponse,
            ErrorCode::ResponseTooBig,
            ErrorCode::RequestTookTooLong,
        ];
        let mut seen = std::collections::HashSet::new();
        for code in all {
            assert!(seen.insert(code.as_u16()), "duplicate code {}", code);
        }
    }

    #[test]
    fn test_display() {
        let err = ProxyError::new(ErrorCode::ReadTimeout)
            .with_timeout(Duration::from_secs(2))
            .with_cause("no data");
        assert_eq!(err.to_string(), "E41 Read timeout after 2s: no data");

        let err = ProxyError::new(ErrorCode::ResponseTooBig).with_limit(100);
        assert_eq!(err.to_string(), "E50 Response too big (limit 100 bytes)");
    }

    #[test]
    fn test_io_round_trip() {
        let err = ProxyError::new(ErrorCode::RequestTookTooLong).with_timeout(Duration::from_secs(1));
        let io_err = err.clone().into_io();
        assert_eq!(ProxyError::from_io(&io_err), Some(err));

        let plain = io::Error::new(io::ErrorKind::ConnectionReset, "reset");
        assert_eq!(ProxyError::from_io(&plain), None);
    }

    #[test]
    fn test_is_timeout() {
        assert!(is_timeout(&io::Error::from(io::ErrorKind::TimedOut)));
        assert!(is_timeout(&io::Error::from(io::ErrorKind::WouldBlock)));
        assert!(!is_timeout(&io::Error::from(io::ErrorKind::ConnectionReset)));
    }
}
