//! Liveweb Capture
//!
//! Live HTTP fetching that keeps the exact bytes received on the wire.
//!
//! # Layers
//!
//! ```text
//! http parser ─► WireCapture ─► BufReader ─► BoundedSocket ─► TcpStream
//!                     │                          │
//!                SpillBuffer             time / size ceilings
//! ```
//!
//! The parser only decides how far to read. Whatever it consumes passes
//! through [`WireCapture`], which copies it into a [`SpillBuffer`]; that
//! copy, chunk framing and all, is the archived payload.
//!
//! # Example
//!
//! ```no_run
//! use liveweb_capture::{Fetcher, FetcherConfig};
//!
//! let fetcher = Fetcher::new(FetcherConfig::default());
//! let mut tx = fetcher.fetch_or_bad_gateway("http://example.com/");
//! println!("{} {} bytes", tx.status(), tx.payload_len());
//! let payload = tx.payload_bytes().unwrap();
//! ```

pub mod bounded;
pub mod error;
pub mod fetcher;
pub mod http;
pub mod resolve;
pub mod spill;
pub mod target;
pub mod transaction;
pub mod wire;

pub use bounded::{BoundedSocket, TimedRead};
pub use error::{ErrorCode, ErrorContext, ProxyError};
pub use fetcher::{Fetcher, FetcherConfig};
pub use http::{Framing, HttpError, Response, ResponseHead, StatusLine};
pub use spill::{DEFAULT_SPILL_THRESHOLD, SpillBuffer};
pub use target::Target;
pub use transaction::{BAD_GATEWAY_PAYLOAD, DEFAULT_CONTENT_TYPE, Transaction, UNKNOWN_IP};
pub use wire::{CaptureOverflow, LineRead, WireCapture};
