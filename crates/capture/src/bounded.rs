//! Time and size ceilings on a socket's receive path
//!
//! [`BoundedSocket`] checks two counters on every `read`: wall time since
//! the request started and bytes received so far. A crossed ceiling never
//! eats data; the read that crossed it still returns its bytes, the
//! failure is remembered and every later read returns it.
//!
//! There is no timer thread. Before each read the inactivity timeout is
//! armed as `min(read_timeout, time budget left)`, so a stalled peer cannot
//! hold a read past the overall deadline either.

use std::io::{self, Read};
use std::net::TcpStream;
use std::time::{Duration, Instant};

use crate::error::{ErrorCode, ProxyError, is_timeout};

/// A readable stream whose blocking reads can be given a timeout
pub trait TimedRead: Read {
    /// Bound the next blocking reads; `None` waits forever
    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl TimedRead for TcpStream {
    fn set_recv_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.set_read_timeout(timeout)
    }
}

/// Socket wrapper enforcing a max request time and a max response size
pub struct BoundedSocket<S> {
    inner: S,
    started: Instant,
    max_time: Option<Duration>,
    max_size: Option<u64>,
    read_timeout: Option<Duration>,
    received: u64,
    tripped: Option<ProxyError>,
}

impl<S: TimedRead> BoundedSocket<S> {
    /// Unbounded wrapper; the time budget starts now
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            started: Instant::now(),
            max_time: None,
            max_size: None,
            read_timeout: None,
            received: 0,
            tripped: None,
        }
    }

    /// Count the time budget from `started` (usually the connect time)
    pub fn started_at(mut self, started: Instant) -> Self {
        self.started = started;
        self
    }

    pub fn with_max_time(mut self, max_time: Option<Duration>) -> Self {
        self.max_time = max_time;
        self
    }

    pub fn with_max_size(mut self, max_size: Option<u64>) -> Self {
        self.max_size = max_size;
        self
    }

    /// Inactivity timeout applied to each individual read
    pub fn set_read_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// Bytes received so far
    pub fn received(&self) -> u64 {
        self.received
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Final check once the caller has stopped reading
    ///
    /// Returns the failure recorded by the last read, or a fresh one if the
    /// time budget ran out since.
    pub fn check(&mut self) -> Result<(), ProxyError> {
        if let Some(err) = &self.tripped {
            return Err(err.clone());
        }
        if let Some(max_time) = self.max_time
            && self.started.elapsed() > max_time
        {
            return Err(self.trip(too_long(max_time)));
        }
        Ok(())
    }

    fn trip(&mut self, err: ProxyError) -> ProxyError {
        tracing::debug!(
            error = %err,
            received = self.received,
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            "socket limit reached"
        );
        self.tripped = Some(err.clone());
        err
    }

    /// Timeout for the next read, or the time-budget failure if none is left
    fn next_timeout(&mut self) -> Result<Option<Duration>, ProxyError> {
        let Some(max_time) = self.max_time else {
            return Ok(self.read_timeout);
        };

        let remaining = max_time.saturating_sub(self.started.elapsed());
        if remaining.is_zero() {
            return Err(self.trip(too_long(max_time)));
        }

        Ok(Some(match self.read_timeout {
            Some(timeout) => timeout.min(remaining),
            None => remaining,
        }))
    }
}

impl<S: TimedRead> Read for BoundedSocket<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if let Some(err) = &self.tripped {
            return Err(err.clone().into_io());
        }

        let timeout = self.next_timeout().map_err(ProxyError::into_io)?;
        self.inner.set_recv_timeout(timeout)?;

        let n = match self.inner.read(buf) {
            Ok(n) => n,
            Err(e) => {
                // A timeout that fired because the overall budget ran out is
                // not an inactivity timeout
                if is_timeout(&e)
                    && let Some(max_time) = self.max_time
                    && self.started.elapsed() >= max_time
                {
                    return Err(self.trip(too_long(max_time)).into_io());
                }
                return Err(e);
            }
        };

        self.received += n as u64;

        if let Some(max_size) = self.max_size
            && self.received > max_size
        {
            self.trip(ProxyError::new(ErrorCode::ResponseTooBig).with_limit(max_size));
        } else if let Some(max_time) = self.max_time
            && self.started.elapsed() > max_time
        {
            self.trip(too_long(max_time));
        }

        Ok(n)
    }
}

fn too_long(max_time: Duration) -> ProxyError {
    ProxyError::new(ErrorCode::RequestTookTooLong).with_timeout(max_time)
}
