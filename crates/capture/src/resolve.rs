//! Name resolution with a deadline
//!
//! `getaddrinfo` cannot be cancelled, so the lookup runs on a short-lived
//! helper thread and the caller waits on a channel for at most the DNS
//! timeout. A lookup that misses the deadline is left to finish on its own;
//! its result is dropped with the channel.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::thread;
use std::time::Duration;

use crossbeam::channel::{self, RecvTimeoutError};

use crate::error::{ErrorCode, ProxyError};

/// Resolve `host:port`, failing with `DnsTimeout` after `timeout`
pub fn resolve(host: &str, port: u16, timeout: Duration) -> Result<Vec<SocketAddr>, ProxyError> {
    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(vec![SocketAddr::new(ip, port)]);
    }

    let (tx, rx) = channel::bounded(1);
    let lookup_host = host.to_string();

    thread::Builder::new()
        .name("liveweb-dns".into())
        .spawn(move || {
            let result = (lookup_host.as_str(), port)
                .to_socket_addrs()
                .map(|addrs| addrs.collect::<Vec<_>>());
            let _ = tx.send(result);
        })
        .map_err(|e| ProxyError::new(ErrorCode::InvalidDomain).with_cause(e))?;

    match rx.recv_timeout(timeout) {
        Ok(Ok(addrs)) if !addrs.is_empty() => Ok(addrs),
        Ok(Ok(_)) => Err(ProxyError::new(ErrorCode::InvalidDomain)
            .with_cause(format!("no addresses for {}", host))),
        Ok(Err(e)) => {
            Err(ProxyError::new(ErrorCode::InvalidDomain).with_cause(format!("{}: {}", host, e)))
        }
        Err(RecvTimeoutError::Timeout) => Err(ProxyError::new(ErrorCode::DnsTimeout)
            .with_timeout(timeout)
            .with_cause(host)),
        Err(RecvTimeoutError::Disconnected) => Err(ProxyError::new(ErrorCode::InvalidDomain)
            .with_cause(format!("lookup of {} aborted", host))),
    }
}
