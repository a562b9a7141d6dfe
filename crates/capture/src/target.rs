//! Fetch target: a URL broken down for a raw HTTP/1.1 request

use url::{Host, Url};

use crate::error::{ErrorCode, ProxyError};

/// Where to connect and what to ask for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    /// Host to resolve (domain name or IP literal, no brackets)
    pub host: String,
    pub port: u16,
    /// Request target: path plus query
    pub resource: String,
    /// Value for the `Host` request header
    pub host_header: String,
}

impl Target {
    /// Parse an `http://` URL
    ///
    /// Anything that is not an absolute `http` URL with a host fails with
    /// [`ErrorCode::BadUrl`].
    pub fn parse(url: &str) -> Result<Self, ProxyError> {
        let bad_url = |cause: &dyn std::fmt::Display| {
            ProxyError::new(ErrorCode::BadUrl).with_cause(format!("{}: {}", cause, url))
        };

        let parsed = Url::parse(url.trim()).map_err(|e| bad_url(&e))?;
        if parsed.scheme() != "http" {
            return Err(bad_url(&format!("unsupported scheme '{}'", parsed.scheme())));
        }

        let host = match parsed.host() {
            Some(Host::Domain(domain)) if !domain.is_empty() => domain.to_string(),
            Some(Host::Ipv4(addr)) => addr.to_string(),
            Some(Host::Ipv6(addr)) => addr.to_string(),
            _ => return Err(bad_url(&"missing host")),
        };

        let port = parsed.port_or_known_default().unwrap_or(80);

        let mut resource = parsed.path().to_string();
        if let Some(query) = parsed.query() {
            resource.push('?');
            resource.push_str(query);
        }

        let host_str = parsed.host_str().unwrap_or(&host);
        let host_header = match parsed.port() {
            Some(port) => format!("{}:{}", host_str, port),
            None => host_str.to_string(),
        };

        Ok(Self {
            host,
            port,
            resource,
            host_header,
        })
    }

    /// The raw `GET` request for this target
    pub fn request(&self, user_agent: &str) -> String {
        format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n\r\n",
            self.resource, self.host_header, user_agent
        )
    }
}
