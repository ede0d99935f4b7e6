//! Connection configuration.
//!
//! Normally, you will not need to build these types directly. Instead, use
//! [`Connection::builder`][crate::Connection::builder], which fills in a
//! [`ConnectionConfig`] and a [`TcpConfig`] as it goes.

use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use base64::prelude::BASE64_STANDARD;
use base64::Engine as _;
use http::uri::{InvalidUri, PathAndQuery};
use http::{HeaderName, HeaderValue};

/// Default `User-Agent` sent with each request.
pub const DEFAULT_USER_AGENT: &str = concat!("NTRIP icystream/", env!("CARGO_PKG_VERSION"));

/// Login and password sent with `Authorization: Basic`.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    login: Box<str>,
    password: Box<str>,
}

impl Credentials {
    /// Create a new set of credentials.
    pub fn new(login: impl Into<Box<str>>, password: impl Into<Box<str>>) -> Self {
        Self {
            login: login.into(),
            password: password.into(),
        }
    }

    /// The login name.
    pub fn login(&self) -> &str {
        &self.login
    }

    /// The value of the `Authorization` header for these credentials.
    pub fn header_value(&self) -> String {
        let creds = BASE64_STANDARD.encode(format!("{}:{}", self.login, self.password));
        format!("Basic {creds}")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("login", &self.login)
            .field("password", &crate::DebugLiteral("<redacted>"))
            .finish()
    }
}

/// Configuration for a single stream connection.
///
/// Everything written to the request is held as a validated `http` type, so a
/// configuration can never inject extra request lines. Only `host` is checked
/// late, when the request is encoded.
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Server host name or address.
    pub host: Box<str>,

    /// Server port.
    pub port: u16,

    /// Request target, always starting with `/`.
    pub uri: PathAndQuery,

    /// Credentials to send with the request.
    pub credentials: Option<Credentials>,

    /// The `User-Agent` header value.
    pub user_agent: HeaderValue,

    /// Additional request headers, sent in order.
    pub headers: Vec<(HeaderName, HeaderValue)>,

    /// Idle timeout: the connection fails when no I/O progress is made for this long.
    ///
    /// `None` or a zero duration disables the timeout.
    pub timeout: Option<Duration>,

    /// Longest status line or chunk size line accepted, including its terminator.
    pub max_line_length: usize,

    /// Largest header block accepted, including its terminating blank line.
    pub max_header_size: usize,

    /// Initial capacity of the receive buffer.
    pub buffer_capacity: usize,
}

impl ConnectionConfig {
    /// Create a configuration for `host:port`, requesting `/`.
    pub fn new(host: impl Into<Box<str>>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            uri: PathAndQuery::from_static("/"),
            credentials: None,
            user_agent: HeaderValue::from_static(DEFAULT_USER_AGENT),
            headers: Vec::new(),
            timeout: None,
            max_line_length: 8 * 1024,
            max_header_size: 64 * 1024,
            buffer_capacity: 1024,
        }
    }

    /// Set the request target from a mountpoint, which may omit the leading `/`.
    pub fn set_mountpoint(&mut self, mountpoint: &str) -> Result<(), InvalidUri> {
        self.uri = normalize_mountpoint(mountpoint)?;
        Ok(())
    }

    /// The idle timeout, if it is enabled.
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.timeout.filter(|timeout| !timeout.is_zero())
    }
}

/// Turn a mountpoint into a request target starting with `/`.
///
/// Fails for anything which is not a valid path and query, including spaces
/// and line breaks.
pub fn normalize_mountpoint(mountpoint: &str) -> Result<PathAndQuery, InvalidUri> {
    if mountpoint.starts_with('/') {
        PathAndQuery::try_from(mountpoint)
    } else {
        PathAndQuery::try_from(format!("/{mountpoint}"))
    }
}

/// Configuration for TCP connections.
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// The timeout for a single connection attempt.
    ///
    /// A candidate address which does not connect in time is skipped.
    pub connect_timeout: Option<Duration>,

    /// The TCP keep-alive idle time.
    pub keep_alive_timeout: Option<Duration>,

    /// The local IPv4 address to bind to.
    pub local_address_ipv4: Option<Ipv4Addr>,

    /// The local IPv6 address to bind to.
    pub local_address_ipv6: Option<Ipv6Addr>,

    /// Whether to disable Nagle's algorithm.
    pub nodelay: bool,

    /// Whether to reuse the local address.
    pub reuse_address: bool,

    /// The size of the send buffer.
    pub send_buffer_size: Option<usize>,

    /// The size of the receive buffer.
    pub recv_buffer_size: Option<usize>,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: None,
            keep_alive_timeout: Some(Duration::from_secs(90)),
            local_address_ipv4: None,
            local_address_ipv6: None,
            nodelay: true,
            reuse_address: true,
            send_buffer_size: None,
            recv_buffer_size: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mountpoint() {
        assert_eq!(normalize_mountpoint("RTCM3").unwrap(), "/RTCM3");
        assert_eq!(normalize_mountpoint("/stream.mp3").unwrap(), "/stream.mp3");
        assert_eq!(normalize_mountpoint("").unwrap(), "/");

        let mut config = ConnectionConfig::new("example.com", 2101);
        assert_eq!(config.uri, "/");
        config.set_mountpoint("MOUNT").unwrap();
        assert_eq!(config.uri, "/MOUNT");
    }

    #[test]
    fn mountpoint_rejects_line_breaks() {
        assert!(normalize_mountpoint("a b").is_err());
        assert!(normalize_mountpoint("MOUNT\r\nX-Evil: 1").is_err());

        let mut config = ConnectionConfig::new("example.com", 2101);
        assert!(config.set_mountpoint("bad\nmount").is_err());
        assert_eq!(config.uri, "/");
    }

    #[test]
    fn zero_timeout_is_disabled() {
        let mut config = ConnectionConfig::new("example.com", 80);
        assert_eq!(config.idle_timeout(), None);

        config.timeout = Some(Duration::ZERO);
        assert_eq!(config.idle_timeout(), None);

        config.timeout = Some(Duration::from_secs(5));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn credentials() {
        let creds = Credentials::new("martin", "secret");
        assert_eq!(creds.header_value(), "Basic bWFydGluOnNlY3JldA==");
        assert_eq!(creds.login(), "martin");

        let debug = format!("{creds:?}");
        assert!(debug.contains("martin"));
        assert!(!debug.contains("secret"));
    }
}
