//! Icystream
//!
//! An async client for ICY-style media streams: SHOUTcast / Icecast radio servers
//! and NTRIP casters which answer an HTTP-like request with either `ICY 200 OK`
//! or a regular `HTTP/1.x 200 OK` response, and then stream a body until the
//! remote end closes (or, with `Transfer-Encoding: chunked`, until the last chunk).
//!
//! ```no_run
//! use icystream::{Callbacks, Connection};
//! # async fn run() -> Result<(), icystream::BoxError> {
//! let connection = Connection::builder("caster.example.com", 2101)
//!     .mountpoint("RTCM3")
//!     .credentials("user", "secret")
//!     .header("Ntrip-Version", "Ntrip/2.0")
//!     .build()?;
//!
//! let handle = connection.start_with_timeout(
//!     Callbacks::new().on_data(|bytes| println!("{} bytes", bytes.len())),
//!     std::time::Duration::from_secs(10),
//! );
//!
//! // Report our position to the caster once the stream is running.
//! handle.send("$GPGGA,...\r\n")?;
//! handle.join().await?;
//! # Ok(())
//! # }
//! ```

#![cfg_attr(docsrs, feature(doc_auto_cfg))]

use std::fmt;

pub mod chunk;
pub mod config;
pub mod connection;
pub mod dns;
mod error;
pub mod handler;
pub mod headers;
mod notify;
pub mod request;
pub mod status;
pub mod transport;
mod watchdog;

pub use config::{ConnectionConfig, Credentials, TcpConfig};
pub use connection::{
    Connection, ConnectionBuilder, ConnectionHandle, ShutdownHandle, State, Termination, Uplink,
};
pub use error::{Error, ErrorKind};
pub use handler::{Callbacks, Handler};
pub use headers::HeaderMap;
pub use status::StatusLine;

/// A boxed error, used where the concrete error type is not interesting.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub(crate) type BoxFuture<'a, T> =
    std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send + 'a>>;

/// Formats a value with `Display` inside a `Debug` implementation.
pub(crate) struct DebugLiteral<T: fmt::Display>(pub(crate) T);

impl<T: fmt::Display> fmt::Debug for DebugLiteral<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
