use std::io;

use thiserror::Error;

use crate::status::StatusLine;

/// Connection error type.
///
/// Every error is terminal: it is reported once through
/// [`Handler::on_error`][crate::Handler::on_error], after which the connection
/// is shut down.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The server host could not be resolved.
    #[error("failed to resolve {host}: {source}")]
    Resolve {
        /// The host which was being resolved.
        host: Box<str>,

        /// The underlying resolver error.
        #[source]
        source: io::Error,
    },

    /// The server host resolved, but to no addresses at all.
    #[error("no address found for {0}")]
    NoAddressFound(Box<str>),

    /// The request could not be built: an invalid mountpoint, header or host.
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] http::Error),

    /// The server answered with a status other than `200`.
    #[error("invalid status: {0}")]
    InvalidStatus(StatusLine),

    /// No I/O progress was observed within the configured timeout.
    #[error("connection timeout")]
    ConnectionTimeout,

    /// The server sent something which could not be framed.
    #[error("malformed response: {0}")]
    Malformed(&'static str),

    /// Error occured with the underlying transport.
    #[error("transport: {0}")]
    Io(#[from] io::Error),
}

/// The kind of an [`Error`], without any attached detail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    /// See [`Error::Resolve`].
    Resolve,
    /// See [`Error::NoAddressFound`].
    NoAddressFound,
    /// See [`Error::InvalidRequest`].
    InvalidRequest,
    /// See [`Error::InvalidStatus`].
    InvalidStatus,
    /// See [`Error::ConnectionTimeout`].
    ConnectionTimeout,
    /// See [`Error::Malformed`].
    Malformed,
    /// See [`Error::Io`].
    Io,
}

impl Error {
    /// The kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Resolve { .. } => ErrorKind::Resolve,
            Error::NoAddressFound(_) => ErrorKind::NoAddressFound,
            Error::InvalidRequest(_) => ErrorKind::InvalidRequest,
            Error::InvalidStatus(_) => ErrorKind::InvalidStatus,
            Error::ConnectionTimeout => ErrorKind::ConnectionTimeout,
            Error::Malformed(_) => ErrorKind::Malformed,
            Error::Io(_) => ErrorKind::Io,
        }
    }

    /// The underlying transport error, if this error came from the transport.
    pub fn io(&self) -> Option<&io::Error> {
        match self {
            Error::Resolve { source, .. } => Some(source),
            Error::Io(error) => Some(error),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {

    use super::*;

    use static_assertions::assert_impl_all;

    assert_impl_all!(Error: std::error::Error, Send, Sync, Into<crate::BoxError>);

    #[test]
    fn kind_matches_variant() {
        let error = Error::from(io::Error::from(io::ErrorKind::ConnectionRefused));
        assert_eq!(error.kind(), ErrorKind::Io);
        assert_eq!(
            error.io().map(io::Error::kind),
            Some(io::ErrorKind::ConnectionRefused)
        );

        assert_eq!(Error::ConnectionTimeout.kind(), ErrorKind::ConnectionTimeout);
        assert!(Error::ConnectionTimeout.io().is_none());
    }

    #[test]
    fn invalid_request() {
        let error = Error::from(http::Error::from(
            http::HeaderValue::from_bytes(b"a\r\nb").unwrap_err(),
        ));
        assert_eq!(error.kind(), ErrorKind::InvalidRequest);
        assert!(error.to_string().starts_with("invalid request"));
    }

    #[test]
    fn display() {
        let error = Error::NoAddressFound("example.com".into());
        assert_eq!(error.to_string(), "no address found for example.com");
    }
}
