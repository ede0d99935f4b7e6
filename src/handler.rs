//! Consumer callbacks for a stream connection.
//!
//! A connection reports what it receives through a [`Handler`]. Every method has
//! an empty default, so implementors only write the ones they care about.
//!
//! The order of calls is fixed:
//!
//! 1. `on_headers`, at most once, after an HTTP-style header block was parsed.
//!    `ICY` responses have no header block and never call it.
//! 2. `on_data`, any number of times, with consecutive fragments of the body.
//! 3. Exactly one of `on_eof` or `on_error`, unless the connection was shut down
//!    through its handle. Nothing is called afterwards.

use std::fmt;

use crate::error::Error;
use crate::headers::HeaderMap;
use crate::DebugLiteral;

/// Receives the events of a stream connection.
pub trait Handler: Send {
    /// The response header block was parsed.
    fn on_headers(&mut self, headers: &HeaderMap) {
        let _ = headers;
    }

    /// A fragment of the body arrived.
    ///
    /// Fragments do not line up with chunk boundaries: consumers should treat
    /// the sequence of fragments as one continuous stream.
    fn on_data(&mut self, data: &[u8]) {
        let _ = data;
    }

    /// The server ended the stream.
    fn on_eof(&mut self) {}

    /// The connection failed.
    fn on_error(&mut self, error: &Error) {
        let _ = error;
    }
}

impl<H> Handler for &mut H
where
    H: Handler + ?Sized,
{
    fn on_headers(&mut self, headers: &HeaderMap) {
        (**self).on_headers(headers)
    }

    fn on_data(&mut self, data: &[u8]) {
        (**self).on_data(data)
    }

    fn on_eof(&mut self) {
        (**self).on_eof()
    }

    fn on_error(&mut self, error: &Error) {
        (**self).on_error(error)
    }
}

impl<H> Handler for Box<H>
where
    H: Handler + ?Sized,
{
    fn on_headers(&mut self, headers: &HeaderMap) {
        (**self).on_headers(headers)
    }

    fn on_data(&mut self, data: &[u8]) {
        (**self).on_data(data)
    }

    fn on_eof(&mut self) {
        (**self).on_eof()
    }

    fn on_error(&mut self, error: &Error) {
        (**self).on_error(error)
    }
}

type HeadersFn = Box<dyn FnMut(&HeaderMap) + Send>;
type DataFn = Box<dyn FnMut(&[u8]) + Send>;
type EofFn = Box<dyn FnMut() + Send>;
type ErrorFn = Box<dyn FnMut(&Error) + Send>;

/// A [`Handler`] built from optional closures.
///
/// The builder methods share their names with the [`Handler`] methods; to
/// deliver an event to a `Callbacks` directly, call through the trait, e.g.
/// `Handler::on_data(&mut callbacks, bytes)`.
///
/// ```
/// use icystream::Callbacks;
///
/// let callbacks = Callbacks::new()
///     .on_data(|bytes| println!("received {} bytes", bytes.len()))
///     .on_error(|error| eprintln!("stream failed: {error}"));
/// ```
#[derive(Default)]
pub struct Callbacks {
    headers: Option<HeadersFn>,
    data: Option<DataFn>,
    eof: Option<EofFn>,
    error: Option<ErrorFn>,
}

impl Callbacks {
    /// Create a set of callbacks which ignores every event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the callback run when the header block was parsed.
    pub fn on_headers<F>(mut self, f: F) -> Self
    where
        F: FnMut(&HeaderMap) + Send + 'static,
    {
        self.headers = Some(Box::new(f));
        self
    }

    /// Set the callback run for each body fragment.
    pub fn on_data<F>(mut self, f: F) -> Self
    where
        F: FnMut(&[u8]) + Send + 'static,
    {
        self.data = Some(Box::new(f));
        self
    }

    /// Set the callback run when the server ends the stream.
    pub fn on_eof<F>(mut self, f: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        self.eof = Some(Box::new(f));
        self
    }

    /// Set the callback run when the connection fails.
    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: FnMut(&Error) + Send + 'static,
    {
        self.error = Some(Box::new(f));
        self
    }
}

impl fmt::Debug for Callbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn slot<T>(slot: &Option<T>) -> DebugLiteral<&'static str> {
            DebugLiteral(if slot.is_some() { "Some(..)" } else { "None" })
        }

        f.debug_struct("Callbacks")
            .field("headers", &slot(&self.headers))
            .field("data", &slot(&self.data))
            .field("eof", &slot(&self.eof))
            .field("error", &slot(&self.error))
            .finish()
    }
}

impl Handler for Callbacks {
    fn on_headers(&mut self, headers: &HeaderMap) {
        if let Some(f) = self.headers.as_mut() {
            f(headers)
        }
    }

    fn on_data(&mut self, data: &[u8]) {
        if let Some(f) = self.data.as_mut() {
            f(data)
        }
    }

    fn on_eof(&mut self) {
        if let Some(f) = self.eof.as_mut() {
            f()
        }
    }

    fn on_error(&mut self, error: &Error) {
        if let Some(f) = self.error.as_mut() {
            f(error)
        }
    }
}
