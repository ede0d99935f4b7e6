//! Stream connections.
//!
//! A [`Connection`] walks a fixed sequence of steps, each one a single
//! asynchronous operation:
//!
//! 1. Resolve the server host into candidate addresses.
//! 2. Connect to each candidate in turn until one accepts.
//! 3. Write the request.
//! 4. Read the status line. `ICY` responses skip straight to the body.
//! 5. Read the header block.
//! 6. Deliver the body, either raw until the server closes, or chunked.
//!
//! Any failure ends the connection: the handler sees exactly one
//! [`on_error`][crate::Handler::on_error] (or [`on_eof`][crate::Handler::on_eof]
//! for a graceful end), and the transport is shut down.
//!
//! The optional idle timeout is a watchdog over the whole sequence: each completed
//! operation pushes its deadline forward, so slow but live streams never time out.
//!
//! While the body streams, data sent through an [`Uplink`] is written back to the
//! server, for casters which expect the client's position.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderName, HeaderValue};
use tokio::io::{AsyncRead, AsyncReadExt as _, AsyncWrite, AsyncWriteExt as _};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, Instrument as _};

use crate::config::{ConnectionConfig, Credentials, TcpConfig};
use crate::dns::{GaiResolver, SocketAddrs};
use crate::error::Error;
use crate::handler::Handler;
use crate::headers::HeaderMap;
use crate::notify;
use crate::request;
use crate::transport::TcpConnector;
use crate::watchdog::Watchdog;

use self::buffer::ReceiveBuffer;
pub use self::state::{Framing, State};

mod body;
mod buffer;
mod establish;
mod handshake;
mod state;

/// How a connection ended, when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The server ended the stream; [`Handler::on_eof`] was called.
    Eof,

    /// Shutdown was requested through a [`ShutdownHandle`]; no terminal callback was called.
    Shutdown,
}

/// A connection to a single stream, ready to be started.
///
/// Starting a connection consumes it: a connection which has shut down
/// cannot be restarted. Build a new one to reconnect.
#[derive(Debug)]
pub struct Connection<R = GaiResolver, C = TcpConnector> {
    config: ConnectionConfig,
    resolver: R,
    connector: C,
    shutdown: ShutdownHandle,
    signal: notify::Receiver,
    uplink: Uplink,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl Connection {
    /// Create a connection to `host:port` requesting `/`, with default settings.
    pub fn new(host: impl Into<Box<str>>, port: u16) -> Result<Self, Error> {
        Self::builder(host, port).build()
    }

    /// Create a builder for a connection to `host:port`.
    pub fn builder(host: impl Into<Box<str>>, port: u16) -> ConnectionBuilder {
        ConnectionBuilder {
            config: ConnectionConfig::new(host, port),
            resolver: GaiResolver::new(),
            connector: TcpConnector::default(),
            error: None,
        }
    }
}

impl<R, C> Connection<R, C> {
    /// The configuration this connection will use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// A handle which can shut this connection down once it runs.
    ///
    /// Unlike [`ConnectionHandle::shutdown_handle`], this is available before
    /// the connection starts, so it can be moved into the handler.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// A sender for data to write back to the server once the stream is active.
    pub fn uplink(&self) -> Uplink {
        self.uplink.clone()
    }
}

impl<R, C> Connection<R, C>
where
    R: tower::Service<Box<str>, Response = SocketAddrs, Error = io::Error> + Send + 'static,
    R::Future: Send,
    C: tower::Service<SocketAddr, Error = io::Error> + Send + 'static,
    C::Future: Send,
    C::Response: AsyncRead + AsyncWrite + Send + Unpin + 'static,
{
    /// Start the connection on a new task, using the configured idle timeout.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start<H>(self, handler: H) -> ConnectionHandle
    where
        H: Handler + 'static,
    {
        let Connection {
            config,
            resolver,
            connector,
            shutdown,
            signal,
            uplink,
            outbound,
        } = self;

        let (session, state) =
            Session::new(config, resolver, connector, handler, signal, outbound);
        let span = session.span();

        ConnectionHandle {
            shutdown,
            uplink,
            state,
            task: tokio::spawn(session.run().instrument(span)),
        }
    }

    /// Start the connection on a new task, failing it when no progress is made for `timeout`.
    pub fn start_with_timeout<H>(mut self, handler: H, timeout: Duration) -> ConnectionHandle
    where
        H: Handler + 'static,
    {
        self.config.timeout = Some(timeout);
        self.start(handler)
    }

    /// Drive the connection to completion on the current task.
    ///
    /// The returned error, if any, has already been passed to [`Handler::on_error`].
    pub async fn run<H>(self, handler: H) -> Result<Termination, Error>
    where
        H: Handler,
    {
        let Connection {
            config,
            resolver,
            connector,
            signal,
            outbound,
            ..
        } = self;

        let (session, _state) =
            Session::new(config, resolver, connector, handler, signal, outbound);
        let span = session.span();
        session.run().instrument(span).await
    }
}

/// Builder for a [`Connection`].
///
/// Invalid settings are remembered and reported by [`ConnectionBuilder::build`].
#[derive(Debug)]
pub struct ConnectionBuilder<R = GaiResolver, C = TcpConnector> {
    config: ConnectionConfig,
    resolver: R,
    connector: C,
    error: Option<Error>,
}

impl<R, C> ConnectionBuilder<R, C> {
    /// Access the connection configuration.
    pub fn config(&mut self) -> &mut ConnectionConfig {
        &mut self.config
    }

    /// Set the mountpoint to request. A leading `/` is added when missing.
    pub fn mountpoint(mut self, mountpoint: &str) -> Self {
        if let Err(error) = self.config.set_mountpoint(mountpoint) {
            self.fail(error.into());
        }
        self
    }

    /// Send `Authorization: Basic` credentials with the request.
    pub fn credentials(
        mut self,
        login: impl Into<Box<str>>,
        password: impl Into<Box<str>>,
    ) -> Self {
        self.config.credentials = Some(Credentials::new(login, password));
        self
    }

    /// Set the `User-Agent` sent with the request.
    pub fn user_agent<V>(mut self, user_agent: V) -> Self
    where
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        match HeaderValue::try_from(user_agent) {
            Ok(value) => self.config.user_agent = value,
            Err(error) => self.fail(error.into()),
        }
        self
    }

    /// Add a request header.
    pub fn header<K, V>(mut self, key: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        match (HeaderName::try_from(key), HeaderValue::try_from(value)) {
            (Ok(key), Ok(value)) => self.config.headers.push((key, value)),
            (Err(error), _) => self.fail(error.into()),
            (_, Err(error)) => self.fail(error.into()),
        }
        self
    }

    /// Fail the connection when no progress is made for `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = Some(timeout);
        self
    }

    /// Longest status line or chunk size line to accept.
    pub fn max_line_length(mut self, max: usize) -> Self {
        self.config.max_line_length = max;
        self
    }

    /// Largest header block to accept.
    pub fn max_header_size(mut self, max: usize) -> Self {
        self.config.max_header_size = max;
        self
    }

    /// Set the resolver used to find candidate addresses.
    pub fn with_resolver<R2>(self, resolver: R2) -> ConnectionBuilder<R2, C> {
        ConnectionBuilder {
            config: self.config,
            resolver,
            connector: self.connector,
            error: self.error,
        }
    }

    /// Set the connector used to open a stream to each candidate address.
    pub fn with_connector<C2>(self, connector: C2) -> ConnectionBuilder<R, C2> {
        ConnectionBuilder {
            config: self.config,
            resolver: self.resolver,
            connector,
            error: self.error,
        }
    }

    /// Build the connection.
    ///
    /// Fails with [`Error::InvalidRequest`] for the first invalid setting, or
    /// when the host cannot be sent as a `Host` header.
    pub fn build(self) -> Result<Connection<R, C>, Error> {
        if let Some(error) = self.error {
            return Err(error);
        }
        request::encode(&self.config).map_err(http::Error::from)?;

        let (shutdown, signal) = notify::channel();
        let (tx, outbound) = mpsc::unbounded_channel();

        Ok(Connection {
            config: self.config,
            resolver: self.resolver,
            connector: self.connector,
            shutdown: ShutdownHandle { tx: shutdown },
            signal,
            uplink: Uplink { tx },
            outbound,
        })
    }

    fn fail(&mut self, error: http::Error) {
        if self.error.is_none() {
            self.error = Some(Error::InvalidRequest(error));
        }
    }
}

impl<R> ConnectionBuilder<R, TcpConnector> {
    /// Configure the TCP sockets opened by the default connector.
    pub fn tcp_config(mut self, config: TcpConfig) -> Self {
        self.connector = TcpConnector::new(config);
        self
    }
}

/// Requests shutdown of a running connection.
///
/// Can be cloned and moved into the connection's own callbacks. Shutting
/// down more than once has no further effect.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: notify::Sender,
}

impl ShutdownHandle {
    /// Request shutdown. The pending operation is abandoned and no further
    /// callbacks are made, including the terminal `on_eof` or `on_error`.
    pub fn shutdown(&self) {
        self.tx.send()
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.tx.is_sent()
    }
}

/// Writes data back to the server over a running connection.
///
/// NTRIP casters use this to receive the client's position as NMEA `GGA`
/// sentences. Data is written in order once the body is streaming; anything
/// sent earlier waits until then. A failed write ends the connection through
/// [`Handler::on_error`].
#[derive(Debug, Clone)]
pub struct Uplink {
    tx: mpsc::UnboundedSender<Bytes>,
}

impl Uplink {
    /// Queue `data` to be written to the server.
    ///
    /// Fails with a `NotConnected` I/O error once the connection has ended.
    pub fn send(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        self.tx.send(data.into()).map_err(|_| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection has ended",
            ))
        })
    }
}

/// Handle to a connection running on its own task.
///
/// Dropping the handle does not stop the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    shutdown: ShutdownHandle,
    uplink: Uplink,
    state: watch::Receiver<State>,
    task: JoinHandle<Result<Termination, Error>>,
}

impl ConnectionHandle {
    /// Request shutdown of the connection. See [`ShutdownHandle::shutdown`].
    pub fn shutdown(&self) {
        self.shutdown.shutdown()
    }

    /// A cloneable handle which can request shutdown.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Queue `data` to be written to the server. See [`Uplink::send`].
    pub fn send(&self, data: impl Into<Bytes>) -> Result<(), Error> {
        self.uplink.send(data)
    }

    /// A cloneable sender for data to write to the server.
    pub fn uplink(&self) -> Uplink {
        self.uplink.clone()
    }

    /// The current protocol state.
    pub fn state(&self) -> State {
        *self.state.borrow()
    }

    /// Whether the body is being delivered.
    pub fn is_active(&self) -> bool {
        self.state().is_active()
    }

    /// Wait for the connection to end.
    pub async fn join(self) -> Result<Termination, Error> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(join_err) => Err(Error::Io(io::Error::other(join_err))),
        }
    }
}

/// Why the sequence of operations stopped early.
#[derive(Debug)]
pub(crate) enum Interrupt {
    /// The server closed the connection.
    Closed,

    /// Shutdown was requested; the pending operation was abandoned.
    Cancelled,

    /// The connection failed.
    Error(Error),
}

impl From<Error> for Interrupt {
    fn from(error: Error) -> Self {
        Interrupt::Error(error)
    }
}

impl From<io::Error> for Interrupt {
    fn from(error: io::Error) -> Self {
        Interrupt::Error(Error::Io(error))
    }
}

/// Runs each operation against the idle timeout and the shutdown signal.
#[derive(Debug)]
struct Supervisor {
    watchdog: Watchdog,
    shutdown: notify::Receiver,
}

impl Supervisor {
    /// Run one operation, then record the progress.
    ///
    /// A requested shutdown wins over a completed operation, which wins over
    /// an expired deadline.
    async fn guard<F, T>(&mut self, operation: F) -> Result<T, Interrupt>
    where
        F: Future<Output = Result<T, Interrupt>>,
    {
        let outcome = tokio::select! {
            biased;
            _ = self.shutdown.recv() => return Err(Interrupt::Cancelled),
            outcome = operation => outcome,
            _ = self.watchdog.expired() => {
                info!("connection timeout detected, shutting it down");
                return Err(Error::ConnectionTimeout.into());
            }
        };

        self.watchdog.reset();
        outcome
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.is_sent()
    }
}

/// What a wait on the transport produced.
enum Wake {
    Read(usize),
    Upstream(Bytes),
}

/// The running state of one connection.
struct Session<R, C, H>
where
    C: tower::Service<SocketAddr>,
{
    config: ConnectionConfig,
    resolver: R,
    connector: C,
    handler: H,
    supervisor: Supervisor,
    state: watch::Sender<State>,
    stream: Option<C::Response>,
    buffer: ReceiveBuffer,
    headers: HeaderMap,
    outbound: mpsc::UnboundedReceiver<Bytes>,
}

impl<R, C, H> Session<R, C, H>
where
    R: tower::Service<Box<str>, Response = SocketAddrs, Error = io::Error>,
    C: tower::Service<SocketAddr, Error = io::Error>,
    C::Response: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    fn new(
        config: ConnectionConfig,
        resolver: R,
        connector: C,
        handler: H,
        shutdown: notify::Receiver,
        outbound: mpsc::UnboundedReceiver<Bytes>,
    ) -> (Self, watch::Receiver<State>) {
        let (state, rx) = watch::channel(State::Idle);

        let session = Session {
            buffer: ReceiveBuffer::new(config.buffer_capacity),
            supervisor: Supervisor {
                watchdog: Watchdog::new(config.idle_timeout()),
                shutdown,
            },
            config,
            resolver,
            connector,
            handler,
            state,
            stream: None,
            headers: HeaderMap::new(),
            outbound,
        };

        (session, rx)
    }

    fn span(&self) -> tracing::Span {
        tracing::debug_span!(
            "icy",
            host = %self.config.host,
            port = self.config.port,
            uri = %self.config.uri
        )
    }

    fn state(&self) -> State {
        *self.state.borrow()
    }

    fn transition(&mut self, state: State) {
        self.state.send_if_modified(|current| {
            if current.is_closed() || *current == state {
                return false;
            }
            trace!(from = %current, to = %state, "state transition");
            *current = state;
            true
        });
    }

    async fn run(mut self) -> Result<Termination, Error> {
        if self.supervisor.watchdog.is_enabled() {
            trace!(timeout = ?self.config.idle_timeout(), "idle timeout armed");
        }

        let outcome = match self.drive().await {
            Err(Interrupt::Cancelled) => None,
            // Shutdown requested from a callback, before the failing operation.
            _ if self.supervisor.is_shutdown() => None,
            Ok(()) => Some(Ok(Termination::Eof)),
            Err(Interrupt::Closed) if self.state().is_active() => {
                Some(Ok(Termination::Eof))
            }
            Err(Interrupt::Closed) => Some(Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by server before the stream started",
            )))),
            Err(Interrupt::Error(error)) => Some(Err(error)),
        };

        let Some(outcome) = outcome else {
            debug!("shutdown requested");
            self.shutdown().await;
            return Ok(Termination::Shutdown);
        };

        match &outcome {
            Ok(_) => {
                debug!("stream ended");
                self.handler.on_eof();
            }
            Err(error) => {
                debug!(%error, "connection failed");
                self.handler.on_error(error);
            }
        }

        self.shutdown().await;
        outcome
    }

    async fn drive(&mut self) -> Result<(), Interrupt> {
        let stream = self.establish().await?;
        self.stream = Some(stream);

        self.write_request().await?;
        let status = self.read_status().await?;

        if !status.skips_headers() {
            self.read_headers().await?;
            self.notify_headers()?;
        }

        if self.headers.is_chunked() {
            self.transition(State::Streaming(Framing::Chunked));
            self.stream_chunked().await
        } else {
            self.transition(State::Streaming(Framing::Plain));
            self.stream_plain().await
        }
    }

    /// Read once from the transport into the receive buffer.
    ///
    /// While streaming, uplink data that arrives during the wait is written
    /// to the server first.
    async fn fill(&mut self) -> Result<usize, Interrupt> {
        loop {
            let streaming = self.state().is_active();
            let stream = self.stream.as_mut().ok_or(Interrupt::Closed)?;
            let buffer = self.buffer.spare();
            let outbound = &mut self.outbound;

            let wake = self
                .supervisor
                .guard(async move {
                    tokio::select! {
                        biased;
                        read = stream.read_buf(buffer) => {
                            read.map(Wake::Read).map_err(Interrupt::from)
                        }
                        Some(data) = outbound.recv(), if streaming => Ok(Wake::Upstream(data)),
                    }
                })
                .await?;

            match wake {
                Wake::Read(0) => {
                    trace!("connection closed by server");
                    return Err(Interrupt::Closed);
                }
                Wake::Read(n) => return Ok(n),
                Wake::Upstream(data) => self.write_upstream(data).await?,
            }
        }
    }

    async fn write_upstream(&mut self, data: Bytes) -> Result<(), Interrupt> {
        trace!(bytes = data.len(), "writing uplink data");
        let stream = self.stream.as_mut().ok_or(Interrupt::Closed)?;

        self.supervisor
            .guard(async move {
                stream.write_all(&data).await?;
                stream.flush().await?;
                Ok::<_, Interrupt>(())
            })
            .await
    }

    /// Read until the buffer holds a full line, returning its length.
    async fn fill_line(&mut self) -> Result<usize, Interrupt> {
        let mut from = 0;
        loop {
            let found = self.buffer.find_line(from);
            let length = found.unwrap_or(self.buffer.len());
            if length > self.config.max_line_length {
                return Err(Error::Malformed("line too long").into());
            }
            if let Some(end) = found {
                return Ok(end);
            }

            from = self.buffer.len().saturating_sub(1);
            self.fill().await?;
        }
    }

    fn notify_headers(&mut self) -> Result<(), Interrupt> {
        if self.supervisor.is_shutdown() {
            return Err(Interrupt::Cancelled);
        }
        self.handler.on_headers(&self.headers);
        Ok(())
    }

    /// Hand the first `n` buffered bytes to the handler, and consume them.
    fn deliver(&mut self, n: usize) -> Result<(), Interrupt> {
        if self.supervisor.is_shutdown() {
            return Err(Interrupt::Cancelled);
        }
        self.handler.on_data(&self.buffer[..n]);
        self.buffer.consume(n);
        Ok(())
    }

    /// Tear down the transport. Safe to call more than once.
    async fn shutdown(&mut self) {
        self.transition(State::Closed);
        self.outbound.close();

        let Some(mut stream) = self.stream.take() else {
            return;
        };

        if let Err(error) = stream.shutdown().await {
            trace!(%error, "error shutting down transport");
        }
        drop(stream);
        trace!("transport closed");
    }
}
