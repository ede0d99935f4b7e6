//! TCP transport for stream connections.
//!
//! This module contains the [`TcpConnector`] type, which is a [`tower::Service`] that
//! connects to a single resolved address using TCP, applying a [`TcpConfig`] to the
//! socket first. Walking the list of candidate addresses is the connection's job;
//! the connector only ever sees one address at a time.

use std::future::Future;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::net::{TcpSocket, TcpStream};
use tracing::{trace, warn, Instrument as _};

use crate::config::TcpConfig;
use crate::BoxFuture;

/// A TCP connector for stream connections.
///
/// # Example
/// ```no_run
/// # use icystream::transport::TcpConnector;
/// # use tower::ServiceExt as _;
/// # async fn run() {
/// let connector = TcpConnector::default();
/// let stream = connector.oneshot("127.0.0.1:8000".parse().unwrap()).await.unwrap();
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct TcpConnector {
    config: Arc<TcpConfig>,
}

impl TcpConnector {
    /// Create a new `TcpConnector` with the given configuration.
    pub fn new(config: TcpConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    /// Get the configuration for the TCP connector.
    pub fn config(&self) -> &TcpConfig {
        &self.config
    }
}

impl tower::Service<SocketAddr> for TcpConnector {
    type Response = TcpStream;
    type Error = io::Error;
    type Future = BoxFuture<'static, Result<TcpStream, io::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, address: SocketAddr) -> Self::Future {
        let config = self.config.clone();
        let span = tracing::trace_span!("connect", %address);

        Box::pin(
            async move {
                let stream = connect(&address, &config)?.await?;
                if config.nodelay {
                    if let Err(e) = stream.set_nodelay(true) {
                        warn!("tcp set_nodelay error: {}", e);
                    }
                }
                trace!(peer.addr = %address, "tcp connected");
                Ok(stream)
            }
            .instrument(span),
        )
    }
}

fn bind_local_address(
    socket: &socket2::Socket,
    dst_addr: &SocketAddr,
    local_addr_ipv4: &Option<Ipv4Addr>,
    local_addr_ipv6: &Option<Ipv6Addr>,
) -> io::Result<()> {
    match (*dst_addr, local_addr_ipv4, local_addr_ipv6) {
        (SocketAddr::V4(_), Some(addr), _) => {
            socket.bind(&SocketAddr::new((*addr).into(), 0).into())?;
        }
        (SocketAddr::V6(_), _, Some(addr)) => {
            socket.bind(&SocketAddr::new((*addr).into(), 0).into())?;
        }
        _ => {}
    }

    Ok(())
}

fn connect(
    addr: &SocketAddr,
    config: &TcpConfig,
) -> io::Result<impl Future<Output = io::Result<TcpStream>>> {
    use socket2::{Domain, Protocol, Socket, TcpKeepalive, Type};

    let domain = Domain::for_address(*addr);
    let socket = Socket::new(domain, Type::STREAM, Some(Protocol::TCP))?;

    // Tokio requires O_NONBLOCK on sockets it adopts.
    socket.set_nonblocking(true)?;

    if let Some(dur) = config.keep_alive_timeout {
        let conf = TcpKeepalive::new().with_time(dur);
        if let Err(e) = socket.set_tcp_keepalive(&conf) {
            warn!("tcp set_keepalive error: {}", e);
        }
    }

    bind_local_address(
        &socket,
        addr,
        &config.local_address_ipv4,
        &config.local_address_ipv6,
    )?;

    let socket = TcpSocket::from_std_stream(std::net::TcpStream::from(socket));

    if config.reuse_address {
        if let Err(e) = socket.set_reuseaddr(true) {
            warn!("tcp set_reuse_address error: {}", e);
        }
    }

    if let Some(size) = config.send_buffer_size {
        if let Err(e) = socket.set_send_buffer_size(size.try_into().unwrap_or(u32::MAX)) {
            warn!("tcp set_buffer_size error: {}", e);
        }
    }

    if let Some(size) = config.recv_buffer_size {
        if let Err(e) = socket.set_recv_buffer_size(size.try_into().unwrap_or(u32::MAX)) {
            warn!("tcp set_recv_buffer_size error: {}", e);
        }
    }

    let connect = socket.connect(*addr);
    let connect_timeout: Option<Duration> = config.connect_timeout;
    Ok(async move {
        match connect_timeout {
            Some(dur) => match tokio::time::timeout(dur, connect).await {
                Ok(result) => result,
                Err(e) => Err(io::Error::new(io::ErrorKind::TimedOut, e)),
            },
            None => connect.await,
        }
    })
}
