use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tower::{Service, ServiceExt as _};
use tracing::debug;

use super::{Interrupt, Session, State};
use crate::dns::SocketAddrs;
use crate::error::Error;
use crate::handler::Handler;

impl<R, C, H> Session<R, C, H>
where
    R: Service<Box<str>, Response = SocketAddrs, Error = io::Error>,
    C: Service<SocketAddr, Error = io::Error>,
    C::Response: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    /// Resolve the host, then try each candidate address in order until one connects.
    pub(super) async fn establish(&mut self) -> Result<C::Response, Interrupt> {
        let mut addrs = self.resolve().await?;
        let candidates = addrs.len();
        debug!(candidates, "resolved host");

        let mut last_error = None;
        let mut index = 0;

        while let Some(addr) = addrs.pop() {
            self.transition(State::Connecting(index));
            index += 1;

            let connector = &mut self.connector;
            let attempt = self
                .supervisor
                .guard(async move { Ok::<_, Interrupt>(oneshot(connector, addr).await) })
                .await?;

            match attempt {
                Ok(stream) => {
                    debug!(peer.addr = %addr, "connected");
                    return Ok(stream);
                }
                Err(error) => {
                    debug!(peer.addr = %addr, %error, "connection attempt failed");
                    last_error = Some(error);
                }
            }
        }

        let error = last_error.unwrap_or_else(|| {
            io::Error::new(io::ErrorKind::NotConnected, "no candidate addresses")
        });
        Err(Error::Io(error).into())
    }

    async fn resolve(&mut self) -> Result<SocketAddrs, Interrupt> {
        self.transition(State::Resolving);

        let host = self.config.host.clone();
        let lookup = host.clone();
        let resolver = &mut self.resolver;

        let mut addrs = self
            .supervisor
            .guard(async move { Ok::<_, Interrupt>(oneshot(resolver, lookup).await) })
            .await?
            .map_err(|source| Error::Resolve {
                host: host.clone(),
                source,
            })?;

        if addrs.is_empty() {
            return Err(Error::NoAddressFound(host).into());
        }

        addrs.set_port(self.config.port);
        Ok(addrs)
    }
}

/// Wait for the service to be ready, then make one call, without giving up the service.
async fn oneshot<S, Req>(service: &mut S, request: Req) -> Result<S::Response, S::Error>
where
    S: Service<Req>,
{
    service.ready().await?.call(request).await
}
