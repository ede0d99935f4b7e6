use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt as _};
use tower::Service;
use tracing::{debug, trace, warn};

use super::{Interrupt, Session, State};
use crate::dns::SocketAddrs;
use crate::error::Error;
use crate::handler::Handler;
use crate::request;
use crate::status::StatusLine;

impl<R, C, H> Session<R, C, H>
where
    R: Service<Box<str>, Response = SocketAddrs, Error = io::Error>,
    C: Service<SocketAddr, Error = io::Error>,
    C::Response: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    pub(super) async fn write_request(&mut self) -> Result<(), Interrupt> {
        self.transition(State::Writing);

        let request = request::encode(&self.config)
            .map_err(|error| Error::InvalidRequest(error.into()))?;
        trace!(bytes = request.len(), "sending request");

        let stream = self.stream.as_mut().ok_or(Interrupt::Closed)?;
        self.supervisor
            .guard(async move {
                stream.write_all(&request).await?;
                stream.flush().await?;
                Ok::<_, Interrupt>(())
            })
            .await
    }

    /// Read and check the status line. Only `200` lets the connection continue.
    pub(super) async fn read_status(&mut self) -> Result<StatusLine, Interrupt> {
        self.transition(State::ReadingStatus);

        let end = self.fill_line().await?;
        let status = StatusLine::parse(&self.buffer[..end]);
        self.buffer.consume(end);

        if !status.is_ok() {
            warn!(%status, "server refused the stream");
            return Err(Error::InvalidStatus(status).into());
        }

        debug!(%status, "received status");
        Ok(status)
    }

    pub(super) async fn read_headers(&mut self) -> Result<(), Interrupt> {
        self.transition(State::ReadingHeaders);

        let mut from = 0;
        let end = loop {
            let found = self.buffer.find_header_end(from);
            if found.unwrap_or(self.buffer.len()) > self.config.max_header_size {
                return Err(Error::Malformed("header block too long").into());
            }
            if let Some(end) = found {
                break end;
            }

            from = self.buffer.len().saturating_sub(3);
            self.fill().await?;
        };

        self.headers.extend_from_block(&self.buffer[..end]);
        self.buffer.consume(end);

        debug!(
            headers = self.headers.len(),
            chunked = self.headers.is_chunked(),
            "received headers"
        );
        Ok(())
    }
}
