use std::io;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncWrite};
use tower::Service;
use tracing::{debug, trace};

use super::{Interrupt, Session};
use crate::chunk::{parse_chunk_length, CHUNK_TRAILER};
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
    /// Deliver everything received until the server closes the connection.
    pub(super) async fn stream_plain(&mut self) -> Result<(), Interrupt> {
        loop {
            let n = self.buffer.len();
            if n > 0 {
                self.deliver(n)?;
            }
            self.fill().await?;
        }
    }

    /// Deliver chunk data until the zero-length chunk.
    ///
    /// Data is handed over as it arrives, so one chunk may be split across
    /// several `on_data` calls.
    pub(super) async fn stream_chunked(&mut self) -> Result<(), Interrupt> {
        loop {
            let line = self.fill_line().await?;
            let (consumed, length) =
                parse_chunk_length(&self.buffer[..line]).map_err(|error| {
                    debug!(%error, "rejecting chunk size line");
                    Error::Malformed("invalid chunk size line")
                })?;
            self.buffer.consume(consumed);

            if length == 0 {
                trace!("last chunk");
                return Ok(());
            }
            trace!(length, "chunk");

            let mut remaining = length;
            loop {
                let n = remaining.min(self.buffer.len());
                if n > 0 {
                    self.deliver(n)?;
                    remaining -= n;
                }
                if remaining == 0 {
                    break;
                }
                self.fill().await?;
            }

            while self.buffer.len() < CHUNK_TRAILER {
                self.fill().await?;
            }
            if !self.buffer.starts_with(b"\r\n") {
                debug!("chunk data not followed by CRLF");
            }
            self.buffer.consume(CHUNK_TRAILER);
        }
    }
}
