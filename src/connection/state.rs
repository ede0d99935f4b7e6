use std::fmt;

/// How the response body is framed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Framing {
    /// Raw bytes until the server closes the connection.
    Plain,

    /// `Transfer-Encoding: chunked` records, ending with a zero-length chunk.
    Chunked,
}

/// The protocol state of a connection.
///
/// States only ever move forward, from [`State::Idle`] to [`State::Closed`].
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    /// Not started yet.
    Idle,

    /// Resolving the server host.
    Resolving,

    /// Connecting to the candidate address at this index.
    Connecting(usize),

    /// Sending the request.
    Writing,

    /// Waiting for the status line.
    ReadingStatus,

    /// Waiting for the header block.
    ReadingHeaders,

    /// Delivering the body.
    Streaming(Framing),

    /// Shut down.
    Closed,
}

impl State {
    /// Whether the handshake is complete and the body is being delivered.
    pub fn is_active(&self) -> bool {
        matches!(self, State::Streaming(_))
    }

    /// Whether the connection has shut down.
    pub fn is_closed(&self) -> bool {
        matches!(self, State::Closed)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Idle => f.write_str("idle"),
            State::Resolving => f.write_str("resolving"),
            State::Connecting(idx) => write!(f, "connecting (candidate {idx})"),
            State::Writing => f.write_str("writing request"),
            State::ReadingStatus => f.write_str("reading status"),
            State::ReadingHeaders => f.write_str("reading headers"),
            State::Streaming(Framing::Plain) => f.write_str("streaming"),
            State::Streaming(Framing::Chunked) => f.write_str("streaming (chunked)"),
            State::Closed => f.write_str("closed"),
        }
    }
}
