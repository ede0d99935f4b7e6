//! Response status line.
//!
//! Servers in this family answer with one of two status line flavours:
//!
//! - `ICY 200 OK`, the SHOUTcast / NTRIP 1.0 form, which is followed directly by
//!   the stream body with no header block.
//! - `HTTP/1.0 200 OK` or `HTTP/1.1 200 OK`, followed by a header block.

use std::fmt;

/// Protocol token of the status line which is not followed by headers.
pub const ICY_PROTOCOL: &str = "ICY";

/// A parsed status line: `<PROTO> <CODE> <MESSAGE>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    protocol: Box<str>,
    code: Option<u16>,
    message: Box<str>,
}

impl StatusLine {
    /// Parse a status line.
    ///
    /// The line may still carry its `\r\n` terminator. Parsing never fails:
    /// a missing or non-numeric code is kept as `None` and is treated as an
    /// invalid status by [`StatusLine::is_ok`].
    pub fn parse(line: &[u8]) -> Self {
        let line = String::from_utf8_lossy(line);
        let line = line.trim_end_matches(['\r', '\n']).trim_start();

        let (protocol, rest) = split_token(line);
        let (code, message) = split_token(rest);

        Self {
            protocol: protocol.into(),
            code: code.parse().ok(),
            message: message.into(),
        }
    }

    /// The protocol token, e.g. `ICY` or `HTTP/1.1`.
    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    /// The numeric status code, if one could be parsed.
    pub fn code(&self) -> Option<u16> {
        self.code
    }

    /// The status code as an [`http::StatusCode`], if it is a valid one.
    pub fn status(&self) -> Option<http::StatusCode> {
        self.code.and_then(|code| http::StatusCode::from_u16(code).ok())
    }

    /// The reason phrase following the code.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether the server accepted the request. Only `200` is accepted.
    pub fn is_ok(&self) -> bool {
        self.code == Some(200)
    }

    /// Whether this status line is followed directly by the body, without a header block.
    pub fn skips_headers(&self) -> bool {
        &*self.protocol == ICY_PROTOCOL
    }
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ", self.protocol)?;
        match self.code {
            Some(code) => write!(f, "{code}")?,
            None => write!(f, "???")?,
        }
        if !self.message.is_empty() {
            write!(f, " {}", self.message)?;
        }
        Ok(())
    }
}

fn split_token(input: &str) -> (&str, &str) {
    match input.find([' ', '\t']) {
        Some(idx) => (&input[..idx], input[idx..].trim_start()),
        None => (input, ""),
    }
}
