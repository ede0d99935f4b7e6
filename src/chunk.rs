//! Chunk size lines of `Transfer-Encoding: chunked` bodies.
//!
//! Each chunk is framed as `<hex-length>[;extensions]\r\n<data>\r\n`, and the
//! body ends with a chunk of length zero.

use thiserror::Error;

/// Number of bytes in the CRLF which follows each chunk's data.
pub const CHUNK_TRAILER: usize = 2;

/// Error returned for a chunk size line which cannot be parsed.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ChunkError {
    /// The buffer does not yet hold a complete `\n`-terminated line.
    #[error("incomplete chunk size line")]
    Incomplete,

    /// The line does not start with a hexadecimal length.
    #[error("invalid chunk size")]
    InvalidSize,

    /// The length does not fit in a `usize`.
    #[error("chunk size overflow")]
    Overflow,
}

/// Parse the chunk size line at the start of `buf`.
///
/// Returns the number of bytes making up the line, including its terminator,
/// and the chunk length it declares. Chunk extensions after `;` and whitespace
/// around the length are ignored.
pub fn parse_chunk_length(buf: &[u8]) -> Result<(usize, usize), ChunkError> {
    let end = buf
        .iter()
        .position(|&b| b == b'\n')
        .ok_or(ChunkError::Incomplete)?;
    let consumed = end + 1;

    let line = &buf[..end];
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    let size = match line.iter().position(|&b| b == b';') {
        Some(idx) => &line[..idx],
        None => line,
    };
    let size = size.trim_ascii();

    if size.is_empty() {
        return Err(ChunkError::InvalidSize);
    }

    let mut length: usize = 0;
    for &b in size {
        let digit = match b {
            b'0'..=b'9' => b - b'0',
            b'a'..=b'f' => b - b'a' + 10,
            b'A'..=b'F' => b - b'A' + 10,
            _ => return Err(ChunkError::InvalidSize),
        };
        length = length
            .checked_mul(16)
            .and_then(|l| l.checked_add(usize::from(digit)))
            .ok_or(ChunkError::Overflow)?;
    }

    Ok((consumed, length))
}
