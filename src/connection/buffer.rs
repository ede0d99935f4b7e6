//! The receive buffer shared by every read phase of a connection.

use std::ops::Deref;

use bytes::{Buf as _, BytesMut};

/// Growable buffer of received bytes which have not been consumed yet.
#[derive(Debug)]
pub(super) struct ReceiveBuffer {
    inner: BytesMut,
    chunk: usize,
}

impl ReceiveBuffer {
    pub(super) fn new(capacity: usize) -> Self {
        let chunk = capacity.max(64);
        Self {
            inner: BytesMut::with_capacity(chunk),
            chunk,
        }
    }

    /// Drop the first `n` bytes, which have been processed.
    pub(super) fn consume(&mut self, n: usize) {
        let n = n.min(self.inner.len());
        self.inner.advance(n);
    }

    /// The buffer to read into, with room for at least one more read.
    pub(super) fn spare(&mut self) -> &mut BytesMut {
        if self.inner.capacity() - self.inner.len() < self.chunk / 2 {
            self.inner.reserve(self.chunk);
        }
        &mut self.inner
    }

    /// Position just past the first `\r\n` at or after `from`.
    pub(super) fn find_line(&self, from: usize) -> Option<usize> {
        find(&self.inner, b"\r\n", from).map(|idx| idx + 2)
    }

    /// Position just past the blank line which ends a header block.
    pub(super) fn find_header_end(&self, from: usize) -> Option<usize> {
        if self.inner.starts_with(b"\r\n") {
            return Some(2);
        }
        find(&self.inner, b"\r\n\r\n", from).map(|idx| idx + 4)
    }
}

impl Deref for ReceiveBuffer {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|window| window == needle)
        .map(|idx| idx + from)
}
