//! Append-only output buffer, flushed by the transport.

use bytes::{Bytes, BytesMut};

/// Pending outbound bytes in append order.
///
/// Sessions only ever append; the transport's flush loop takes whatever is
/// pending and writes it to the socket. Relative order of appended bytes is
/// preserved exactly.
#[derive(Debug, Default)]
pub struct OutputBuffer {
    pending: BytesMut,
}

impl OutputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes waiting to be flushed.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Append bytes after everything previously appended.
    pub fn append(&mut self, data: &[u8]) {
        self.pending.extend_from_slice(data);
    }

    /// Take all pending bytes, leaving the buffer empty.
    pub fn take(&mut self) -> Bytes {
        self.pending.split().freeze()
    }
}
