//! Transport abstraction consumed by sessions.
//!
//! The reactor owns the sockets; a session only ever sees this narrow
//! byte-stream contract: an input buffer queryable for contiguous spans and
//! drainable by byte count, and an output buffer it can append to. Actual
//! socket transmission and the readable/lifecycle callbacks are the
//! reactor's responsibility.

use bitflags::bitflags;
use bytes::Bytes;
use fedlink_buffer::{InputBuffer, OutputBuffer};

bitflags! {
    /// Lifecycle events reported by the transport as a bitmask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransportEvent: u8 {
        /// Transport-level failure. Treated identically to EOF.
        const ERROR = 0b0000_0001;
        /// Clean end of stream from the peer.
        const EOF = 0b0000_0010;
        /// Outbound connect completed; the stream is live.
        const CONNECTED = 0b0000_0100;
    }
}

/// Byte-stream transport handle.
///
/// The input side exposes the contiguous-span / total-length / coalesce /
/// drain-by-count contract the drain algorithm is written against; the
/// output side is append-only and flushed asynchronously by the reactor.
/// Dropping the handle releases the underlying resources, on every exit
/// path.
pub trait Transport: Send {
    /// Handle to the longest contiguous run of buffered input bytes,
    /// clamped to `max` when given. Empty when nothing is buffered. Must
    /// not copy.
    fn input_contiguous(&mut self, max: Option<usize>) -> Bytes;

    /// Total number of buffered input bytes, across all fragments.
    fn input_len(&self) -> usize;

    /// Force all buffered input into one contiguous region (may copy) and
    /// return a handle covering all of it.
    fn input_coalesce(&mut self) -> Bytes;

    /// Drop the first `n` buffered input bytes. `n` must not exceed
    /// `input_len()`.
    fn input_drain(&mut self, n: usize);

    /// Append bytes to the output buffer. Enqueue only; transmission is
    /// asynchronous.
    fn output_append(&mut self, data: &[u8]);

    /// Enable read and write interest. Called when a session binds the
    /// transport.
    fn enable_read_write(&mut self);

    /// Request that pending output be flushed and the transport finished.
    /// Returns immediately; completion of the flush is not awaited.
    fn flush_and_finish(&mut self);

    // Reactor face: the flush loop feeds reads in and takes pending writes
    // out through the same handle.

    /// Push one network read into the input buffer.
    fn feed(&mut self, data: Bytes);

    /// Take all pending output bytes, in append order.
    fn take_output(&mut self) -> Bytes;

    /// True once `flush_and_finish` has been requested.
    fn is_finished(&self) -> bool;
}

/// In-memory [`Transport`] over segmented buffers.
///
/// The reactor `feed`s each socket read in as its own segment and drains
/// `take_output` to the socket. Fragmentation of the input therefore mirrors
/// the fragmentation of the network reads exactly.
#[derive(Debug, Default)]
pub struct BufferedTransport {
    input: InputBuffer,
    output: OutputBuffer,
    enabled: bool,
    finished: bool,
}

impl BufferedTransport {
    /// Create a transport with empty buffers.
    pub fn new() -> Self {
        Self::default()
    }

    /// True once a session has bound this transport.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Transport for BufferedTransport {
    fn input_contiguous(&mut self, max: Option<usize>) -> Bytes {
        self.input.contiguous(max)
    }

    fn input_len(&self) -> usize {
        self.input.len()
    }

    fn input_coalesce(&mut self) -> Bytes {
        self.input.coalesce()
    }

    fn input_drain(&mut self, n: usize) {
        self.input.drain(n);
    }

    fn output_append(&mut self, data: &[u8]) {
        self.output.append(data);
    }

    fn enable_read_write(&mut self) {
        self.enabled = true;
    }

    fn flush_and_finish(&mut self) {
        self.finished = true;
    }

    fn feed(&mut self, data: Bytes) {
        self.input.push(data);
    }

    fn take_output(&mut self) -> Bytes {
        self.output.take()
    }

    fn is_finished(&self) -> bool {
        self.finished
    }
}
