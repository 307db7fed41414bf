//! Protocol state machine contract consumed by sessions.
//!
//! The session layer knows nothing about the XML grammar; it only hands the
//! parser contiguous byte spans and observes how much was consumed, whether
//! the stream has reached its terminal closed state, and what to transmit
//! when the stream restarts after a transport-level connect.

use bytes::Bytes;

/// Byte-consumption capability handed to the parser during
/// [`StreamParser::process`].
///
/// This is the only way bytes are removed from the input buffer: the parser
/// alone knows how many bytes made up a complete protocol unit, so it calls
/// `consume` for each unit before returning. The capability is deliberately
/// narrow; the parser never sees the session itself.
pub trait ByteSink {
    /// Drop the first `n` bytes from the input buffer. `n` must not exceed
    /// the bytes currently buffered.
    fn consume(&mut self, n: usize);
}

/// Incremental protocol state machine.
///
/// Exactly one instance is bound to a session for the session's entire life.
pub trait StreamParser: Send {
    /// Consume as much of `data` as possible.
    ///
    /// Returns the number of bytes consumed, calling `sink.consume` for the
    /// same total before returning. A return of zero means no complete
    /// protocol unit was found in `data`, a control signal rather than an
    /// error: the session falls back to coalescing the full input buffer.
    /// Never called once [`StreamParser::closed`] reports true.
    fn process(&mut self, data: &[u8], sink: &mut dyn ByteSink) -> usize;

    /// True once the stream has reached its terminal state and no further
    /// input will be accepted.
    fn closed(&self) -> bool;

    /// Re-initiate the handshake after the transport reports a completed
    /// connect, returning the bytes to transmit (empty when this direction
    /// has nothing to emit).
    fn restart(&mut self) -> Bytes;
}
