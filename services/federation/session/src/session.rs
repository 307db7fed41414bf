//! Core session: drain algorithm, output paths, lifecycle translation.
//!
//! A session binds exactly one transport handle to exactly one protocol
//! state machine for the life of a connection. All methods run on the
//! reactor's dispatch task; nothing here blocks and nothing is locked.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::error::SessionError;
use crate::parser::{ByteSink, StreamParser};
use crate::signal::Signal;
use crate::transport::{Transport, TransportEvent};

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-monotonic session identifier.
///
/// Used for logging and correlation only; never carries protocol meaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    fn next() -> Self {
        Self(NEXT_SERIAL.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw serial number.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of one [`Session::drain`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// The stream is still open, or closed with input not yet empty in a
    /// way the next pass will resolve. The ordinary state of a live
    /// session with no more data right now.
    Open,
    /// The parser reports the stream closed and the input buffer is fully
    /// drained (trailing bytes after a close are logged and count as
    /// closed).
    Closed,
}

/// Serialization contract for structured documents sent with
/// [`Session::send_element`]. Implementors write the document as compact
/// text, without pretty-printing.
pub trait XmlSerialize {
    /// Append the serialized document to `out`.
    fn write_xml(&self, out: &mut Vec<u8>);
}

/// Byte-consumption capability over the bound transport, handed to the
/// parser for the duration of one `process` call.
struct TransportSink<'a> {
    transport: &'a mut dyn Transport,
}

impl ByteSink for TransportSink<'_> {
    fn consume(&mut self, n: usize) {
        self.transport.input_drain(n);
    }
}

/// One federation connection: a transport handle bound to a protocol state
/// machine, with multicast `connected`/`closed` lifecycle notifications.
///
/// The session holds no closed flag of its own; closed-ness is always
/// derived from the parser. Dropping the session drops the transport, which
/// releases the underlying resources on every exit path.
pub struct Session {
    serial: SessionId,
    transport: Option<Box<dyn Transport>>,
    parser: Box<dyn StreamParser>,
    connected: Signal<SessionId>,
    closed: Signal<SessionId>,
}

impl Session {
    /// Create a session for an accepted inbound connection. The transport
    /// is bound immediately.
    pub fn inbound(transport: Box<dyn Transport>, parser: Box<dyn StreamParser>) -> Self {
        let mut session = Self::unbound(parser);
        session.bind(transport);
        debug!(session = %session.serial, "inbound session created");
        session
    }

    /// Create a session for an outbound connection that has not been
    /// established yet. Until [`Session::bind`] attaches a transport, every
    /// drain/send operation fails with [`SessionError::NotBound`].
    pub fn outbound(parser: Box<dyn StreamParser>) -> Self {
        let session = Self::unbound(parser);
        debug!(session = %session.serial, "outbound session created");
        session
    }

    fn unbound(parser: Box<dyn StreamParser>) -> Self {
        Self {
            serial: SessionId::next(),
            transport: None,
            parser,
            connected: Signal::new(),
            closed: Signal::new(),
        }
    }

    /// Bind (or rebind) a transport, enabling read and write interest on
    /// it. A previously bound transport is released.
    pub fn bind(&mut self, mut transport: Box<dyn Transport>) {
        transport.enable_read_write();
        self.transport = Some(transport);
    }

    /// This session's identifier.
    pub fn serial(&self) -> SessionId {
        self.serial
    }

    /// True when a transport is bound.
    pub fn is_bound(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether the protocol stream has reached its terminal state. Always
    /// derived from the parser; the session stores no flag of its own.
    pub fn stream_closed(&self) -> bool {
        self.parser.closed()
    }

    /// Reactor-face access to the bound transport (feeding reads, taking
    /// pending writes).
    pub fn transport_mut(&mut self) -> Option<&mut dyn Transport> {
        self.transport.as_mut().map(|t| &mut **t as &mut dyn Transport)
    }

    /// Subscribe to the `connected` notification.
    pub fn on_connected<F>(&mut self, slot: F)
    where
        F: FnMut(SessionId) + Send + 'static,
    {
        self.connected.connect(slot);
    }

    /// Subscribe to the `closed` notification.
    ///
    /// Each trigger path (drain completion, transport error/EOF, explicit
    /// close) notifies independently; a subscriber may therefore observe
    /// more than one `closed` for the same session.
    pub fn on_closed<F>(&mut self, slot: F)
    where
        F: FnMut(SessionId) + Send + 'static,
    {
        self.closed.connect(slot);
    }

    /// Feed buffered input to the parser until no further progress is
    /// possible.
    ///
    /// Fast path: contiguous spans are handed to the parser without any
    /// copying, as long as it makes progress. When a protocol unit
    /// straddles a fragment boundary the parser consumes nothing; the slow
    /// path then coalesces the full buffer into one region and makes a
    /// single process call over it. The parser removes whatever it consumes
    /// through the byte-sink; the drain loop itself never drains bytes.
    pub fn drain(&mut self) -> Result<DrainStatus, SessionError> {
        let transport = self.transport.as_deref_mut().ok_or(SessionError::NotBound)?;

        // Fast path over contiguous spans.
        loop {
            if self.parser.closed() {
                break;
            }
            let span = transport.input_contiguous(None);
            if span.is_empty() {
                break;
            }
            let used = self.parser.process(
                &span,
                &mut TransportSink {
                    transport: &mut *transport,
                },
            );
            if used == 0 {
                // No complete unit in this span alone; fall through to the
                // coalescing path.
                break;
            }
        }

        let remaining = transport.input_len();
        if remaining > 0 {
            if !self.parser.closed() {
                let span = transport.input_coalesce();
                self.parser.process(
                    &span,
                    &mut TransportSink {
                        transport: &mut *transport,
                    },
                );
            } else {
                warn!(
                    session = %self.serial,
                    remaining,
                    "bytes left after stream close"
                );
                return Ok(DrainStatus::Closed);
            }
        }

        if self.parser.closed() && transport.input_len() == 0 {
            Ok(DrainStatus::Closed)
        } else {
            Ok(DrainStatus::Open)
        }
    }

    /// Readable-data callback: drain, and raise `closed` when the session
    /// is now fully closed and drained.
    pub fn on_readable(&mut self) {
        match self.drain() {
            Ok(DrainStatus::Closed) => self.notify_closed(),
            Ok(DrainStatus::Open) => {}
            Err(err) => {
                warn!(session = %self.serial, %err, "readable event on unusable session");
            }
        }
    }

    /// Translate a transport lifecycle event mask.
    ///
    /// Error and end-of-stream are treated identically and map to the
    /// closed notification; a completed outbound connect notifies
    /// `connected` subscribers and then restarts the parser's handshake.
    pub fn handle_event(&mut self, events: TransportEvent) {
        debug!(session = %self.serial, ?events, "transport event");
        if events.intersects(TransportEvent::ERROR | TransportEvent::EOF) {
            self.notify_closed();
        } else if events.contains(TransportEvent::CONNECTED) {
            self.notify_connected();
        }
    }

    /// Serialize a structured document (compact, no indentation) and
    /// enqueue it.
    pub fn send_element(&mut self, doc: &dyn XmlSerialize) -> Result<(), SessionError> {
        let mut text = Vec::new();
        doc.write_xml(&mut text);
        self.send_raw(&text)
    }

    /// Enqueue raw bytes. Enqueue only: transmission happens asynchronously
    /// in the transport's flush loop, outside this layer.
    pub fn send_raw(&mut self, data: &[u8]) -> Result<(), SessionError> {
        let transport = self.transport.as_deref_mut().ok_or(SessionError::NotBound)?;
        debug!(
            session = %self.serial,
            len = data.len(),
            payload = %String::from_utf8_lossy(data),
            "send"
        );
        transport.output_append(data);
        Ok(())
    }

    /// Enqueue a text payload. Delegates to the raw path.
    pub fn send_str(&mut self, text: &str) -> Result<(), SessionError> {
        self.send_raw(text.as_bytes())
    }

    /// Request that pending output be flushed and the transport finished,
    /// then notify `closed` immediately.
    ///
    /// "Closed" here means no further processing will occur on this
    /// session, not that all bytes were transmitted: the flush is requested
    /// but not awaited, so callers must not assume delivery.
    pub fn close(&mut self) -> Result<(), SessionError> {
        let transport = self.transport.as_deref_mut().ok_or(SessionError::NotBound)?;
        transport.flush_and_finish();
        self.notify_closed();
        Ok(())
    }

    fn notify_connected(&mut self) {
        debug!(session = %self.serial, "connected");
        self.connected.emit(self.serial);
        let header = self.parser.restart();
        if !header.is_empty() {
            if let Err(err) = self.send_raw(&header) {
                warn!(session = %self.serial, %err, "restart header dropped");
            }
        }
    }

    fn notify_closed(&mut self) {
        debug!(session = %self.serial, "closed");
        self.closed.emit(self.serial);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("serial", &self.serial)
            .field("bound", &self.transport.is_some())
            .field("stream_closed", &self.parser.closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::BufferedTransport;
    use bytes::Bytes;
    use std::sync::{Arc, Mutex};

    /// Scripted parser for exercising the drain algorithm: consumes
    /// dot-terminated tokens, closes on the token `end.`, and records every
    /// process call and consumed token.
    struct TokenParser {
        units: Arc<Mutex<Vec<String>>>,
        calls: Arc<Mutex<Vec<(usize, usize)>>>, // (span length, consumed)
        restarts: Arc<Mutex<u32>>,
        closed: bool,
    }

    #[derive(Clone, Default)]
    struct TokenProbe {
        units: Arc<Mutex<Vec<String>>>,
        calls: Arc<Mutex<Vec<(usize, usize)>>>,
        restarts: Arc<Mutex<u32>>,
    }

    impl TokenProbe {
        fn parser(&self) -> Box<dyn StreamParser> {
            Box::new(TokenParser {
                units: Arc::clone(&self.units),
                calls: Arc::clone(&self.calls),
                restarts: Arc::clone(&self.restarts),
                closed: false,
            })
        }

        fn units(&self) -> Vec<String> {
            self.units.lock().unwrap().clone()
        }

        fn calls(&self) -> Vec<(usize, usize)> {
            self.calls.lock().unwrap().clone()
        }

        fn restarts(&self) -> u32 {
            *self.restarts.lock().unwrap()
        }
    }

    impl StreamParser for TokenParser {
        fn process(&mut self, data: &[u8], sink: &mut dyn ByteSink) -> usize {
            let mut total = 0;
            while !self.closed {
                let rest = &data[total..];
                let Some(idx) = rest.iter().position(|&b| b == b'.') else {
                    break;
                };
                let unit = &rest[..=idx];
                sink.consume(unit.len());
                total += unit.len();
                let text = String::from_utf8_lossy(unit).into_owned();
                if text == "end." {
                    self.closed = true;
                }
                self.units.lock().unwrap().push(text);
            }
            self.calls.lock().unwrap().push((data.len(), total));
            total
        }

        fn closed(&self) -> bool {
            self.closed
        }

        fn restart(&mut self) -> Bytes {
            *self.restarts.lock().unwrap() += 1;
            Bytes::from_static(b"hello.")
        }
    }

    fn feed(session: &mut Session, chunk: &[u8]) {
        session
            .transport_mut()
            .unwrap()
            .feed(Bytes::copy_from_slice(chunk));
    }

    fn closed_counter(session: &mut Session) -> Arc<Mutex<u32>> {
        let count = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&count);
        session.on_closed(move |_| *counter.lock().unwrap() += 1);
        count
    }

    #[test]
    fn test_single_chunk_complete_unit() {
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());

        feed(&mut session, b"ping.");
        assert_eq!(session.drain().unwrap(), DrainStatus::Open);

        assert_eq!(probe.units(), vec!["ping.".to_string()]);
        assert_eq!(session.transport_mut().unwrap().input_len(), 0);
    }

    #[test]
    fn test_fragmented_unit_uses_coalesce_fallback() {
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());

        feed(&mut session, b"pi");
        feed(&mut session, b"ng.");
        assert_eq!(session.drain().unwrap(), DrainStatus::Open);

        // Fast path saw the 2-byte front fragment and made no progress;
        // the slow path coalesced all 5 bytes and consumed the unit whole.
        assert_eq!(probe.calls(), vec![(2, 0), (5, 5)]);
        assert_eq!(probe.units(), vec!["ping.".to_string()]);
        assert_eq!(session.transport_mut().unwrap().input_len(), 0);
    }

    #[test]
    fn test_byte_by_byte_fragmentation() {
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());

        feed(&mut session, b"a");
        assert_eq!(session.drain().unwrap(), DrainStatus::Open);
        feed(&mut session, b"b");
        assert_eq!(session.drain().unwrap(), DrainStatus::Open);
        feed(&mut session, b".");
        assert_eq!(session.drain().unwrap(), DrainStatus::Open);

        assert_eq!(probe.units(), vec!["ab.".to_string()]);
        assert_eq!(session.transport_mut().unwrap().input_len(), 0);

        // One coalesce fallback per drain pass at most: every pass makes
        // one fast-path call and, while incomplete, one coalesced call.
        let calls = probe.calls();
        assert_eq!(
            calls,
            vec![(1, 0), (1, 0), (1, 0), (2, 0), (2, 0), (3, 3)]
        );
    }

    #[test]
    fn test_drain_idempotent_when_closed_and_empty() {
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());

        feed(&mut session, b"end.");
        assert_eq!(session.drain().unwrap(), DrainStatus::Closed);
        assert!(session.stream_closed());

        let calls_before = probe.calls().len();
        assert_eq!(session.drain().unwrap(), DrainStatus::Closed);
        // No process call is made once the parser is closed.
        assert_eq!(probe.calls().len(), calls_before);
    }

    #[test]
    fn test_stranded_bytes_after_close() {
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());

        feed(&mut session, b"end.trailing");
        assert_eq!(session.drain().unwrap(), DrainStatus::Closed);

        // The leftover is a diagnostic, not an error, and does not change
        // the closed verdict.
        assert_eq!(session.transport_mut().unwrap().input_len(), 8);
        assert_eq!(probe.units(), vec!["end.".to_string()]);
    }

    #[test]
    fn test_send_ordering() {
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());

        struct Doc;
        impl XmlSerialize for Doc {
            fn write_xml(&self, out: &mut Vec<u8>) {
                out.extend_from_slice(b"<presence/>");
            }
        }

        session.send_raw(b"<a/>").unwrap();
        session.send_str("<b/>").unwrap();
        session.send_element(&Doc).unwrap();

        let out = session.transport_mut().unwrap().take_output();
        assert_eq!(out, Bytes::from_static(b"<a/><b/><presence/>"));
    }

    #[test]
    fn test_unbound_session_unusable() {
        let probe = TokenProbe::default();
        let mut session = Session::outbound(probe.parser());

        assert!(!session.is_bound());
        assert_eq!(session.drain(), Err(SessionError::NotBound));
        assert_eq!(session.send_raw(b"x"), Err(SessionError::NotBound));
        assert_eq!(session.close(), Err(SessionError::NotBound));
    }

    #[test]
    fn test_bind_enables_and_makes_usable() {
        let probe = TokenProbe::default();
        let mut session = Session::outbound(probe.parser());

        let transport = BufferedTransport::new();
        assert!(!transport.is_enabled());
        session.bind(Box::new(transport));

        assert!(session.is_bound());
        assert!(session.send_raw(b"ok").is_ok());
    }

    #[test]
    fn test_connected_event_restarts_handshake() {
        let probe = TokenProbe::default();
        let mut session = Session::outbound(probe.parser());
        session.bind(Box::new(BufferedTransport::new()));

        let connections = Arc::new(Mutex::new(0u32));
        let counter = Arc::clone(&connections);
        session.on_connected(move |_| *counter.lock().unwrap() += 1);

        session.handle_event(TransportEvent::CONNECTED);

        assert_eq!(*connections.lock().unwrap(), 1);
        assert_eq!(probe.restarts(), 1);
        // The restart header is enqueued after the notification.
        let out = session.transport_mut().unwrap().take_output();
        assert_eq!(out, Bytes::from_static(b"hello."));
    }

    #[test]
    fn test_eof_and_error_notify_closed() {
        for events in [TransportEvent::EOF, TransportEvent::ERROR] {
            let probe = TokenProbe::default();
            let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());
            let count = closed_counter(&mut session);

            session.handle_event(events);
            assert_eq!(*count.lock().unwrap(), 1);
        }
    }

    #[test]
    fn test_readable_closing_stream_notifies_closed() {
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());
        let count = closed_counter(&mut session);

        feed(&mut session, b"bye.end.");
        session.on_readable();

        assert_eq!(probe.units(), vec!["bye.".to_string(), "end.".to_string()]);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_explicit_close_flushes_and_notifies() {
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());
        let count = closed_counter(&mut session);

        session.send_raw(b"<bye/>").unwrap();
        session.close().unwrap();

        assert_eq!(*count.lock().unwrap(), 1);
        let transport = session.transport_mut().unwrap();
        assert!(transport.is_finished());
        // Close does not discard pending output; the flush is requested.
        assert_eq!(transport.take_output(), Bytes::from_static(b"<bye/>"));
    }

    #[test]
    fn test_close_then_eof_double_notification() {
        // Each trigger path notifies independently: explicit close followed
        // by a transport EOF yields two closed notifications for the same
        // session.
        let probe = TokenProbe::default();
        let mut session = Session::inbound(Box::new(BufferedTransport::new()), probe.parser());
        let count = closed_counter(&mut session);

        session.close().unwrap();
        session.handle_event(TransportEvent::EOF);

        assert_eq!(*count.lock().unwrap(), 2);
    }

    #[test]
    fn test_serials_are_unique() {
        let probe = TokenProbe::default();
        let a = Session::outbound(probe.parser());
        let b = Session::outbound(probe.parser());
        assert_ne!(a.serial(), b.serial());
    }
}
