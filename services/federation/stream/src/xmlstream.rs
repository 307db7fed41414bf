//! The XML stream protocol state machine bound to a session.

use bytes::Bytes;
use fedlink_session::{ByteSink, StreamParser};
use tracing::{debug, warn};

use crate::framing::{extract_unit, UnitKind};

/// Which side of the connection this stream speaks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Accepted connection; the peer opens the stream.
    Inbound,
    /// Connection we initiate; we open the stream once the transport
    /// reports connected.
    Outbound,
}

/// Kind of peer on the other end of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionType {
    /// Client connection.
    Client,
    /// Server-to-server federation link.
    Server,
    /// External component.
    Component,
}

impl SessionType {
    /// Default namespace declared on the stream header.
    pub fn default_namespace(&self) -> &'static str {
        match self {
            SessionType::Client => "jabber:client",
            SessionType::Server => "jabber:server",
            SessionType::Component => "jabber:component:accept",
        }
    }
}

/// Consumer of complete protocol units: the routing layer's seam.
pub trait StanzaHandler: Send {
    /// The peer opened (or re-opened) the stream.
    fn on_stream_open(&mut self, header: &str);
    /// One complete top-level stanza.
    fn on_stanza(&mut self, stanza: &str);
    /// The peer closed the stream.
    fn on_stream_close(&mut self);
}

/// Incremental XML stream parser.
///
/// Consumes byte spans handed over by the session's drain loop, extracting
/// complete units and passing them to the [`StanzaHandler`]. Reports zero
/// bytes consumed when a span holds no complete unit, which is the
/// session's signal to coalesce the input buffer. Once the stream close
/// tag is seen the stream is terminally closed.
pub struct XmlStream {
    direction: Direction,
    session_type: SessionType,
    origin: Option<String>,
    destination: Option<String>,
    handler: Box<dyn StanzaHandler>,
    opened: bool,
    closed: bool,
}

impl XmlStream {
    /// Stream for an accepted inbound connection.
    pub fn inbound(session_type: SessionType, handler: Box<dyn StanzaHandler>) -> Self {
        Self {
            direction: Direction::Inbound,
            session_type,
            origin: None,
            destination: None,
            handler,
            opened: false,
            closed: false,
        }
    }

    /// Stream for an outbound connection, primed with the origin and
    /// destination domains used in the handshake we initiate.
    pub fn outbound(
        session_type: SessionType,
        origin: impl Into<String>,
        destination: impl Into<String>,
        handler: Box<dyn StanzaHandler>,
    ) -> Self {
        Self {
            direction: Direction::Outbound,
            session_type,
            origin: Some(origin.into()),
            destination: Some(destination.into()),
            handler,
            opened: false,
            closed: false,
        }
    }

    /// Direction of this stream.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// True once the peer's stream header has been seen.
    pub fn opened(&self) -> bool {
        self.opened
    }

    /// The stream header we transmit when (re-)initiating the handshake.
    fn stream_header(&self) -> String {
        let mut header = String::from("<?xml version='1.0'?><stream:stream");
        if let Some(origin) = &self.origin {
            header.push_str(&format!(" from='{}'", origin));
        }
        if let Some(destination) = &self.destination {
            header.push_str(&format!(" to='{}'", destination));
        }
        header.push_str(" version='1.0'");
        header.push_str(&format!(" xmlns='{}'", self.session_type.default_namespace()));
        header.push_str(" xmlns:stream='http://etherx.jabber.org/streams'>");
        header
    }
}

impl StreamParser for XmlStream {
    fn process(&mut self, data: &[u8], sink: &mut dyn ByteSink) -> usize {
        let mut total = 0;
        while !self.closed {
            let rest = &data[total..];
            if rest.is_empty() {
                break;
            }
            let Some(unit) = extract_unit(rest) else {
                break;
            };
            sink.consume(unit.consumed);
            total += unit.consumed;

            match unit.kind {
                UnitKind::StreamOpen => {
                    debug!(header = %unit.text, "stream opened by peer");
                    self.opened = true;
                    self.handler.on_stream_open(&unit.text);
                }
                UnitKind::Stanza => {
                    if !self.opened {
                        warn!("stanza before stream header");
                    }
                    self.handler.on_stanza(&unit.text);
                }
                UnitKind::StreamClose => {
                    debug!("stream closed by peer");
                    self.closed = true;
                    self.handler.on_stream_close();
                }
            }
        }
        total
    }

    fn closed(&self) -> bool {
        self.closed
    }

    fn restart(&mut self) -> Bytes {
        self.opened = false;
        match self.direction {
            Direction::Outbound => Bytes::from(self.stream_header()),
            Direction::Inbound => Bytes::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct RecordingHandler {
        events: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingHandler {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl StanzaHandler for RecordingHandler {
        fn on_stream_open(&mut self, header: &str) {
            self.events.lock().unwrap().push(format!("open:{}", header));
        }
        fn on_stanza(&mut self, stanza: &str) {
            self.events.lock().unwrap().push(format!("stanza:{}", stanza));
        }
        fn on_stream_close(&mut self) {
            self.events.lock().unwrap().push("close".to_string());
        }
    }

    struct CountSink(usize);

    impl ByteSink for CountSink {
        fn consume(&mut self, n: usize) {
            self.0 += n;
        }
    }

    #[test]
    fn test_process_header_then_stanzas() {
        let handler = RecordingHandler::default();
        let mut stream = XmlStream::inbound(SessionType::Server, Box::new(handler.clone()));
        let mut sink = CountSink(0);

        let data = b"<stream:stream xmlns='jabber:server' version='1.0'><presence/>";
        let consumed = stream.process(data, &mut sink);

        assert_eq!(consumed, data.len());
        assert_eq!(sink.0, data.len());
        assert!(stream.opened());
        assert!(!stream.closed());
        let events = handler.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].starts_with("open:"));
        assert_eq!(events[1], "stanza:<presence/>");
    }

    #[test]
    fn test_process_partial_consumes_nothing() {
        let handler = RecordingHandler::default();
        let mut stream = XmlStream::inbound(SessionType::Server, Box::new(handler.clone()));
        let mut sink = CountSink(0);

        assert_eq!(stream.process(b"<messa", &mut sink), 0);
        assert_eq!(sink.0, 0);
        assert!(handler.events().is_empty());
    }

    #[test]
    fn test_process_complete_then_partial() {
        let handler = RecordingHandler::default();
        let mut stream = XmlStream::inbound(SessionType::Server, Box::new(handler.clone()));
        let mut sink = CountSink(0);

        let consumed = stream.process(b"<presence/><messa", &mut sink);
        assert_eq!(consumed, 11);
        assert_eq!(sink.0, 11);
    }

    #[test]
    fn test_stream_close_is_terminal() {
        let handler = RecordingHandler::default();
        let mut stream = XmlStream::inbound(SessionType::Server, Box::new(handler.clone()));
        let mut sink = CountSink(0);

        let data = b"</stream:stream><presence/>";
        let consumed = stream.process(data, &mut sink);

        // Only the close tag is consumed; nothing is processed after it.
        assert_eq!(consumed, 16);
        assert!(stream.closed());
        assert_eq!(handler.events(), vec!["close".to_string()]);
    }

    #[test]
    fn test_outbound_restart_builds_header() {
        let handler = RecordingHandler::default();
        let mut stream = XmlStream::outbound(
            SessionType::Server,
            "a.example",
            "b.example",
            Box::new(handler),
        );

        let header = stream.restart();
        let text = std::str::from_utf8(&header).unwrap();
        assert!(text.starts_with("<?xml version='1.0'?><stream:stream"));
        assert!(text.contains("from='a.example'"));
        assert!(text.contains("to='b.example'"));
        assert!(text.contains("xmlns='jabber:server'"));
        assert!(text.ends_with(">"));
    }

    #[test]
    fn test_inbound_restart_emits_nothing() {
        let handler = RecordingHandler::default();
        let mut stream = XmlStream::inbound(SessionType::Client, Box::new(handler));
        assert!(stream.restart().is_empty());
    }

    #[test]
    fn test_restart_resets_opened() {
        let handler = RecordingHandler::default();
        let mut stream = XmlStream::outbound(
            SessionType::Server,
            "a.example",
            "b.example",
            Box::new(handler),
        );
        let mut sink = CountSink(0);

        stream.process(b"<stream:stream xmlns='jabber:server'>", &mut sink);
        assert!(stream.opened());

        stream.restart();
        assert!(!stream.opened());
    }

    #[test]
    fn test_namespaces() {
        assert_eq!(SessionType::Client.default_namespace(), "jabber:client");
        assert_eq!(SessionType::Server.default_namespace(), "jabber:server");
        assert_eq!(
            SessionType::Component.default_namespace(),
            "jabber:component:accept"
        );
    }
}
