//! Session layer bridging event-driven byte-stream transports to the
//! incremental XML stream parser.
//!
//! A [`Session`] owns one [`Transport`] handle and one [`StreamParser`]
//! instance for the life of a connection. Raw bytes arrive in arbitrarily
//! fragmented chunks; the drain algorithm feeds them to the parser with
//! minimal copying (contiguous spans first, a single full coalesce as the
//! fallback when a protocol unit straddles a fragment boundary) and reports
//! when the session is fully closed and drained. Transport lifecycle events
//! are translated into multicast `connected`/`closed` notifications.
//!
//! ## Features
//!
//! - **Drain algorithm**: zero-copy fast path over contiguous spans with a
//!   coalescing fallback for fragmented units
//! - **Output paths**: structured-document, raw-byte and text sends, all
//!   enqueue-only and ordering-preserving
//! - **Lifecycle**: transport error/EOF/connect translation with multicast
//!   subscriber notification
//! - **Isolation**: the parser receives a narrow byte-sink capability, never
//!   a session reference
//!
//! ## Example
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use fedlink_session::{
//!     BufferedTransport, ByteSink, Session, StreamParser, TransportEvent,
//! };
//!
//! // A trivial parser that consumes everything it is given.
//! struct Discard {
//!     closed: bool,
//! }
//!
//! impl StreamParser for Discard {
//!     fn process(&mut self, data: &[u8], sink: &mut dyn ByteSink) -> usize {
//!         sink.consume(data.len());
//!         data.len()
//!     }
//!     fn closed(&self) -> bool {
//!         self.closed
//!     }
//!     fn restart(&mut self) -> Bytes {
//!         Bytes::new()
//!     }
//! }
//!
//! let parser = Box::new(Discard { closed: false });
//! let mut session = Session::inbound(Box::new(BufferedTransport::new()), parser);
//! session.on_closed(|id| println!("session {} closed", id));
//!
//! // The reactor feeds each network read in and dispatches the callbacks.
//! if let Some(transport) = session.transport_mut() {
//!     transport.feed(Bytes::from_static(b"<presence/>"));
//! }
//! session.on_readable();
//! session.handle_event(TransportEvent::EOF);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod parser;
pub mod session;
pub mod signal;
pub mod transport;

// Re-export main types
pub use error::SessionError;
pub use parser::{ByteSink, StreamParser};
pub use session::{DrainStatus, Session, SessionId, XmlSerialize};
pub use signal::Signal;
pub use transport::{BufferedTransport, Transport, TransportEvent};
