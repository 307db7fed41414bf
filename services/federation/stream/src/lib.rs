//! Incremental XML stream parsing and stanza serialization for federation
//! sessions.
//!
//! This crate supplies the protocol state machine side of the session
//! layer's narrow parser contract:
//!
//! - **Framing**: stanza boundary detection over raw byte spans, tolerant
//!   of arbitrary fragmentation ([`framing::extract_unit`])
//! - **State machine**: [`XmlStream`], the `StreamParser` implementation
//!   driving a federation stream from header to close, handing complete
//!   units to a [`StanzaHandler`]
//! - **Serialization**: owned [`Element`] trees rendered compactly for the
//!   session's structured-document send path

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod element;
pub mod framing;
pub mod xmlstream;

// Re-export main types
pub use element::{Element, Node};
pub use framing::{extract_unit, Unit, UnitKind};
pub use xmlstream::{Direction, SessionType, StanzaHandler, XmlStream};
