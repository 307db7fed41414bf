//! Stanza boundary detection over a raw byte span.
//!
//! The federation stream is a sequence of three kinds of protocol units:
//! the stream header (`<stream:stream ...>`), top-level stanzas, and the
//! stream close tag (`</stream:stream>`). This module finds one complete
//! unit at the front of a byte span, or reports that the span only holds a
//! partial unit and more data is needed, which is the signal the session
//! layer turns into its coalescing fallback.

use quick_xml::errors::SyntaxError;
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::error;

/// Kind of protocol unit found at the front of a span.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    /// Stream header, optionally preceded by an XML declaration.
    StreamOpen,
    /// One complete top-level stanza.
    Stanza,
    /// Stream close tag.
    StreamClose,
}

/// One complete protocol unit extracted from a span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unit {
    /// What was found.
    pub kind: UnitKind,
    /// The unit's text (leading whitespace and XML declaration stripped).
    pub text: String,
    /// Bytes consumed from the front of the span, including any leading
    /// whitespace or XML declaration.
    pub consumed: usize,
}

fn bytes_to_string(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(s) => s.to_string(),
        Err(_) => String::from_utf8_lossy(bytes).into_owned(),
    }
}

fn is_stream_tag(e: &quick_xml::events::BytesStart<'_>) -> bool {
    e.name().as_ref() == b"stream:stream" || e.name().local_name().as_ref() == b"stream"
}

/// Extract one complete unit from the front of `buffer`.
///
/// Returns `None` when the buffer holds only a partial unit; the caller
/// should retry once more bytes have arrived. Malformed XML that can never
/// become a complete unit is also reported as `None` after logging: the
/// stream will stall and be torn down by the peer or an idle timeout,
/// grammar enforcement being outside this layer.
pub fn extract_unit(buffer: &[u8]) -> Option<Unit> {
    // The close tag appears alone, without a matching open in the buffer,
    // so the reader below would misread it. Check it first.
    let content_start = buffer
        .iter()
        .position(|&b| !matches!(b, b' ' | b'\t' | b'\n' | b'\r'))?;
    if buffer[content_start..].starts_with(b"</stream:stream>") {
        return Some(Unit {
            kind: UnitKind::StreamClose,
            text: "</stream:stream>".to_string(),
            consumed: content_start + b"</stream:stream>".len(),
        });
    }

    let mut reader = Reader::from_reader(buffer);
    reader.config_mut().trim_text(false);
    reader.config_mut().check_end_names = false;

    let mut depth: u32 = 0;
    let mut stanza_start: usize = 0;
    let mut in_stanza = false;

    loop {
        let pos = reader.buffer_position() as usize;

        match reader.read_event() {
            Ok(Event::Decl(_)) | Ok(Event::PI(_)) | Ok(Event::Comment(_)) | Ok(Event::DocType(_)) => {
                continue;
            }
            Ok(Event::Start(e)) => {
                // The stream header is an unterminated Start event at the
                // top level; it is a complete unit on its own.
                if !in_stanza && depth == 0 && is_stream_tag(&e) {
                    let tag_end = reader.buffer_position() as usize;
                    return Some(Unit {
                        kind: UnitKind::StreamOpen,
                        text: bytes_to_string(&buffer[pos..tag_end]),
                        consumed: tag_end,
                    });
                }
                depth += 1;
                if !in_stanza && depth == 1 {
                    in_stanza = true;
                    stanza_start = pos;
                }
            }
            Ok(Event::Empty(_)) => {
                // Self-closing top-level stanza, e.g. <presence/>.
                if !in_stanza && depth == 0 {
                    let tag_end = reader.buffer_position() as usize;
                    return Some(Unit {
                        kind: UnitKind::Stanza,
                        text: bytes_to_string(&buffer[pos..tag_end]),
                        consumed: tag_end,
                    });
                }
            }
            Ok(Event::Text(_)) | Ok(Event::CData(_)) => {}
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                if in_stanza && depth == 0 {
                    let tag_end = reader.buffer_position() as usize;
                    return Some(Unit {
                        kind: UnitKind::Stanza,
                        text: bytes_to_string(&buffer[stanza_start..tag_end]),
                        consumed: tag_end,
                    });
                }
            }
            Ok(Event::Eof) => {
                // Partial unit; more data needed.
                return None;
            }
            Err(quick_xml::Error::Syntax(SyntaxError::UnclosedTag)) => {
                // Expected under fragmentation: the span ends inside a tag.
                return None;
            }
            Err(e) => {
                error!(error = ?e, "XML parse error in stream");
                return None;
            }
        }
    }
}
