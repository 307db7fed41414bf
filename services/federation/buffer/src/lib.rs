//! Segmented input/output byte buffers for federation transports.
//!
//! Network reads arrive in arbitrarily sized chunks. The [`InputBuffer`]
//! keeps each chunk as its own segment so that the common case (a read that
//! already contains complete protocol units) can be parsed without copying,
//! while [`InputBuffer::coalesce`] provides the fallback of one contiguous
//! region when a unit straddles a segment boundary. The [`OutputBuffer`]
//! accumulates outbound bytes in append order until the transport flushes
//! them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod input;
pub mod output;

pub use input::InputBuffer;
pub use output::OutputBuffer;
