//! Segmented input buffer with zero-copy contiguous spans.

use bytes::{Buf, Bytes, BytesMut};
use std::collections::VecDeque;

/// Buffer of received bytes, kept as a queue of segments.
///
/// Each segment is one network read. [`InputBuffer::contiguous`] hands out a
/// cheap handle to the front segment without copying; [`InputBuffer::coalesce`]
/// rebuilds the queue as a single segment when a caller needs all buffered
/// bytes in one contiguous region.
#[derive(Debug, Default)]
pub struct InputBuffer {
    segments: VecDeque<Bytes>,
    len: usize,
}

impl InputBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of buffered bytes across all segments.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when no bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Append one segment (typically a single network read).
    ///
    /// Empty segments are dropped.
    pub fn push(&mut self, segment: Bytes) {
        if segment.is_empty() {
            return;
        }
        self.len += segment.len();
        self.segments.push_back(segment);
    }

    /// Handle to the longest run of bytes addressable without copying: the
    /// front segment, clamped to `max` when given.
    ///
    /// Returns an empty handle when the buffer is empty. Never copies; the
    /// returned [`Bytes`] shares storage with the buffer, so it stays valid
    /// even if the corresponding bytes are drained afterwards.
    pub fn contiguous(&self, max: Option<usize>) -> Bytes {
        match self.segments.front() {
            Some(front) => match max {
                Some(max) if max < front.len() => front.slice(..max),
                _ => front.clone(),
            },
            None => Bytes::new(),
        }
    }

    /// Force all buffered bytes into one contiguous segment and return a
    /// handle to it.
    ///
    /// Copies only when the buffer currently holds more than one segment,
    /// and never more than `len()` bytes.
    pub fn coalesce(&mut self) -> Bytes {
        if self.segments.len() > 1 {
            let mut merged = BytesMut::with_capacity(self.len);
            for segment in &self.segments {
                merged.extend_from_slice(segment);
            }
            self.segments.clear();
            self.segments.push_back(merged.freeze());
        }
        self.contiguous(None)
    }

    /// Drop the first `n` buffered bytes.
    ///
    /// `n` must not exceed `len()`; draining more than is buffered empties
    /// the buffer.
    pub fn drain(&mut self, n: usize) {
        debug_assert!(n <= self.len, "drain({}) exceeds buffered {}", n, self.len);
        let mut remaining = n.min(self.len);
        self.len -= remaining;
        while remaining > 0 {
            let Some(front) = self.segments.front_mut() else {
                break;
            };
            if front.len() <= remaining {
                remaining -= front.len();
                self.segments.pop_front();
            } else {
                front.advance(remaining);
                remaining = 0;
            }
        }
    }

    /// Number of segments currently held.
    #[cfg(test)]
    pub(crate) fn segment_count(&self) -> usize {
        self.segments.len()
    }
}
