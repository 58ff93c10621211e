//! Source location tracking.
//!
//! Positions live in a single global space shared by every file in a
//! [`SourceMap`](crate::source::SourceMap), so a `Span` alone identifies both
//! the file and the range within it.

use std::fmt;
use std::ops::Range;

/// An absolute byte position in the global source space.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct BytePos(pub u32);

impl BytePos {
    /// Creates a new byte position.
    #[inline]
    pub const fn new(pos: u32) -> Self {
        Self(pos)
    }

    /// Returns the position as a usize.
    #[inline]
    pub const fn to_usize(self) -> usize {
        self.0 as usize
    }

    /// Returns the position as a u32.
    #[inline]
    pub const fn to_u32(self) -> u32 {
        self.0
    }
}

impl From<u32> for BytePos {
    #[inline]
    fn from(pos: u32) -> Self {
        Self(pos)
    }
}

impl fmt::Debug for BytePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BytePos({})", self.0)
    }
}

impl fmt::Display for BytePos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A half-open byte range `[start, end)` in the global source space.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// The start position (inclusive).
    pub start: BytePos,
    /// The end position (exclusive).
    pub end: BytePos,
}

impl Span {
    /// Creates a new span from start and end positions.
    #[inline]
    pub const fn new(start: BytePos, end: BytePos) -> Self {
        Self { start, end }
    }

    /// Creates a new span from raw u32 positions.
    #[inline]
    pub const fn from_u32(start: u32, end: u32) -> Self {
        Self {
            start: BytePos(start),
            end: BytePos(end),
        }
    }

    /// A dummy span for generated nodes with no source location.
    #[inline]
    pub const fn dummy() -> Self {
        Self {
            start: BytePos(0),
            end: BytePos(0),
        }
    }

    /// Returns true if this is a dummy span.
    #[inline]
    pub const fn is_dummy(&self) -> bool {
        self.start.0 == 0 && self.end.0 == 0
    }

    /// Returns the length of the span in bytes.
    #[inline]
    pub const fn len(&self) -> u32 {
        self.end.0.saturating_sub(self.start.0)
    }

    /// Returns true if the span is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.start.0 >= self.end.0
    }

    /// Returns the smallest span containing both spans.
    #[inline]
    pub fn merge(self, other: Span) -> Span {
        Span {
            start: BytePos(self.start.0.min(other.start.0)),
            end: BytePos(self.end.0.max(other.end.0)),
        }
    }

    /// A span from this span's start to the other span's end.
    #[inline]
    pub const fn to(self, other: Span) -> Span {
        Span {
            start: self.start,
            end: other.end,
        }
    }

    /// Converts to a `Range<usize>` for indexing.
    #[inline]
    pub const fn to_range(&self) -> Range<usize> {
        self.start.to_usize()..self.end.to_usize()
    }
}

impl From<Range<u32>> for Span {
    #[inline]
    fn from(range: Range<u32>) -> Self {
        Self::from_u32(range.start, range.end)
    }
}

impl From<Range<usize>> for Span {
    #[inline]
    fn from(range: Range<usize>) -> Self {
        Self::from_u32(range.start as u32, range.end as u32)
    }
}

impl fmt::Debug for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.0, self.end.0)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start.0, self.end.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_basic() {
        let span = Span::from_u32(10, 20);
        assert_eq!(span.len(), 10);
        assert!(!span.is_empty());
        assert!(!span.is_dummy());
        assert_eq!(span.to_range(), 10..20);
    }

    #[test]
    fn test_span_dummy() {
        let dummy = Span::dummy();
        assert!(dummy.is_dummy());
        assert!(dummy.is_empty());
    }

    #[test]
    fn test_span_merge() {
        let merged = Span::from_u32(10, 20).merge(Span::from_u32(15, 30));
        assert_eq!(merged, Span::from_u32(10, 30));
    }

    #[test]
    fn test_span_to() {
        let combined = Span::from_u32(10, 20).to(Span::from_u32(25, 35));
        assert_eq!(combined, Span::from_u32(10, 35));
    }

    #[test]
    fn test_span_from_range() {
        let span: Span = (5u32..15u32).into();
        assert_eq!(span, Span::from_u32(5, 15));
    }
}
