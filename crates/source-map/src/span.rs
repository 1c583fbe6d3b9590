//! Span and byte offset types for source positions.

use text_size::TextSize;

/// A byte offset into a source string.
pub type ByteOffset = TextSize;

/// A half-open byte range `[start, end)` in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Span {
    /// The start byte offset (inclusive).
    pub start: ByteOffset,
    /// The end byte offset (exclusive).
    pub end: ByteOffset,
}

impl Span {
    /// Creates a new span from start and end byte offsets.
    #[inline]
    pub fn new(start: impl Into<ByteOffset>, end: impl Into<ByteOffset>) -> Self {
        Self {
            start: start.into(),
            end: end.into(),
        }
    }

    /// Creates a span from a start offset and a length, as compilers report them.
    #[inline]
    pub fn at(start: u32, length: u32) -> Self {
        Self::new(start, start.saturating_add(length))
    }

    /// Returns the length of this span in bytes.
    #[inline]
    pub fn len(&self) -> TextSize {
        self.end - self.start
    }

    /// Returns true if this span is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_at() {
        let span = Span::at(4, 3);
        assert_eq!(span.start, TextSize::from(4));
        assert_eq!(span.end, TextSize::from(7));
        assert_eq!(span.len(), TextSize::from(3));
    }

    #[test]
    fn test_empty_span() {
        assert!(Span::at(3, 0).is_empty());
        assert!(!Span::at(3, 1).is_empty());
    }
}
