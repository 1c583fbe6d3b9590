//! Line index for offset → line/column conversion.

use crate::ByteOffset;
use text_size::TextSize;

/// A line and column position (0-indexed).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct LineCol {
    /// 0-indexed line number.
    pub line: u32,
    /// 0-indexed column.
    pub col: u32,
}

impl LineCol {
    /// Creates a new line/column position.
    #[inline]
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    /// Returns the 1-based `(line, column)` pair used in compiler-style messages.
    #[inline]
    pub fn one_based(self) -> (u32, u32) {
        (self.line + 1, self.col + 1)
    }
}

/// An index over the line starts of a text.
///
/// Lookups are O(log n) in the number of lines.
#[derive(Debug, Clone)]
pub struct LineIndex {
    /// `line_starts[i]` is the byte offset where line `i` begins.
    line_starts: Vec<ByteOffset>,
}

impl LineIndex {
    /// Creates a new line index from source text.
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![TextSize::from(0)];

        for (offset, c) in text.char_indices() {
            if c == '\n' {
                line_starts.push(TextSize::from((offset + 1) as u32));
            }
        }

        Self { line_starts }
    }

    /// Converts a byte offset to a line and byte column.
    pub fn line_col(&self, offset: ByteOffset) -> LineCol {
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(line) => line.saturating_sub(1),
        };

        let line_start = self.line_starts[line];
        LineCol {
            line: line as u32,
            col: u32::from(offset) - u32::from(line_start),
        }
    }

    /// Converts a byte offset to a line and a column counted in UTF-16 code
    /// units, which is how TypeScript reports character positions.
    ///
    /// Returns `None` if the offset is past the end of `text` or does not fall
    /// on a character boundary.
    pub fn line_col_utf16(&self, text: &str, offset: ByteOffset) -> Option<LineCol> {
        let end = u32::from(offset) as usize;
        if end > text.len() || !text.is_char_boundary(end) {
            return None;
        }

        let LineCol { line, .. } = self.line_col(offset);
        let start = u32::from(self.line_starts[line as usize]) as usize;
        let col = text[start..end].encode_utf16().count() as u32;

        Some(LineCol { line, col })
    }
}
