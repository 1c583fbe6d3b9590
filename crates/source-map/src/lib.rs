//! Source positions and source maps for ts-plugin.
//!
//! Compiler diagnostics arrive as byte offsets into a file's text and must be
//! reported as 1-based line/column pairs; emitted source maps arrive as JSON
//! text and must be handed to the bundler as objects. This crate covers both.

mod line_index;
mod raw;
mod span;

pub use line_index::{LineCol, LineIndex};
pub use raw::{strip_source_mapping_url, RawSourceMap, SourceMapError};
pub use span::{ByteOffset, Span};
