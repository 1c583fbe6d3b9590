//! Compiler diagnostics.

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use source_map::{LineCol, LineIndex, Span};
use std::fmt;
use std::sync::Arc;

/// Diagnostic category, mirroring the compiler's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticCategory {
    Warning,
    Error,
    Suggestion,
    Message,
}

impl DiagnosticCategory {
    /// Lower-case label used in formatted output.
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCategory::Warning => "warning",
            DiagnosticCategory::Error => "error",
            DiagnosticCategory::Suggestion => "suggestion",
            DiagnosticCategory::Message => "message",
        }
    }
}

impl fmt::Display for DiagnosticCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A diagnostic message: either plain text or a chain of nested details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DiagnosticMessage {
    Text(String),
    Chain {
        #[serde(rename = "messageText")]
        text: String,
        #[serde(default)]
        next: Vec<DiagnosticMessage>,
    },
}

impl DiagnosticMessage {
    /// Flattens the chain into one string.
    ///
    /// Each nested level starts on a new line indented by two spaces per
    /// depth, matching the compiler's own formatter.
    pub fn flatten(&self) -> String {
        let mut out = String::new();
        self.flatten_into(&mut out, 0);
        out
    }

    fn flatten_into(&self, out: &mut String, depth: usize) {
        if depth > 0 {
            out.push('\n');
            for _ in 0..depth {
                out.push_str("  ");
            }
        }
        match self {
            DiagnosticMessage::Text(text) => out.push_str(text),
            DiagnosticMessage::Chain { text, next } => {
                out.push_str(text);
                for child in next {
                    child.flatten_into(out, depth + 1);
                }
            }
        }
    }
}

impl From<&str> for DiagnosticMessage {
    fn from(text: &str) -> Self {
        DiagnosticMessage::Text(text.to_string())
    }
}

impl From<String> for DiagnosticMessage {
    fn from(text: String) -> Self {
        DiagnosticMessage::Text(text)
    }
}

/// The file a diagnostic points into, with the text the position refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticFile {
    pub name: Utf8PathBuf,
    pub text: Arc<str>,
}

/// A finding reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Numeric diagnostic code (`2304` for `TS2304`).
    pub code: u32,
    pub category: DiagnosticCategory,
    pub message: DiagnosticMessage,
    /// Originating file, when the diagnostic is tied to one.
    pub file: Option<DiagnosticFile>,
    /// Byte range within `file`.
    pub span: Option<Span>,
}

impl Diagnostic {
    /// Creates a diagnostic that is not tied to a file.
    pub fn global(
        code: u32,
        category: DiagnosticCategory,
        message: impl Into<DiagnosticMessage>,
    ) -> Self {
        Self {
            code,
            category,
            message: message.into(),
            file: None,
            span: None,
        }
    }

    /// Attaches a file and byte range.
    pub fn in_file(mut self, name: impl Into<Utf8PathBuf>, text: Arc<str>, span: Span) -> Self {
        self.file = Some(DiagnosticFile {
            name: name.into(),
            text,
        });
        self.span = Some(span);
        self
    }

    /// Returns true for error-category diagnostics.
    pub fn is_error(&self) -> bool {
        self.category == DiagnosticCategory::Error
    }

    /// Resolves the start of the diagnostic to a 0-based line and UTF-16 column.
    pub fn location(&self) -> Option<(&DiagnosticFile, LineCol)> {
        let file = self.file.as_ref()?;
        let span = self.span?;
        let index = LineIndex::new(&file.text);
        let line_col = index.line_col_utf16(&file.text, span.start)?;
        Some((file, line_col))
    }
}
