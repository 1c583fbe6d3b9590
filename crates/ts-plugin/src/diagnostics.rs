//! Diagnostic reporting.

use std::io::{self, Write};
use ts_service::Diagnostic;

/// "Cannot compile modules into 'es2015' when targeting 'ES5' or lower."
///
/// Every ES5 build trips it because the module kind is forced to ES2015 and
/// the bundler, not the compiler, handles the modules.
pub const SUPPRESSED_DIAGNOSTIC: u32 = 1204;

/// Formats diagnostics to a sink and decides whether they are fatal.
pub struct DiagnosticReporter<W: Write> {
    out: W,
}

impl DiagnosticReporter<io::Stderr> {
    /// A reporter writing to standard error.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write> DiagnosticReporter<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Writes every diagnostic except the suppressed one.
    ///
    /// Returns true if any written diagnostic is an error.
    pub fn report(&mut self, diagnostics: &[Diagnostic]) -> bool {
        let mut fatal = false;
        for diag in diagnostics {
            if diag.code == SUPPRESSED_DIAGNOSTIC {
                continue;
            }
            fatal |= diag.is_error();
            // A closed sink must not turn a warning into a failure.
            let _ = writeln!(self.out, "{}", format_diagnostic(diag));
        }
        let _ = self.out.flush();
        fatal
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// Formats one diagnostic.
///
/// Located diagnostics always read `error TS<code>` whatever their category;
/// only [`DiagnosticReporter::report`] looks at the category.
pub fn format_diagnostic(diag: &Diagnostic) -> String {
    let message = diag.message.flatten();
    match diag.location() {
        Some((file, position)) => {
            let (line, col) = position.one_based();
            format!(
                "{}({},{}): error TS{}: {}",
                file.name, line, col, diag.code, message
            )
        }
        None => format!("Error: {message}"),
    }
}
