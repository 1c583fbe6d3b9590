//! Compiler service traits and the values that cross them.

use crate::{CompilerVersion, Diagnostic};
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Immutable file text handed to the compiler.
pub type Snapshot = Arc<str>;

/// A per-file version token.
///
/// The incremental engine treats any change of token as "content changed"
/// and reuses cached analysis otherwise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScriptVersion(pub u64);

impl fmt::Display for ScriptVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors raised by a compiler service implementation.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The compiler could not be started or has gone away.
    #[error("compiler unavailable: {0}")]
    Unavailable(String),

    /// The compiler answered something that could not be understood.
    #[error("compiler protocol error: {0}")]
    Protocol(String),

    /// The compiler threw while handling a request.
    #[error("compiler request failed: {0}")]
    Failed(String),
}

/// Result of running options through the compiler's own converter.
#[derive(Debug, Clone, Default)]
pub struct ConvertedOptions {
    /// Options in the compiler's internal representation.
    pub options: Map<String, Value>,
    /// One entry per rejected option.
    pub errors: Vec<Diagnostic>,
}

/// Transformer factories to run around emit.
///
/// Entries are module specifiers of the form `path#export`, loaded by the
/// compiler side relative to the working directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomTransformers {
    #[serde(default)]
    pub before: Vec<String>,
    #[serde(default)]
    pub after: Vec<String>,
}

impl CustomTransformers {
    /// Returns true when no transformer is configured.
    pub fn is_empty(&self) -> bool {
        self.before.is_empty() && self.after.is_empty()
    }
}

/// A single-file transpile request.
#[derive(Debug, Clone, Copy)]
pub struct TranspileRequest<'a> {
    pub file_name: &'a Utf8Path,
    pub source: &'a str,
    /// Converted compiler options.
    pub compiler_options: &'a Map<String, Value>,
    pub transformers: Option<&'a CustomTransformers>,
}

/// Output of a single-file transpile.
#[derive(Debug, Clone, Default)]
pub struct TranspileOutput {
    pub output_text: String,
    pub source_map_text: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
}

/// A module the compiler's resolver found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedModule {
    pub resolved_file_name: Utf8PathBuf,
    /// The file was found under a package directory.
    pub is_external_library_import: bool,
}

/// One file produced by an emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub name: Utf8PathBuf,
    pub text: String,
}

/// Everything an incremental emit produced for one input file.
///
/// May contain declarations and maps alongside the JavaScript.
#[derive(Debug, Clone, Default)]
pub struct EmitOutput {
    pub output_files: Vec<OutputFile>,
    pub emit_skipped: bool,
}

/// What an incremental engine pulls from its owner on every request.
pub trait LanguageServiceHost {
    /// Files that belong to the compilation.
    fn script_file_names(&self) -> Vec<Utf8PathBuf>;

    /// Current version of a file; `None` if the file does not exist.
    fn script_version(&self, file_name: &Utf8Path) -> Option<ScriptVersion>;

    /// Current content of a file; `None` if the file does not exist.
    fn script_snapshot(&self, file_name: &Utf8Path) -> Option<Snapshot>;

    fn current_directory(&self) -> &Utf8Path;

    /// Converted compiler options.
    fn compilation_settings(&self) -> &Map<String, Value>;
}

/// A long-lived incremental compilation engine.
pub trait LanguageService {
    /// Emits `file_name` using the host's current view of the program.
    fn emit_output(
        &mut self,
        host: &dyn LanguageServiceHost,
        file_name: &Utf8Path,
    ) -> Result<EmitOutput, ServiceError>;

    /// Diagnostics about the compiler options themselves.
    fn compiler_options_diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
    ) -> Result<Vec<Diagnostic>, ServiceError>;

    fn syntactic_diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
        file_name: &Utf8Path,
    ) -> Result<Vec<Diagnostic>, ServiceError>;

    fn semantic_diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
        file_name: &Utf8Path,
    ) -> Result<Vec<Diagnostic>, ServiceError>;
}

/// A TypeScript compiler instance.
pub trait TypeScript {
    fn version(&self) -> &CompilerVersion;

    /// Validates JSON-shaped options and converts them to the compiler's
    /// internal form. Unknown names and invalid values are returned as
    /// errors rather than raised.
    fn convert_compiler_options(
        &self,
        options: &Map<String, Value>,
        base_path: &Utf8Path,
    ) -> Result<ConvertedOptions, ServiceError>;

    /// Transpiles one file in isolation.
    fn transpile_module(
        &self,
        request: TranspileRequest<'_>,
    ) -> Result<TranspileOutput, ServiceError>;

    /// Runs the compiler's node-style module resolution.
    ///
    /// `options` is `None` for compilers whose resolver predates option
    /// support.
    fn resolve_module_name(
        &self,
        module_name: &str,
        containing_file: &Utf8Path,
        options: Option<&Map<String, Value>>,
    ) -> Result<Option<ResolvedModule>, ServiceError>;

    /// Starts a new incremental engine.
    fn create_language_service(
        &self,
        transformers: Option<&CustomTransformers>,
    ) -> Result<Box<dyn LanguageService>, ServiceError>;
}
