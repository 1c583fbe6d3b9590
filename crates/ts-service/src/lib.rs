//! The TypeScript compiler seen as a capability-versioned service.
//!
//! ts-plugin never parses, type-checks or emits code itself. Everything it
//! needs from a compiler goes through the traits in this crate:
//!
//! - [`TypeScript`]: the stateless entry points (option conversion, single-file
//!   transpilation, module resolution) and the factory for
//!   [`LanguageService`] sessions.
//! - [`LanguageService`]: an incremental engine that pulls file names,
//!   versions and snapshots from a [`LanguageServiceHost`] and caches analysis
//!   for files whose version did not change.
//!
//! Feature availability is decided by [`CompilerVersion::supports`] only.

mod diagnostic;
mod service;
mod version;

pub use diagnostic::{Diagnostic, DiagnosticCategory, DiagnosticFile, DiagnosticMessage};
pub use service::{
    ConvertedOptions, CustomTransformers, EmitOutput, LanguageService, LanguageServiceHost,
    OutputFile, ResolvedModule, ScriptVersion, ServiceError, Snapshot, TranspileOutput,
    TranspileRequest, TypeScript,
};
pub use version::{CompilerVersion, Feature, VersionError};
