//! TypeScript transpilation for bundlers.
//!
//! The crate sits between a bundler's plugin hooks and a TypeScript compiler
//! ([`ts_service::TypeScript`]):
//!
//! - [`options`] merges defaults, the project's tsconfig and caller overrides
//!   into one validated option set,
//! - [`session`] compiles files either one at a time or through a
//!   long-lived language service,
//! - [`diagnostics`] reports compiler findings and decides which are fatal,
//! - [`resolver`] resolves imports with the compiler's own module resolution.
//!
//! [`TypeScriptPlugin`] wires them to the hooks a bundler calls.
//!
//! # Example
//!
//! ```ignore
//! use ts_plugin::{PluginOptions, TypeScriptPlugin};
//!
//! let mut plugin = TypeScriptPlugin::new(PluginOptions::default(), typescript)?;
//! plugin.build_start()?;
//! let output = plugin.transform(source, "/project/src/main.ts")?;
//! plugin.write_bundle();
//! ```

pub mod config;
pub mod diagnostics;
pub mod export_class;
pub mod filter;
pub mod helpers;
pub mod options;
pub mod plugin;
pub mod resolver;
pub mod session;

pub use config::{DeclarationPolicy, Patterns, PluginOptions, TsConfigSource};
pub use diagnostics::{format_diagnostic, DiagnosticReporter, SUPPRESSED_DIAGNOSTIC};
pub use filter::{Filter, FilterError};
pub use helpers::{HELPERS_ID, HELPERS_SOURCE};
pub use options::{resolve_options, CompilerOptions, ModuleKind, OptionsError, ResolvedOptions};
pub use plugin::{PluginError, TransformOutput, TypeScriptPlugin};
pub use resolver::ModuleResolver;
pub use session::{CompilationSession, CompileResult, SessionError, Strategy};
