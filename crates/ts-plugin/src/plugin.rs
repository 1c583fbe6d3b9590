//! The host-facing plugin.

use crate::config::PluginOptions;
use crate::diagnostics::DiagnosticReporter;
use crate::export_class::fix_export_class;
use crate::filter::{Filter, FilterError};
use crate::helpers::{helpers_import, HELPERS_ID, HELPERS_SOURCE};
use crate::options::{resolve_options, OptionsError, ResolvedOptions};
use crate::resolver::ModuleResolver;
use crate::session::{CompilationSession, SessionError, Strategy};
use camino::{Utf8Path, Utf8PathBuf};
use source_map::{strip_source_mapping_url, RawSourceMap, SourceMapError};
use std::io::{self, Write};
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use ts_service::TypeScript;

/// Errors surfaced to the host.
#[derive(Debug, Error)]
pub enum PluginError {
    /// Invalid configuration; raised from [`TypeScriptPlugin::new`].
    #[error(transparent)]
    Options(#[from] OptionsError),

    #[error(transparent)]
    Filter(#[from] FilterError),

    #[error("cannot determine the working directory: {0}")]
    WorkingDirectory(String),

    #[error(transparent)]
    Session(#[from] SessionError),

    /// A file had error diagnostics. Already written to the reporter.
    #[error("There were TypeScript errors transpiling \"{id}\"")]
    Diagnostics {
        id: String,
        /// The host may carry on with the rest of the rebuild.
        deferred: bool,
    },

    #[error("TypeScript produced no output for \"{id}\"")]
    NoOutput { id: String },

    #[error("invalid source map emitted for \"{id}\": {source}")]
    SourceMap { id: String, source: SourceMapError },
}

impl PluginError {
    /// Whether the host should abort the build.
    ///
    /// Everything is fatal except error diagnostics on a rebuild when the
    /// plugin is configured to leave recovery to the host.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, PluginError::Diagnostics { deferred: true, .. })
    }
}

/// The result of transforming one module.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub code: String,
    pub map: Option<RawSourceMap>,
}

/// A TypeScript plugin instance: one per build, reused across rebuilds.
pub struct TypeScriptPlugin<W: Write = io::Stderr> {
    filter: Filter,
    session: CompilationSession,
    resolver: ModuleResolver,
    reporter: DiagnosticReporter<W>,
    resolved: ResolvedOptions,
    helpers_source: Option<String>,
    cwd: Utf8PathBuf,
    abort_on_rebuild_errors: bool,
    first_pass: bool,
    primed: bool,
}

impl TypeScriptPlugin {
    /// Creates a plugin reporting diagnostics to standard error.
    pub fn new(options: PluginOptions, typescript: Arc<dyn TypeScript>) -> Result<Self, PluginError> {
        Self::with_reporter(options, typescript, DiagnosticReporter::stderr())
    }
}

impl<W: Write> TypeScriptPlugin<W> {
    /// Creates a plugin reporting diagnostics through `reporter`.
    ///
    /// Options are resolved here, once; every configuration error surfaces
    /// before any file is compiled.
    pub fn with_reporter(
        options: PluginOptions,
        typescript: Arc<dyn TypeScript>,
        reporter: DiagnosticReporter<W>,
    ) -> Result<Self, PluginError> {
        let cwd = match options.cwd {
            Some(cwd) => cwd,
            None => current_dir()?,
        };

        let filter = Filter::new(options.include.as_ref(), options.exclude.as_ref(), &cwd)?;
        let resolved = resolve_options(
            &options.compiler_options,
            &options.tsconfig,
            &cwd,
            typescript.as_ref(),
        )?;

        let strategy = if options.use_language_service {
            Strategy::LanguageService
        } else {
            Strategy::Transpile
        };
        let session = CompilationSession::new(typescript.clone(), &resolved, strategy, &cwd)?;
        let resolver = ModuleResolver::new(
            typescript,
            resolved.converted.clone(),
            options.declaration_resolution,
        );

        debug!(%cwd, ?strategy, tsconfig = ?resolved.tsconfig, "typescript plugin ready");

        Ok(Self {
            filter,
            session,
            resolver,
            reporter,
            resolved,
            helpers_source: options.tslib,
            cwd,
            abort_on_rebuild_errors: options.abort_on_rebuild_errors,
            first_pass: true,
            primed: false,
        })
    }

    pub fn options(&self) -> &ResolvedOptions {
        &self.resolved
    }

    pub fn session(&self) -> &CompilationSession {
        &self.session
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    pub fn cwd(&self) -> &Utf8Path {
        &self.cwd
    }

    pub fn reporter(&self) -> &DiagnosticReporter<W> {
        &self.reporter
    }

    /// True until the first pass has been written.
    pub fn is_first_pass(&self) -> bool {
        self.first_pass
    }

    /// Called before a pass processes any file.
    ///
    /// The first call primes a language-service session with the project's
    /// declaration files.
    pub fn build_start(&mut self) -> Result<(), PluginError> {
        if !self.primed && self.session.strategy() == Strategy::LanguageService {
            self.session.prime_declarations()?;
        }
        self.primed = true;
        Ok(())
    }

    /// Resolves an import. `None` lets the host resolve it.
    pub fn resolve_id(&self, importee: &str, importer: Option<&str>) -> Option<String> {
        if importee == HELPERS_ID {
            return Some(HELPERS_ID.to_string());
        }
        self.resolver
            .resolve(importee, importer)
            .map(|path| path.into_string())
    }

    /// Supplies the source of the helper module.
    pub fn load(&self, id: &str) -> Option<&str> {
        if id != HELPERS_ID {
            return None;
        }
        Some(self.helpers_source.as_deref().unwrap_or(HELPERS_SOURCE))
    }

    /// Transpiles one module. `Ok(None)` means the filter skipped it.
    pub fn transform(&mut self, code: &str, id: &str) -> Result<Option<TransformOutput>, PluginError> {
        if !self.filter.matches(id) {
            return Ok(None);
        }

        let path = Utf8PathBuf::from(id.replace('\\', "/"));
        let source = fix_export_class(code, &path);
        let result = self.session.compile(&path, &source, !self.first_pass)?;

        if self.reporter.report(&result.diagnostics) {
            return Err(PluginError::Diagnostics {
                id: id.to_string(),
                deferred: !self.first_pass && !self.abort_on_rebuild_errors,
            });
        }
        if result.emit_skipped {
            return Err(PluginError::NoOutput { id: id.to_string() });
        }

        let map = result
            .source_map
            .as_deref()
            .map(RawSourceMap::from_json)
            .transpose()
            .map_err(|source| PluginError::SourceMap {
                id: id.to_string(),
                source,
            })?;

        // Helper emission is off by default in both strategies.
        let mut code = strip_source_mapping_url(&result.code).to_string();
        code.push_str(&helpers_import());

        Ok(Some(TransformOutput { code, map }))
    }

    /// Replaces the session's snapshot of a file changed outside the
    /// transform hook.
    pub fn refresh_file(&mut self, id: &str, code: &str) {
        let path = Utf8PathBuf::from(id.replace('\\', "/"));
        self.session.register(&path, code, true);
    }

    /// Called after a pass's output is written. Later passes are rebuilds.
    pub fn write_bundle(&mut self) {
        self.first_pass = false;
    }
}

fn current_dir() -> Result<Utf8PathBuf, PluginError> {
    let dir = std::env::current_dir().map_err(|e| PluginError::WorkingDirectory(e.to_string()))?;
    Utf8PathBuf::from_path_buf(dir)
        .map_err(|dir| PluginError::WorkingDirectory(format!("{} is not UTF-8", dir.display())))
}
