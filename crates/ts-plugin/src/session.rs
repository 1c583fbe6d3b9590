//! Compilation sessions.
//!
//! A session compiles one file at a time with one of two strategies, chosen
//! when the session is created:
//!
//! - [`Strategy::Transpile`] transpiles every file in isolation, carrying no
//!   state between calls.
//! - [`Strategy::LanguageService`] keeps a language service alive and feeds it
//!   versioned snapshots, so unchanged files are served from its cache and
//!   type information flows between files.

use crate::options::ResolvedOptions;
use camino::{Utf8Path, Utf8PathBuf};
use indexmap::IndexSet;
use rustc_hash::FxHashMap;
use serde_json::{Map, Value};
use std::cell::{Cell, RefCell};
use std::fs;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use ts_service::{
    CustomTransformers, Diagnostic, Feature, LanguageService, LanguageServiceHost, ScriptVersion,
    ServiceError, Snapshot, TranspileRequest, TypeScript,
};
use walkdir::WalkDir;

/// Directory holding ambient type packages, relative to the working directory.
const AMBIENT_TYPES_DIR: &str = "node_modules/@types";

/// Suffixes of declaration files.
pub const DECLARATION_SUFFIXES: [&str; 3] = [".d.ts", ".d.mts", ".d.cts"];

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },
}

/// How files are compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Transpile,
    LanguageService,
}

/// Output of one compile call.
#[derive(Debug, Clone, Default)]
pub struct CompileResult {
    pub code: String,
    pub source_map: Option<String>,
    pub diagnostics: Vec<Diagnostic>,
    /// The compiler produced no JavaScript for the file.
    pub emit_skipped: bool,
}

/// A file as last shown to the language service.
#[derive(Debug, Clone)]
struct FileRecord {
    /// `None` when the file does not exist.
    snapshot: Option<Snapshot>,
    version: ScriptVersion,
}

/// Per-file snapshots and the set of files in the compilation.
///
/// The language service pulls from this store through
/// [`LanguageServiceHost`]. Files it asks about that were never supplied are
/// read from disk on first access.
struct FileStore {
    cwd: Utf8PathBuf,
    settings: Map<String, Value>,
    records: RefCell<FxHashMap<Utf8PathBuf, FileRecord>>,
    tracked: IndexSet<Utf8PathBuf>,
    counter: Cell<u64>,
}

impl FileStore {
    fn new(cwd: Utf8PathBuf, settings: Map<String, Value>) -> Self {
        Self {
            cwd,
            settings,
            records: RefCell::new(FxHashMap::default()),
            tracked: IndexSet::new(),
            counter: Cell::new(0),
        }
    }

    fn next_version(&self) -> ScriptVersion {
        let next = self.counter.get() + 1;
        self.counter.set(next);
        ScriptVersion(next)
    }

    /// Records `content` for `path` unless a snapshot exists and either
    /// refreshing is not allowed or the content is unchanged. Returns the
    /// version now current.
    fn update(&mut self, path: &Utf8Path, content: &str, allow_refresh: bool) -> ScriptVersion {
        self.tracked.insert(path.to_path_buf());

        let existing = self.records.get_mut().get(path).and_then(|record| {
            let snapshot = record.snapshot.as_deref()?;
            Some((record.version, snapshot == content))
        });

        match existing {
            Some((version, unchanged)) if !allow_refresh || unchanged => version,
            _ => {
                let version = self.next_version();
                self.records.get_mut().insert(
                    path.to_path_buf(),
                    FileRecord {
                        snapshot: Some(Arc::from(content)),
                        version,
                    },
                );
                version
            }
        }
    }

    /// Returns the record for `path`, reading the file from disk if the
    /// store has never seen it.
    fn record(&self, path: &Utf8Path) -> FileRecord {
        if let Some(record) = self.records.borrow().get(path) {
            return record.clone();
        }

        let snapshot = fs::read_to_string(path).ok().map(Snapshot::from);
        debug!(file = %path, found = snapshot.is_some(), "loading file from disk");
        let record = FileRecord {
            snapshot,
            version: self.next_version(),
        };
        self.records
            .borrow_mut()
            .insert(path.to_path_buf(), record.clone());
        record
    }

    fn version(&self, path: &Utf8Path) -> Option<ScriptVersion> {
        self.records.borrow().get(path).map(|record| record.version)
    }
}

impl LanguageServiceHost for FileStore {
    fn script_file_names(&self) -> Vec<Utf8PathBuf> {
        self.tracked.iter().cloned().collect()
    }

    fn script_version(&self, file_name: &Utf8Path) -> Option<ScriptVersion> {
        let record = self.record(file_name);
        record.snapshot.map(|_| record.version)
    }

    fn script_snapshot(&self, file_name: &Utf8Path) -> Option<Snapshot> {
        self.record(file_name).snapshot
    }

    fn current_directory(&self) -> &Utf8Path {
        &self.cwd
    }

    fn compilation_settings(&self) -> &Map<String, Value> {
        &self.settings
    }
}

enum Engine {
    Transpile {
        settings: Map<String, Value>,
    },
    LanguageService {
        service: Box<dyn LanguageService>,
        files: FileStore,
    },
}

/// Compiles files for one plugin instance.
pub struct CompilationSession {
    typescript: Arc<dyn TypeScript>,
    transformers: Option<CustomTransformers>,
    cwd: Utf8PathBuf,
    engine: Engine,
}

impl CompilationSession {
    /// Starts a session with resolved options.
    pub fn new(
        typescript: Arc<dyn TypeScript>,
        options: &ResolvedOptions,
        strategy: Strategy,
        cwd: &Utf8Path,
    ) -> Result<Self, SessionError> {
        let transformers = options.transformers.clone().filter(|t| !t.is_empty());
        let mut settings = options.converted.clone();

        let engine = match strategy {
            Strategy::Transpile => Engine::Transpile { settings },
            Strategy::LanguageService => {
                let wants_ambient_types =
                    options.options.types.is_none() && options.options.type_roots.is_none();
                if wants_ambient_types && typescript.version().supports(Feature::AmbientTypes) {
                    let types = ambient_types(cwd);
                    if !types.is_empty() {
                        debug!(?types, "using ambient type packages");
                        settings.insert(
                            "types".to_string(),
                            Value::Array(types.into_iter().map(Value::String).collect()),
                        );
                    }
                }

                let service = typescript.create_language_service(transformers.as_ref())?;
                Engine::LanguageService {
                    service,
                    files: FileStore::new(cwd.to_path_buf(), settings),
                }
            }
        };

        Ok(Self {
            typescript,
            transformers,
            cwd: cwd.to_path_buf(),
            engine,
        })
    }

    pub fn strategy(&self) -> Strategy {
        match self.engine {
            Engine::Transpile { .. } => Strategy::Transpile,
            Engine::LanguageService { .. } => Strategy::LanguageService,
        }
    }

    /// The options the compiler runs with.
    pub fn compilation_settings(&self) -> &Map<String, Value> {
        match &self.engine {
            Engine::Transpile { settings } => settings,
            Engine::LanguageService { files, .. } => &files.settings,
        }
    }

    /// Compiles one file.
    ///
    /// With the language service, `content` replaces the file's snapshot only
    /// if the file has none yet or `allow_refresh` is set.
    pub fn compile(
        &mut self,
        file: &Utf8Path,
        content: &str,
        allow_refresh: bool,
    ) -> Result<CompileResult, SessionError> {
        let path = self.absolute(file);

        match &mut self.engine {
            Engine::Transpile { settings } => {
                let output = self.typescript.transpile_module(TranspileRequest {
                    file_name: &path,
                    source: content,
                    compiler_options: settings,
                    transformers: self.transformers.as_ref(),
                })?;
                Ok(CompileResult {
                    code: output.output_text,
                    source_map: output.source_map_text,
                    diagnostics: output.diagnostics,
                    emit_skipped: false,
                })
            }
            Engine::LanguageService { service, files } => {
                let version = files.update(&path, content, allow_refresh);
                debug!(file = %path, %version, "compiling with language service");

                let emitted = service.emit_output(&*files, &path)?;
                let mut diagnostics = service.compiler_options_diagnostics(&*files)?;
                diagnostics.extend(service.syntactic_diagnostics(&*files, &path)?);
                diagnostics.extend(service.semantic_diagnostics(&*files, &path)?);

                let mut code = None;
                let mut source_map = None;
                for output in emitted.output_files {
                    if output.name.as_str().ends_with(".map") {
                        source_map = Some(output.text);
                    } else if is_script_output(&output.name) {
                        code = Some(output.text);
                    }
                }

                Ok(CompileResult {
                    emit_skipped: emitted.emit_skipped || code.is_none(),
                    code: code.unwrap_or_default(),
                    source_map,
                    diagnostics,
                })
            }
        }
    }

    /// Registers a file without compiling it. A no-op for the transpile
    /// strategy.
    pub fn register(&mut self, file: &Utf8Path, content: &str, allow_refresh: bool) {
        let path = self.absolute(file);
        if let Engine::LanguageService { files, .. } = &mut self.engine {
            files.update(&path, content, allow_refresh);
        }
    }

    /// Registers every declaration file under the working directory, outside
    /// `node_modules`, so ambient declarations are visible to later compiles.
    ///
    /// Declaration files are taken as static: later calls do not refresh
    /// them. Returns the number of files registered.
    pub fn prime_declarations(&mut self) -> Result<usize, SessionError> {
        if self.strategy() != Strategy::LanguageService {
            return Ok(0);
        }

        let declarations: Vec<Utf8PathBuf> = WalkDir::new(&self.cwd)
            .into_iter()
            .filter_entry(|e| e.file_name() != "node_modules")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| Utf8PathBuf::try_from(e.into_path()).ok())
            .filter(|p| is_declaration_file(p))
            .collect();

        for path in &declarations {
            let content = fs::read_to_string(path).map_err(|source| SessionError::Read {
                path: path.clone(),
                source,
            })?;
            self.register(path, &content, false);
        }

        debug!(count = declarations.len(), "primed declaration files");
        Ok(declarations.len())
    }

    /// The version of a file's current snapshot, if the session holds one.
    pub fn file_version(&self, file: &Utf8Path) -> Option<ScriptVersion> {
        match &self.engine {
            Engine::Transpile { .. } => None,
            Engine::LanguageService { files, .. } => files.version(&self.absolute(file)),
        }
    }

    /// Files declared to the language service, in registration order.
    pub fn tracked_files(&self) -> Vec<&Utf8Path> {
        match &self.engine {
            Engine::Transpile { .. } => Vec::new(),
            Engine::LanguageService { files, .. } => {
                files.tracked.iter().map(|p| p.as_path()).collect()
            }
        }
    }

    fn absolute(&self, file: &Utf8Path) -> Utf8PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.cwd.join(file)
        }
    }
}

/// Returns true for `.d.ts`-style declaration files.
pub fn is_declaration_file(path: &Utf8Path) -> bool {
    DECLARATION_SUFFIXES
        .iter()
        .any(|suffix| path.as_str().ends_with(suffix))
}

fn is_script_output(name: &Utf8Path) -> bool {
    matches!(name.extension(), Some("js" | "jsx" | "mjs" | "cjs"))
}

/// Names of the packages under `node_modules/@types`, sorted.
fn ambient_types(cwd: &Utf8Path) -> Vec<String> {
    let dir = cwd.join(AMBIENT_TYPES_DIR);
    let Ok(entries) = fs::read_dir(&dir) else {
        return Vec::new();
    };

    let mut types: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|e| e.file_name().into_string().ok())
        .collect();
    types.sort();
    types
}
