//! node process runner.

use crate::protocol::{
    ConvertedResult, Envelope, JsDiagnostic, Ready, Request, ResolveResult, Response,
    ServiceCreated, TranspileResult,
};
use crate::service::TscLanguageService;
use blake3::Hasher;
use camino::{Utf8Path, Utf8PathBuf};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::fs;
use std::io::{BufRead, BufReader, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::debug;
use ts_service::{
    CompilerVersion, ConvertedOptions, CustomTransformers, LanguageService, ResolvedModule,
    ServiceError, TranspileOutput, TranspileRequest, TypeScript,
};

const RUNNER_SCRIPT_FILENAME: &str = "tsc-runner.cjs";
const RUNNER_SCRIPT_SOURCE: &str = r#"'use strict';
const { createInterface } = require('node:readline');
const { createRequire } = require('node:module');
const path = require('node:path');

const cwd = process.cwd();
const requireFromCwd = createRequire(path.join(cwd, 'noop.js'));

let ts = null;
try {
  const target = process.argv[2];
  ts = target ? require(path.resolve(cwd, target)) : requireFromCwd('typescript');
} catch (err) {
  const message = err && err.message ? err.message : String(err);
  console.error(`ts-plugin runner failed to load typescript: ${message}`);
  process.exit(2);
}

const CATEGORIES = ['warning', 'error', 'suggestion', 'message'];

function byteOffset(text, index) {
  return Buffer.byteLength(text.slice(0, index), 'utf8');
}

function messageOf(message) {
  if (typeof message === 'string') return message;
  const next = message.next == null ? [] : Array.isArray(message.next) ? message.next : [message.next];
  return { messageText: message.messageText, next: next.map(messageOf) };
}

function diagnosticOf(diag) {
  const out = {
    code: diag.code,
    category: CATEGORIES[diag.category] || 'error',
    message: messageOf(diag.messageText),
  };
  if (diag.file && typeof diag.start === 'number') {
    const text = diag.file.text;
    const start = byteOffset(text, diag.start);
    out.file = diag.file.fileName;
    out.start = start;
    out.length = byteOffset(text, diag.start + (diag.length || 0)) - start;
  }
  return out;
}

const transformerCache = new Map();

function loadTransformers(spec) {
  if (!spec) return undefined;
  const key = JSON.stringify(spec);
  if (transformerCache.has(key)) return transformerCache.get(key);
  const load = (entry) => {
    const hash = entry.lastIndexOf('#');
    const request = hash === -1 ? entry : entry.slice(0, hash);
    const name = hash === -1 ? 'default' : entry.slice(hash + 1);
    const mod = requireFromCwd(request);
    const factory = name === 'default' && typeof mod === 'function' ? mod : mod[name];
    if (typeof factory !== 'function') {
      throw new Error(`transformer '${entry}' does not export a function`);
    }
    return factory;
  };
  const transformers = { before: (spec.before || []).map(load), after: (spec.after || []).map(load) };
  transformerCache.set(key, transformers);
  return transformers;
}

const services = new Map();
let nextService = 1;

function serviceOf(id) {
  const state = services.get(id);
  if (!state) throw new Error(`unknown language service ${id}`);
  return state;
}

function readFromDisk(fileName) {
  if (!ts.sys.fileExists(fileName)) return undefined;
  const text = ts.sys.readFile(fileName);
  return text === undefined ? undefined : ts.ScriptSnapshot.fromString(text);
}

const handlers = {
  convertOptions({ options, basePath }) {
    const converted = ts.convertCompilerOptionsFromJson(options, basePath);
    return { options: converted.options, errors: converted.errors.map(diagnosticOf) };
  },

  transpile({ fileName, source, options, transformers }) {
    const result = ts.transpileModule(source, {
      fileName,
      compilerOptions: options,
      reportDiagnostics: true,
      transformers: loadTransformers(transformers),
    });
    return {
      outputText: result.outputText,
      sourceMapText: result.sourceMapText === undefined ? null : result.sourceMapText,
      diagnostics: (result.diagnostics || []).map(diagnosticOf),
    };
  },

  resolve({ moduleName, containingFile, options }) {
    const { resolvedModule } = ts.nodeModuleNameResolver(moduleName, containingFile, options || {}, ts.sys);
    if (!resolvedModule) return null;
    return {
      resolvedFileName: resolvedModule.resolvedFileName,
      isExternalLibraryImport: !!resolvedModule.isExternalLibraryImport,
    };
  },

  createService({ transformers }) {
    const state = {
      cwd,
      settings: {},
      fileNames: [],
      files: new Map(),
      transformers: loadTransformers(transformers),
    };
    const host = {
      getScriptFileNames: () => state.fileNames,
      getScriptVersion: (fileName) => {
        const file = state.files.get(fileName);
        return file ? file.version : '';
      },
      getScriptSnapshot: (fileName) => {
        const file = state.files.get(fileName);
        return file ? ts.ScriptSnapshot.fromString(file.text) : readFromDisk(fileName);
      },
      getCurrentDirectory: () => state.cwd,
      getCompilationSettings: () => state.settings,
      getDefaultLibFileName: (options) => ts.getDefaultLibFilePath(options),
      getCustomTransformers: () => state.transformers,
      fileExists: ts.sys.fileExists,
      readFile: ts.sys.readFile,
      readDirectory: ts.sys.readDirectory,
      directoryExists: ts.sys.directoryExists,
      getDirectories: ts.sys.getDirectories,
    };
    state.service = ts.createLanguageService(host, ts.createDocumentRegistry());
    const id = nextService++;
    services.set(id, state);
    return { service: id };
  },

  syncHost({ service, cwd, settings, fileNames, files }) {
    const state = serviceOf(service);
    if (cwd) state.cwd = cwd;
    if (settings) state.settings = settings;
    if (fileNames) state.fileNames = fileNames;
    for (const file of files || []) {
      if (file.text == null) state.files.delete(file.fileName);
      else state.files.set(file.fileName, { version: String(file.version), text: file.text });
    }
    return null;
  },

  emit({ service, fileName }) {
    const output = serviceOf(service).service.getEmitOutput(fileName);
    return {
      outputFiles: output.outputFiles.map((file) => ({ name: file.name, text: file.text })),
      emitSkipped: !!output.emitSkipped,
    };
  },

  diagnostics({ service, kind, fileName }) {
    const ls = serviceOf(service).service;
    switch (kind) {
      case 'options': return ls.getCompilerOptionsDiagnostics().map(diagnosticOf);
      case 'syntactic': return ls.getSyntacticDiagnostics(fileName).map(diagnosticOf);
      case 'semantic': return ls.getSemanticDiagnostics(fileName).map(diagnosticOf);
      default: throw new Error(`unknown diagnostics kind: ${kind}`);
    }
  },

  disposeService({ service }) {
    const state = services.get(service);
    if (state) {
      state.service.dispose();
      services.delete(service);
    }
    return null;
  },
};

process.stdout.write(JSON.stringify({ ready: true, version: ts.version }) + '\n');

const rl = createInterface({ input: process.stdin, crlfDelay: Infinity });

rl.on('line', (line) => {
  if (!line.trim()) return;

  let req;
  try {
    req = JSON.parse(line);
  } catch (err) {
    const message = err && err.message ? err.message : String(err);
    process.stdout.write(JSON.stringify({ id: null, error: `invalid json: ${message}` }) + '\n');
    return;
  }

  const handler = handlers[req.method];
  try {
    if (!handler) throw new Error(`unknown method: ${req.method}`);
    const result = handler(req.params || {});
    process.stdout.write(JSON.stringify({ id: req.id, result }) + '\n');
  } catch (err) {
    const message = err && err.stack ? err.stack : String(err);
    process.stdout.write(JSON.stringify({ id: req.id, error: message }) + '\n');
  }
});
"#;

/// Error types for the tsc runner.
#[derive(Debug, Error)]
pub enum TscError {
    /// Failed to spawn node.
    #[error("failed to spawn node: {0}")]
    SpawnFailed(#[from] std::io::Error),

    /// node exited, usually because `typescript` could not be loaded.
    #[error("node exited with code {code}: {stderr}")]
    ProcessFailed { code: i32, stderr: String },

    /// node binary not found.
    #[error("node binary not found at: {0}")]
    NotFound(Utf8PathBuf),

    /// Failed to write the runner script.
    #[error("failed to prepare runner script: {0}")]
    ScriptFailed(String),

    /// Runner protocol error.
    #[error("tsc runner protocol error: {0}")]
    ProtocolError(String),

    /// Failed to parse a runner response.
    #[error("failed to parse tsc runner response: {0}")]
    ParseError(String),

    /// The compiler threw while handling a request.
    #[error("{0}")]
    RequestFailed(String),

    /// The compiler reported a version we cannot gate features on.
    #[error(transparent)]
    Version(#[from] ts_service::VersionError),
}

impl From<TscError> for ServiceError {
    fn from(err: TscError) -> Self {
        match err {
            TscError::SpawnFailed(_)
            | TscError::ProcessFailed { .. }
            | TscError::NotFound(_)
            | TscError::ScriptFailed(_) => ServiceError::Unavailable(err.to_string()),
            TscError::ProtocolError(_) | TscError::ParseError(_) | TscError::Version(_) => {
                ServiceError::Protocol(err.to_string())
            }
            TscError::RequestFailed(message) => ServiceError::Failed(message),
        }
    }
}

/// A TypeScript compiler living in a persistent node process.
///
/// Requests are answered one at a time over stdin/stdout. Language services
/// created from the runner live in the same process and share its worker.
#[derive(Clone)]
pub struct TscRunner {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    version: CompilerVersion,
    worker: Mutex<NodeWorker>,
}

impl std::fmt::Debug for TscRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TscRunner")
            .field("version", &self.shared.version)
            .finish_non_exhaustive()
    }
}

impl TscRunner {
    /// Starts node in `workspace_root` and loads TypeScript.
    ///
    /// `typescript` points at a `typescript` package directory or module
    /// file; by default the package is resolved from `workspace_root`.
    pub fn new(
        node_path: Utf8PathBuf,
        workspace_root: Utf8PathBuf,
        typescript: Option<Utf8PathBuf>,
    ) -> Result<Self, TscError> {
        if !node_path.exists() {
            return Err(TscError::NotFound(node_path));
        }
        let script_path = ensure_script()?;
        let (worker, ready) =
            NodeWorker::spawn(&node_path, &workspace_root, &script_path, typescript.as_deref())?;
        let raw = ready
            .version
            .ok_or_else(|| TscError::ProtocolError("runner did not report a version".into()))?;
        let version = CompilerVersion::parse(&raw)?;
        debug!(%version, %node_path, "typescript runner ready");

        Ok(Self {
            shared: Arc::new(Shared {
                version,
                worker: Mutex::new(worker),
            }),
        })
    }

    /// Finds node and starts a runner.
    pub fn spawn(
        workspace_root: Utf8PathBuf,
        typescript: Option<Utf8PathBuf>,
    ) -> Result<Self, TscError> {
        let node_path = Self::find_node(Some(&workspace_root))
            .ok_or_else(|| TscError::NotFound(Utf8PathBuf::from("node")))?;
        Self::new(node_path, workspace_root, typescript)
    }

    /// Attempts to find node.
    /// 1. `NODE_BINARY` environment variable
    /// 2. Workspace node_modules/.bin/node (if workspace_root provided)
    /// 3. PATH
    /// 4. Common install locations
    pub fn find_node(workspace_root: Option<&Utf8Path>) -> Option<Utf8PathBuf> {
        if let Ok(path) = std::env::var("NODE_BINARY") {
            let path = Utf8PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Some(workspace) = workspace_root {
            let bin = workspace.join("node_modules/.bin");
            if let Some(path) = find_node_in_bin(&bin) {
                return Some(path);
            }
        }

        if let Ok(path) = which::which("node") {
            if let Ok(utf8_path) = Utf8PathBuf::try_from(path) {
                return Some(utf8_path);
            }
        }

        let common_paths = ["/usr/local/bin/node", "/usr/bin/node", "~/.volta/bin/node"];

        for path in common_paths {
            let expanded = shellexpand::tilde(path);
            let path = Utf8Path::new(expanded.as_ref());
            if path.exists() {
                return Some(path.to_owned());
            }
        }

        None
    }

    /// Gets the cache directory for ts-plugin.
    pub fn get_cache_dir() -> Option<Utf8PathBuf> {
        dirs::cache_dir()
            .and_then(|p| Utf8PathBuf::try_from(p).ok())
            .map(|p| p.join("ts-plugin"))
    }
}

impl Shared {
    /// Sends one request and decodes its result.
    pub(crate) fn call<T: DeserializeOwned>(&self, request: Request<'_>) -> Result<T, TscError> {
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| TscError::ProtocolError("runner worker lock poisoned".into()))?;
        let result = worker.request(request)?;
        serde_json::from_value(result)
            .map_err(|e| TscError::ParseError(format!("unexpected result shape: {e}")))
    }
}

impl TypeScript for TscRunner {
    fn version(&self) -> &CompilerVersion {
        &self.shared.version
    }

    fn convert_compiler_options(
        &self,
        options: &Map<String, Value>,
        base_path: &Utf8Path,
    ) -> Result<ConvertedOptions, ServiceError> {
        let result: ConvertedResult = self
            .shared
            .call(Request::ConvertOptions { options, base_path })?;
        Ok(ConvertedOptions {
            options: result.options,
            errors: result
                .errors
                .into_iter()
                .map(|diag| diag.into_diagnostic(read_file_text))
                .collect(),
        })
    }

    fn transpile_module(
        &self,
        request: TranspileRequest<'_>,
    ) -> Result<TranspileOutput, ServiceError> {
        let result: TranspileResult = self.shared.call(Request::Transpile {
            file_name: request.file_name,
            source: request.source,
            options: request.compiler_options,
            transformers: request.transformers,
        })?;

        let source: Arc<str> = Arc::from(request.source);
        let diagnostics = result
            .diagnostics
            .into_iter()
            .map(|diag: JsDiagnostic| {
                diag.into_diagnostic(|file| {
                    if file == request.file_name {
                        Some(source.clone())
                    } else {
                        read_file_text(file)
                    }
                })
            })
            .collect();

        Ok(TranspileOutput {
            output_text: result.output_text,
            source_map_text: result.source_map_text,
            diagnostics,
        })
    }

    fn resolve_module_name(
        &self,
        module_name: &str,
        containing_file: &Utf8Path,
        options: Option<&Map<String, Value>>,
    ) -> Result<Option<ResolvedModule>, ServiceError> {
        let result: Option<ResolveResult> = self.shared.call(Request::Resolve {
            module_name,
            containing_file,
            options,
        })?;
        Ok(result.map(ResolvedModule::from))
    }

    fn create_language_service(
        &self,
        transformers: Option<&CustomTransformers>,
    ) -> Result<Box<dyn LanguageService>, ServiceError> {
        let created: ServiceCreated = self.shared.call(Request::CreateService { transformers })?;
        debug!(service = created.service, "created language service");
        Ok(Box::new(TscLanguageService::new(
            self.shared.clone(),
            created.service,
        )))
    }
}

pub(crate) fn read_file_text(path: &Utf8Path) -> Option<Arc<str>> {
    fs::read_to_string(path).ok().map(Arc::from)
}

fn find_node_in_bin(bin: &Utf8Path) -> Option<Utf8PathBuf> {
    let candidates: &[&str] = if cfg!(windows) {
        &["node.exe", "node.cmd", "node"]
    } else {
        &["node"]
    };

    for candidate in candidates.iter() {
        let path = bin.join(candidate);
        if path.exists() {
            return Some(path);
        }
    }

    None
}

fn ensure_script() -> Result<Utf8PathBuf, TscError> {
    let cache_dir = TscRunner::get_cache_dir()
        .ok_or_else(|| TscError::ScriptFailed("could not determine cache directory".into()))?;
    fs::create_dir_all(&cache_dir)
        .map_err(|e| TscError::ScriptFailed(format!("failed to create cache dir: {e}")))?;

    let script_path = cache_dir.join(RUNNER_SCRIPT_FILENAME);
    let mut hasher = Hasher::new();
    hasher.update(RUNNER_SCRIPT_SOURCE.as_bytes());
    let expected_hash = hasher.finalize();

    if let Ok(existing) = fs::read(&script_path) {
        let mut hasher = Hasher::new();
        hasher.update(&existing);
        if hasher.finalize() == expected_hash {
            return Ok(script_path);
        }
    }

    fs::write(&script_path, RUNNER_SCRIPT_SOURCE)
        .map_err(|e| TscError::ScriptFailed(format!("failed to write runner script: {e}")))?;

    Ok(script_path)
}

pub(crate) struct NodeWorker {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    stderr_task: Option<JoinHandle<String>>,
    next_id: u64,
}

impl NodeWorker {
    fn spawn(
        node_path: &Utf8Path,
        workspace_root: &Utf8Path,
        script_path: &Utf8Path,
        typescript: Option<&Utf8Path>,
    ) -> Result<(Self, Ready), TscError> {
        let mut command = Command::new(node_path);
        command.arg(script_path);
        if let Some(typescript) = typescript {
            command.arg(typescript);
        }
        let mut child = command
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(TscError::SpawnFailed)?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| TscError::ProtocolError("failed to open node stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| TscError::ProtocolError("failed to open node stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| TscError::ProtocolError("failed to open node stderr".to_string()))?;

        let stderr_task = std::thread::spawn(move || {
            let mut reader = BufReader::new(stderr);
            let mut buffer = String::new();
            let _ = reader.read_to_string(&mut buffer);
            buffer
        });

        let mut worker = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            stderr_task: Some(stderr_task),
            next_id: 1,
        };

        let ready_line = worker.read_line()?;
        let ready: Ready = serde_json::from_str(&ready_line)
            .map_err(|e| TscError::ParseError(format!("invalid ready response: {e}")))?;
        if !ready.ready {
            return Err(TscError::ProtocolError(format!(
                "unexpected runner ready response: {}",
                ready_line
            )));
        }

        Ok((worker, ready))
    }

    fn request(&mut self, request: Request<'_>) -> Result<Value, TscError> {
        let id = self.next_id;
        self.next_id += 1;

        let line = serde_json::to_string(&Envelope { id, request })
            .map_err(|e| TscError::ProtocolError(format!("failed to serialize request: {e}")))?;
        self.stdin
            .write_all(line.as_bytes())
            .and_then(|_| self.stdin.write_all(b"\n"))
            .and_then(|_| self.stdin.flush())
            .map_err(|e| TscError::ProtocolError(format!("failed to write to node stdin: {e}")))?;

        let line = self.read_line()?;
        let response: Response = serde_json::from_str(&line)
            .map_err(|e| TscError::ParseError(format!("invalid response: {e} ({line})")))?;

        if response.id != Some(id) {
            return Err(match response.error {
                Some(error) => TscError::ProtocolError(error),
                None => TscError::ProtocolError(format!("unexpected response id for {id}: {line}")),
            });
        }
        if let Some(error) = response.error {
            return Err(TscError::RequestFailed(error));
        }

        Ok(response.result.unwrap_or(Value::Null))
    }

    /// Reads one line; end of stream means node has exited.
    fn read_line(&mut self) -> Result<String, TscError> {
        let mut line = String::new();
        let read = self
            .stdout
            .read_line(&mut line)
            .map_err(|e| TscError::ProtocolError(format!("failed to read node output: {e}")))?;

        if read == 0 {
            let stderr = self
                .stderr_task
                .take()
                .and_then(|handle| handle.join().ok())
                .unwrap_or_default();
            let status = self.child.wait().map_err(TscError::SpawnFailed)?;
            return Err(TscError::ProcessFailed {
                code: status.code().unwrap_or(-1),
                stderr,
            });
        }

        Ok(line)
    }
}

impl Drop for NodeWorker {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}
