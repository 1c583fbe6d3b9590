//! A scripted in-memory compiler for tests.
//!
//! The fake understands just enough to exercise the plugin:
//!
//! - the converter accepts a fixed list of option names and rejects others
//!   with TS5023,
//! - "compiling" copies the source through and emits a trivial source map,
//! - `@error(CODE)` and `@warning(CODE)` markers in a source produce
//!   diagnostics of that code at the marker,
//! - `target: "es5"` produces the TS1204 module/target complaint and lowers
//!   `extends` to an `__extends` call, defining the helper inline unless
//!   `noEmitHelpers` is set,
//! - module resolution answers from a table.

#![allow(dead_code)]

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{json, Map, Value};
use source_map::Span;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;
use ts_service::{
    CompilerVersion, ConvertedOptions, CustomTransformers, Diagnostic, DiagnosticCategory,
    EmitOutput, LanguageService, LanguageServiceHost, OutputFile, ResolvedModule, ScriptVersion,
    ServiceError, TranspileOutput, TranspileRequest, TypeScript,
};

pub const KNOWN_OPTIONS: &[&str] = &[
    "module",
    "target",
    "sourceMap",
    "noEmitHelpers",
    "strict",
    "strictNullChecks",
    "noImplicitAny",
    "types",
    "typeRoots",
    "lib",
    "jsx",
    "baseUrl",
    "outDir",
    "rootDir",
    "experimentalDecorators",
    "inlineSources",
];

/// Everything the fake was asked to do.
#[derive(Debug, Default)]
pub struct CallLog {
    /// Options handed to the converter.
    pub converted: Vec<Map<String, Value>>,
    /// (file, options) per transpile call.
    pub transpiled: Vec<(Utf8PathBuf, Map<String, Value>)>,
    /// (specifier, importer, options were passed) per resolution.
    pub resolved: Vec<(String, Utf8PathBuf, bool)>,
    /// (file, version) seen by each language-service emit.
    pub emitted: Vec<(Utf8PathBuf, Option<ScriptVersion>)>,
    /// Files the host declared at each emit.
    pub script_names: Vec<Vec<Utf8PathBuf>>,
    /// Settings the host reported at each emit.
    pub settings: Vec<Map<String, Value>>,
    pub services_created: usize,
}

pub struct FakeTypeScript {
    version: CompilerVersion,
    resolutions: HashMap<String, Utf8PathBuf>,
    pub log: Rc<RefCell<CallLog>>,
}

impl FakeTypeScript {
    pub fn new(version: &str) -> Self {
        Self {
            version: CompilerVersion::parse(version).unwrap(),
            resolutions: HashMap::new(),
            log: Rc::new(RefCell::new(CallLog::default())),
        }
    }

    pub fn modern() -> Self {
        Self::new("5.4.5")
    }

    pub fn with_resolution(mut self, specifier: &str, path: impl Into<Utf8PathBuf>) -> Self {
        self.resolutions.insert(specifier.to_string(), path.into());
        self
    }

    pub fn into_arc(self) -> (Arc<Self>, Arc<dyn TypeScript>) {
        let fake = Arc::new(self);
        let service: Arc<dyn TypeScript> = fake.clone();
        (fake, service)
    }

    pub fn last_converted(&self) -> Map<String, Value> {
        self.log.borrow().converted.last().cloned().unwrap()
    }
}

impl TypeScript for FakeTypeScript {
    fn version(&self) -> &CompilerVersion {
        &self.version
    }

    fn convert_compiler_options(
        &self,
        options: &Map<String, Value>,
        _base_path: &Utf8Path,
    ) -> Result<ConvertedOptions, ServiceError> {
        self.log.borrow_mut().converted.push(options.clone());

        let errors = options
            .keys()
            .filter(|key| !KNOWN_OPTIONS.contains(&key.as_str()))
            .map(|key| {
                Diagnostic::global(
                    5023,
                    DiagnosticCategory::Error,
                    format!("Unknown compiler option '{key}'."),
                )
            })
            .collect();

        Ok(ConvertedOptions {
            options: options.clone(),
            errors,
        })
    }

    fn transpile_module(&self, request: TranspileRequest<'_>) -> Result<TranspileOutput, ServiceError> {
        self.log
            .borrow_mut()
            .transpiled
            .push((request.file_name.to_path_buf(), request.compiler_options.clone()));

        let mut diagnostics = option_diagnostics(request.compiler_options);
        diagnostics.extend(marker_diagnostics(request.file_name, request.source));

        let (output_text, source_map_text) = emit(request.file_name, request.source, request.compiler_options);
        Ok(TranspileOutput {
            output_text,
            source_map_text,
            diagnostics,
        })
    }

    fn resolve_module_name(
        &self,
        module_name: &str,
        containing_file: &Utf8Path,
        options: Option<&Map<String, Value>>,
    ) -> Result<Option<ResolvedModule>, ServiceError> {
        self.log.borrow_mut().resolved.push((
            module_name.to_string(),
            containing_file.to_path_buf(),
            options.is_some(),
        ));

        Ok(self
            .resolutions
            .get(module_name)
            .map(|path| ResolvedModule {
                resolved_file_name: path.clone(),
                is_external_library_import: path.as_str().contains("node_modules"),
            }))
    }

    fn create_language_service(
        &self,
        _transformers: Option<&CustomTransformers>,
    ) -> Result<Box<dyn LanguageService>, ServiceError> {
        self.log.borrow_mut().services_created += 1;
        Ok(Box::new(FakeLanguageService {
            log: self.log.clone(),
        }))
    }
}

struct FakeLanguageService {
    log: Rc<RefCell<CallLog>>,
}

impl LanguageService for FakeLanguageService {
    fn emit_output(
        &mut self,
        host: &dyn LanguageServiceHost,
        file_name: &Utf8Path,
    ) -> Result<EmitOutput, ServiceError> {
        let version = host.script_version(file_name);
        {
            let mut log = self.log.borrow_mut();
            log.emitted.push((file_name.to_path_buf(), version));
            log.script_names.push(host.script_file_names());
            log.settings.push(host.compilation_settings().clone());
        }

        let Some(snapshot) = host.script_snapshot(file_name) else {
            return Ok(EmitOutput {
                output_files: Vec::new(),
                emit_skipped: true,
            });
        };

        let (text, map) = emit(file_name, &snapshot, host.compilation_settings());
        let js = file_name.with_extension("js");
        let mut output_files = vec![
            OutputFile {
                name: file_name.with_extension("d.ts"),
                text: "export {};\n".to_string(),
            },
            OutputFile {
                name: js.clone(),
                text,
            },
        ];
        if let Some(map) = map {
            output_files.push(OutputFile {
                name: Utf8PathBuf::from(format!("{js}.map")),
                text: map,
            });
        }

        Ok(EmitOutput {
            output_files,
            emit_skipped: false,
        })
    }

    fn compiler_options_diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
    ) -> Result<Vec<Diagnostic>, ServiceError> {
        Ok(option_diagnostics(host.compilation_settings()))
    }

    fn syntactic_diagnostics(
        &mut self,
        _host: &dyn LanguageServiceHost,
        _file_name: &Utf8Path,
    ) -> Result<Vec<Diagnostic>, ServiceError> {
        Ok(Vec::new())
    }

    fn semantic_diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
        file_name: &Utf8Path,
    ) -> Result<Vec<Diagnostic>, ServiceError> {
        Ok(host
            .script_snapshot(file_name)
            .map(|text| marker_diagnostics(file_name, &text))
            .unwrap_or_default())
    }
}

fn option_diagnostics(options: &Map<String, Value>) -> Vec<Diagnostic> {
    if options.get("target") == Some(&json!("es5")) {
        vec![Diagnostic::global(
            1204,
            DiagnosticCategory::Error,
            "Cannot compile modules into 'es2015' when targeting 'ES5' or lower.",
        )]
    } else {
        Vec::new()
    }
}

fn marker_diagnostics(file_name: &Utf8Path, source: &str) -> Vec<Diagnostic> {
    let text: Arc<str> = Arc::from(source);
    let mut diagnostics = Vec::new();
    for (marker, category) in [
        ("@error(", DiagnosticCategory::Error),
        ("@warning(", DiagnosticCategory::Warning),
    ] {
        for (start, _) in source.match_indices(marker) {
            let rest = &source[start + marker.len()..];
            let Some(end) = rest.find(')') else { continue };
            let Ok(code) = rest[..end].parse::<u32>() else {
                continue;
            };
            diagnostics.push(
                Diagnostic::global(code, category, format!("Marker diagnostic {code}.")).in_file(
                    file_name,
                    text.clone(),
                    Span::at(start as u32, (marker.len() + end + 1) as u32),
                ),
            );
        }
    }
    diagnostics
}

fn emit(file_name: &Utf8Path, source: &str, options: &Map<String, Value>) -> (String, Option<String>) {
    let js_name = file_name.with_extension("js");
    let base = js_name.file_name().unwrap_or("out.js").to_string();
    let source_map = options.get("sourceMap") == Some(&json!(true));

    let lowered = options.get("target") == Some(&json!("es5")) && source.contains(" extends ");
    let mut text = String::new();
    if lowered && options.get("noEmitHelpers") != Some(&json!(true)) {
        text.push_str("var __extends = function (d, b) { d.prototype = Object.create(b.prototype); };\n");
    }
    text.push_str(source);
    if lowered {
        text.push_str("\n__extends(Derived, Base);");
    }
    let map = source_map.then(|| {
        text.push_str(&format!("\n//# sourceMappingURL={base}.map"));
        json!({
            "version": 3,
            "file": base,
            "sources": [file_name.file_name().unwrap_or_default()],
            "names": [],
            "mappings": "AAAA"
        })
        .to_string()
    });
    (text, map)
}

/// A temporary project directory with a UTF-8 path.
pub struct Project {
    _dir: tempfile::TempDir,
    pub root: Utf8PathBuf,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::TempDir::new().unwrap();
        let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().unwrap()).unwrap();
        Self { _dir: dir, root }
    }

    pub fn write(&self, relative: &str, content: &str) -> Utf8PathBuf {
        let path = self.root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, content).unwrap();
        path
    }
}
