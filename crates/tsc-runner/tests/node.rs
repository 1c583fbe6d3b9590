//! End-to-end checks against a real node + typescript.
//!
//! These skip themselves when node or the `typescript` package is missing.
//! Point `TS_PLUGIN_TYPESCRIPT` at a `typescript` package directory to run
//! them outside a project that depends on it.

use camino::Utf8PathBuf;
use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};
use ts_service::{LanguageServiceHost, ScriptVersion, Snapshot, TranspileRequest, TypeScript};
use tsc_runner::TscRunner;

fn runner(root: &Utf8PathBuf) -> Option<TscRunner> {
    let typescript = std::env::var("TS_PLUGIN_TYPESCRIPT").ok().map(Utf8PathBuf::from);
    match TscRunner::spawn(root.clone(), typescript) {
        Ok(runner) => Some(runner),
        Err(err) => {
            eprintln!("skipping: {err}");
            None
        }
    }
}

fn project() -> (tempfile::TempDir, Utf8PathBuf) {
    let dir = tempfile::TempDir::new().unwrap();
    let root = Utf8PathBuf::from_path_buf(dir.path().canonicalize().unwrap()).unwrap();
    (dir, root)
}

fn convert(runner: &TscRunner, root: &Utf8PathBuf, options: Value) -> Map<String, Value> {
    let Value::Object(options) = options else {
        panic!("options must be an object")
    };
    let converted = runner.convert_compiler_options(&options, root).unwrap();
    assert!(converted.errors.is_empty(), "{:?}", converted.errors);
    converted.options
}

#[test]
fn test_transpile_to_es5() {
    let (_dir, root) = project();
    let Some(runner) = runner(&root) else { return };

    let options = convert(
        &runner,
        &root,
        json!({ "module": "es2015", "target": "es5", "sourceMap": true }),
    );
    let file = root.join("main.ts");
    let output = runner
        .transpile_module(TranspileRequest {
            file_name: &file,
            source: "export function add(a: number, b: number): number {\n  const sum = a + b;\n  return sum;\n}\n",
            compiler_options: &options,
            transformers: None,
        })
        .unwrap();

    assert!(!output.output_text.contains(": number"));
    assert!(!output.output_text.contains("const "));
    assert!(!output.output_text.contains("let "));
    assert!(output.output_text.contains("var sum = a + b;"));
    let map: Value = serde_json::from_str(output.source_map_text.as_deref().unwrap()).unwrap();
    assert_eq!(map["version"], json!(3));
}

#[test]
fn test_unknown_option_is_reported() {
    let (_dir, root) = project();
    let Some(runner) = runner(&root) else { return };

    let mut options = Map::new();
    options.insert("fancyOption".into(), json!(true));
    let converted = runner.convert_compiler_options(&options, &root).unwrap();

    assert_eq!(converted.errors.len(), 1);
    assert_eq!(converted.errors[0].code, 5023);
}

#[test]
fn test_resolve_relative_module() {
    let (_dir, root) = project();
    let Some(runner) = runner(&root) else { return };
    std::fs::write(root.join("dep.ts"), "export const dep = 1;\n").unwrap();

    let options = convert(&runner, &root, json!({ "module": "es2015" }));
    let resolved = runner
        .resolve_module_name("./dep", &root.join("main.ts"), Some(&options))
        .unwrap()
        .unwrap();
    assert_eq!(resolved.resolved_file_name, root.join("dep.ts"));
    assert!(!resolved.is_external_library_import);

    let missing = runner
        .resolve_module_name("./missing", &root.join("main.ts"), Some(&options))
        .unwrap();
    assert!(missing.is_none());
}

struct Host {
    root: Utf8PathBuf,
    file: Utf8PathBuf,
    text: Snapshot,
    version: u64,
    settings: Map<String, Value>,
}

impl LanguageServiceHost for Host {
    fn script_file_names(&self) -> Vec<Utf8PathBuf> {
        vec![self.file.clone()]
    }

    fn script_version(&self, file_name: &camino::Utf8Path) -> Option<ScriptVersion> {
        (file_name == self.file).then_some(ScriptVersion(self.version))
    }

    fn script_snapshot(&self, file_name: &camino::Utf8Path) -> Option<Snapshot> {
        (file_name == self.file).then(|| self.text.clone())
    }

    fn current_directory(&self) -> &camino::Utf8Path {
        &self.root
    }

    fn compilation_settings(&self) -> &Map<String, Value> {
        &self.settings
    }
}

#[test]
fn test_language_service_sees_new_versions() {
    let (_dir, root) = project();
    let Some(runner) = runner(&root) else { return };

    let settings = convert(
        &runner,
        &root,
        json!({ "module": "es2015", "target": "es2015", "types": [] }),
    );
    let mut host = Host {
        file: root.join("main.ts"),
        root: root.clone(),
        text: Snapshot::from("export const a: string = 1;\n"),
        version: 1,
        settings,
    };
    let mut service = runner.create_language_service(None).unwrap();

    let semantic = service.semantic_diagnostics(&host, &host.file.clone()).unwrap();
    assert_eq!(semantic.iter().map(|d| d.code).collect::<Vec<_>>(), vec![2322]);
    let (file, position) = semantic[0].location().unwrap();
    assert_eq!(file.name, host.file);
    assert_eq!((position.line, position.col), (0, 13));

    host.text = Snapshot::from("export const a: string = 'ok';\n");
    host.version = 2;
    let file = host.file.clone();
    assert!(service.semantic_diagnostics(&host, &file).unwrap().is_empty());

    let output = service.emit_output(&host, &file).unwrap();
    assert!(!output.emit_skipped);
    let js = output
        .output_files
        .iter()
        .find(|f| f.name.extension() == Some("js"))
        .unwrap();
    assert!(js.text.contains("export const a = 'ok';"));
}
