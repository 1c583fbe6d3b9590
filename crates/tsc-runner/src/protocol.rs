//! JSON-lines messages exchanged with the node runner.

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use source_map::Span;
use std::sync::Arc;
use ts_service::{
    CustomTransformers, Diagnostic, DiagnosticCategory, DiagnosticMessage, OutputFile,
    ResolvedModule,
};

/// One request line: `{"id": 1, "method": "...", "params": {...}}`.
#[derive(Debug, Serialize)]
pub(crate) struct Envelope<'a> {
    pub id: u64,
    #[serde(flatten)]
    pub request: Request<'a>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "method", content = "params", rename_all = "camelCase")]
pub(crate) enum Request<'a> {
    #[serde(rename_all = "camelCase")]
    ConvertOptions {
        options: &'a Map<String, Value>,
        base_path: &'a Utf8Path,
    },
    #[serde(rename_all = "camelCase")]
    Transpile {
        file_name: &'a Utf8Path,
        source: &'a str,
        options: &'a Map<String, Value>,
        transformers: Option<&'a CustomTransformers>,
    },
    #[serde(rename_all = "camelCase")]
    Resolve {
        module_name: &'a str,
        containing_file: &'a Utf8Path,
        options: Option<&'a Map<String, Value>>,
    },
    CreateService {
        transformers: Option<&'a CustomTransformers>,
    },
    #[serde(rename_all = "camelCase")]
    SyncHost {
        service: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        cwd: Option<&'a Utf8Path>,
        #[serde(skip_serializing_if = "Option::is_none")]
        settings: Option<&'a Map<String, Value>>,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_names: Option<&'a [Utf8PathBuf]>,
        files: Vec<FileUpdate>,
    },
    #[serde(rename_all = "camelCase")]
    Emit { service: u64, file_name: &'a Utf8Path },
    #[serde(rename_all = "camelCase")]
    Diagnostics {
        service: u64,
        kind: DiagnosticsKind,
        #[serde(skip_serializing_if = "Option::is_none")]
        file_name: Option<&'a Utf8Path>,
    },
    DisposeService { service: u64 },
}

/// A file whose version changed since the runner last saw it.
///
/// `text: None` removes the file; the runner then falls back to disk.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct FileUpdate {
    pub file_name: Utf8PathBuf,
    pub version: Option<u64>,
    pub text: Option<Arc<str>>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DiagnosticsKind {
    Options,
    Syntactic,
    Semantic,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Ready {
    pub ready: bool,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Response {
    pub id: Option<u64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConvertedResult {
    pub options: Map<String, Value>,
    #[serde(default)]
    pub errors: Vec<JsDiagnostic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TranspileResult {
    pub output_text: String,
    #[serde(default)]
    pub source_map_text: Option<String>,
    #[serde(default)]
    pub diagnostics: Vec<JsDiagnostic>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResolveResult {
    pub resolved_file_name: Utf8PathBuf,
    #[serde(default)]
    pub is_external_library_import: bool,
}

impl From<ResolveResult> for ResolvedModule {
    fn from(result: ResolveResult) -> Self {
        ResolvedModule {
            resolved_file_name: result.resolved_file_name,
            is_external_library_import: result.is_external_library_import,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ServiceCreated {
    pub service: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct EmitResult {
    #[serde(default)]
    pub output_files: Vec<JsOutputFile>,
    #[serde(default)]
    pub emit_skipped: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct JsOutputFile {
    pub name: Utf8PathBuf,
    pub text: String,
}

impl From<JsOutputFile> for OutputFile {
    fn from(file: JsOutputFile) -> Self {
        OutputFile {
            name: file.name,
            text: file.text,
        }
    }
}

/// A diagnostic as the runner serializes it.
///
/// `start` and `length` are UTF-8 byte offsets; the runner converts from the
/// compiler's UTF-16 positions before sending.
#[derive(Debug, Deserialize)]
pub(crate) struct JsDiagnostic {
    pub code: u32,
    pub category: DiagnosticCategory,
    pub message: DiagnosticMessage,
    #[serde(default)]
    pub file: Option<Utf8PathBuf>,
    #[serde(default)]
    pub start: Option<u32>,
    #[serde(default)]
    pub length: Option<u32>,
}

impl JsDiagnostic {
    /// Converts into a [`Diagnostic`], looking up the text of the file it
    /// points into. A file whose text cannot be found yields a global
    /// diagnostic.
    pub fn into_diagnostic(self, text_for: impl Fn(&Utf8Path) -> Option<Arc<str>>) -> Diagnostic {
        let diagnostic = Diagnostic::global(self.code, self.category, self.message);
        match (self.file, self.start) {
            (Some(file), Some(start)) => match text_for(&file) {
                Some(text) => {
                    diagnostic.in_file(file, text, Span::at(start, self.length.unwrap_or(0)))
                }
                None => diagnostic,
            },
            _ => diagnostic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let options = Map::new();
        let envelope = Envelope {
            id: 7,
            request: Request::Resolve {
                module_name: "./dep",
                containing_file: Utf8Path::new("/p/main.ts"),
                options: Some(&options),
            },
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "id": 7,
                "method": "resolve",
                "params": { "moduleName": "./dep", "containingFile": "/p/main.ts", "options": {} }
            })
        );
    }

    #[test]
    fn test_sync_host_omits_unchanged_parts() {
        let envelope = Envelope {
            id: 1,
            request: Request::SyncHost {
                service: 3,
                cwd: None,
                settings: None,
                file_names: None,
                files: vec![FileUpdate {
                    file_name: "/p/a.ts".into(),
                    version: Some(2),
                    text: Some(Arc::from("let a;")),
                }],
            },
        };
        assert_eq!(
            serde_json::to_value(&envelope).unwrap(),
            json!({
                "id": 1,
                "method": "syncHost",
                "params": {
                    "service": 3,
                    "files": [{ "fileName": "/p/a.ts", "version": 2, "text": "let a;" }]
                }
            })
        );
    }

    #[test]
    fn test_diagnostic_with_chain_and_position() {
        let js: JsDiagnostic = serde_json::from_value(json!({
            "code": 2322,
            "category": "error",
            "message": { "messageText": "Type 'string' is not assignable.", "next": ["Details."] },
            "file": "/p/a.ts",
            "start": 4,
            "length": 1
        }))
        .unwrap();

        let diagnostic = js.into_diagnostic(|_| Some(Arc::from("let a: number = '';")));
        assert_eq!(diagnostic.code, 2322);
        assert_eq!(diagnostic.span, Some(Span::at(4, 1)));
        assert_eq!(
            diagnostic.message.flatten(),
            "Type 'string' is not assignable.\n  Details."
        );
    }

    #[test]
    fn test_diagnostic_without_text_is_global() {
        let js: JsDiagnostic = serde_json::from_value(json!({
            "code": 2307,
            "category": "error",
            "message": "Cannot find module.",
            "file": "/gone.ts",
            "start": 0,
            "length": 3
        }))
        .unwrap();

        let diagnostic = js.into_diagnostic(|_| None);
        assert!(diagnostic.file.is_none());
        assert!(diagnostic.span.is_none());
    }
}
