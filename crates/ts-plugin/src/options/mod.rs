//! Compiler option resolution.
//!
//! Options come from three layers, lowest precedence first:
//!
//! 1. built-in defaults ([`CompilerOptions::defaults`]),
//! 2. the project's tsconfig, with its `extends` chain flattened,
//! 3. options passed to the plugin.
//!
//! Each layer is parsed into a typed [`CompilerOptions`] and normalized on its
//! own before the layers are merged. The merged set must target ES2015 modules
//! and must pass the compiler's option converter, otherwise resolution fails.

mod tsconfig;

pub use tsconfig::{find_tsconfig, load_compiler_options, TSCONFIG_FILENAME};

use crate::config::TsConfigSource;
use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, error, warn};
use ts_service::{CustomTransformers, Feature, ServiceError, TypeScript};

/// Declaration-emit options. A single-file transform has nowhere to put
/// declaration files, so these never reach the compiler.
const DECLARATION_OUTPUT_OPTIONS: [&str; 2] = ["declarationMap", "emitDeclarationOnly"];

/// Option resolution errors. All of them are fatal at plugin initialization.
#[derive(Debug, Error)]
pub enum OptionsError {
    /// A config file could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    /// A config file is not valid JSON.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },

    /// An explicitly configured tsconfig does not exist.
    #[error("tsconfig not found at: {0}")]
    TsconfigNotFound(Utf8PathBuf),

    /// An `extends` reference points nowhere.
    #[error("cannot find config '{specifier}' extended by {from}")]
    ExtendsNotFound {
        specifier: String,
        from: Utf8PathBuf,
    },

    /// The `extends` chain loops back on itself.
    #[error("circular 'extends' chain: {}", format_chain(.chain))]
    CircularExtends { chain: Vec<Utf8PathBuf> },

    /// A layer holds a value of the wrong type for a known option.
    #[error("invalid compiler options in {layer}: {source}")]
    InvalidLayer {
        layer: String,
        source: serde_json::Error,
    },

    /// The merged module kind is not ES2015.
    #[error("the module kind should be 'es2015', found: '{0}'")]
    UnsupportedModuleKind(String),

    /// The compiler's converter rejected one or more options.
    #[error("couldn't process compiler options: {}", .messages.join("; "))]
    Conversion { messages: Vec<String> },

    /// The compiler could not be asked.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

fn format_chain(chain: &[Utf8PathBuf]) -> String {
    chain
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Module code generation kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ModuleKind {
    None,
    CommonJs,
    Amd,
    Umd,
    System,
    Es2015,
    Es2020,
    Es2022,
    EsNext,
    Node16,
    NodeNext,
    Preserve,
}

impl ModuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ModuleKind::None => "none",
            ModuleKind::CommonJs => "commonjs",
            ModuleKind::Amd => "amd",
            ModuleKind::Umd => "umd",
            ModuleKind::System => "system",
            ModuleKind::Es2015 => "es2015",
            ModuleKind::Es2020 => "es2020",
            ModuleKind::Es2022 => "es2022",
            ModuleKind::EsNext => "esnext",
            ModuleKind::Node16 => "node16",
            ModuleKind::NodeNext => "nodenext",
            ModuleKind::Preserve => "preserve",
        }
    }

    /// Whether the bundler can consume this kind's output.
    pub fn is_bundler_compatible(self) -> bool {
        self == ModuleKind::Es2015
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModuleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s.to_ascii_lowercase().as_str() {
            "none" => ModuleKind::None,
            "commonjs" => ModuleKind::CommonJs,
            "amd" => ModuleKind::Amd,
            "umd" => ModuleKind::Umd,
            "system" => ModuleKind::System,
            "es6" | "es2015" => ModuleKind::Es2015,
            "es2020" => ModuleKind::Es2020,
            "es2022" => ModuleKind::Es2022,
            "esnext" => ModuleKind::EsNext,
            "node16" => ModuleKind::Node16,
            "nodenext" => ModuleKind::NodeNext,
            "preserve" => ModuleKind::Preserve,
            _ => return Err(format!("unknown module kind '{s}'")),
        };
        Ok(kind)
    }
}

impl TryFrom<String> for ModuleKind {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ModuleKind> for String {
    fn from(kind: ModuleKind) -> Self {
        kind.as_str().to_string()
    }
}

/// One layer of compiler options.
///
/// Only the options the plugin itself reasons about are typed; everything
/// else is carried in `extra` and validated by the compiler's converter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompilerOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<ModuleKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_map: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_source_map: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub declaration: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_null_checks: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub no_emit_helpers: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub types: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub type_roots: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_transformers: Option<CustomTransformers>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CompilerOptions {
    /// The built-in layer: ES2015 modules, source maps on, helper emission
    /// off (the plugin supplies helpers through its own module).
    pub fn defaults() -> Self {
        Self {
            module: Some(ModuleKind::Es2015),
            source_map: Some(true),
            no_emit_helpers: Some(true),
            ..Self::default()
        }
    }

    /// Parses a layer from JSON-shaped options.
    pub fn from_json(layer: &str, options: Map<String, Value>) -> Result<Self, OptionsError> {
        serde_json::from_value(Value::Object(options)).map_err(|source| {
            OptionsError::InvalidLayer {
                layer: layer.to_string(),
                source,
            }
        })
    }

    /// Returns `self` with every option set in `over` replacing its own.
    pub fn merge(mut self, over: CompilerOptions) -> Self {
        self.module = over.module.or(self.module);
        self.source_map = over.source_map.or(self.source_map);
        self.inline_source_map = over.inline_source_map.or(self.inline_source_map);
        self.declaration = over.declaration.or(self.declaration);
        self.strict_null_checks = over.strict_null_checks.or(self.strict_null_checks);
        self.no_emit_helpers = over.no_emit_helpers.or(self.no_emit_helpers);
        self.types = over.types.or(self.types);
        self.type_roots = over.type_roots.or(self.type_roots);
        self.custom_transformers = over.custom_transformers.or(self.custom_transformers);
        self.extra.extend(over.extra);
        self
    }

    /// Adapts a layer to single-file transformation.
    ///
    /// - a boolean `inlineSourceMap` becomes `sourceMap` and is removed,
    /// - declaration output options are removed,
    /// - options the compiler version cannot honour are dropped with a warning.
    pub fn normalize(&mut self, typescript: &dyn TypeScript, warnings: &mut Vec<String>) {
        if let Some(inline) = self.inline_source_map.take() {
            self.source_map = Some(inline);
        }

        self.declaration = None;
        for key in DECLARATION_OUTPUT_OPTIONS {
            self.extra.remove(key);
        }

        let version = typescript.version();
        if self.strict_null_checks.is_some() && !version.supports(Feature::StrictNullChecks) {
            self.strict_null_checks = None;
            warnings.push(unsupported_warning(Feature::StrictNullChecks));
        }
        if self.custom_transformers.is_some() && !version.supports(Feature::CustomTransformers) {
            self.custom_transformers = None;
            warnings.push(unsupported_warning(Feature::CustomTransformers));
        }
    }

    /// The JSON object handed to the compiler's converter.
    ///
    /// Transformers are not options to the compiler proper and travel
    /// separately.
    pub fn to_compiler_json(&self) -> Map<String, Value> {
        let mut json = match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        json.remove("customTransformers");
        json
    }
}

fn unsupported_warning(feature: Feature) -> String {
    format!(
        "'{}' is not supported by this compiler version; disabling it",
        feature.option_name().unwrap_or("unknown")
    )
}

/// The outcome of option resolution.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    /// Merged, normalized options.
    pub options: CompilerOptions,
    /// The converter's output; exactly what the compiler receives.
    pub converted: Map<String, Value>,
    /// Transformers to run around emit, if requested and supported.
    pub transformers: Option<CustomTransformers>,
    /// The tsconfig the project layer came from.
    pub tsconfig: Option<Utf8PathBuf>,
    /// Non-fatal problems found while resolving.
    pub warnings: Vec<String>,
}

/// Resolves the options the compiler will run with.
///
/// `overrides` is the caller's layer; `source` says where the project layer
/// comes from; relative paths are taken from `cwd`.
pub fn resolve_options(
    overrides: &CompilerOptions,
    source: &TsConfigSource,
    cwd: &Utf8Path,
    typescript: &dyn TypeScript,
) -> Result<ResolvedOptions, OptionsError> {
    let mut warnings = Vec::new();

    let tsconfig = match source {
        TsConfigSource::Disabled => None,
        TsConfigSource::Discover => find_tsconfig(cwd),
        TsConfigSource::Path(path) => {
            let path = cwd.join(path);
            if !path.is_file() {
                return Err(OptionsError::TsconfigNotFound(path));
            }
            Some(path)
        }
    };

    let mut project = match &tsconfig {
        Some(path) => {
            debug!(tsconfig = %path, "loading project compiler options");
            CompilerOptions::from_json(path.as_str(), load_compiler_options(path)?)?
        }
        None => CompilerOptions::default(),
    };
    project.normalize(typescript, &mut warnings);

    let mut overrides = overrides.clone();
    overrides.normalize(typescript, &mut warnings);

    let options = CompilerOptions::defaults().merge(project).merge(overrides);

    match options.module {
        Some(kind) if kind.is_bundler_compatible() => {}
        Some(kind) => return Err(OptionsError::UnsupportedModuleKind(kind.to_string())),
        None => return Err(OptionsError::UnsupportedModuleKind("none".to_string())),
    }

    for warning in &warnings {
        warn!("{warning}");
    }

    let parsed = typescript.convert_compiler_options(&options.to_compiler_json(), cwd)?;
    if !parsed.errors.is_empty() {
        let messages: Vec<String> = parsed
            .errors
            .iter()
            .map(|diag| diag.message.flatten())
            .collect();
        for message in &messages {
            error!("{message}");
        }
        return Err(OptionsError::Conversion { messages });
    }

    Ok(ResolvedOptions {
        transformers: options.custom_transformers.clone(),
        options,
        converted: parsed.options,
        tsconfig,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn layer(value: Value) -> CompilerOptions {
        match value {
            Value::Object(map) => CompilerOptions::from_json("test", map).unwrap(),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_module_kind_parsing() {
        assert_eq!("ES6".parse::<ModuleKind>().unwrap(), ModuleKind::Es2015);
        assert_eq!("es2015".parse::<ModuleKind>().unwrap(), ModuleKind::Es2015);
        assert_eq!("CommonJS".parse::<ModuleKind>().unwrap(), ModuleKind::CommonJs);
        assert!("cjs".parse::<ModuleKind>().is_err());
        assert!(ModuleKind::Es2015.is_bundler_compatible());
        assert!(!ModuleKind::EsNext.is_bundler_compatible());
    }

    #[test]
    fn test_layer_keeps_unknown_options() {
        let options = layer(json!({ "module": "es6", "target": "es5", "jsx": "react" }));
        assert_eq!(options.module, Some(ModuleKind::Es2015));
        assert_eq!(options.extra.get("target"), Some(&json!("es5")));
        assert_eq!(options.extra.get("jsx"), Some(&json!("react")));
    }

    #[test]
    fn test_layer_rejects_bad_module() {
        let map = match json!({ "module": "bogus" }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };
        let err = CompilerOptions::from_json("overrides", map).unwrap_err();
        assert!(matches!(err, OptionsError::InvalidLayer { .. }));
        assert!(err.to_string().contains("overrides"));
    }

    #[test]
    fn test_merge_precedence() {
        let base = CompilerOptions::defaults();
        let project = layer(json!({ "sourceMap": false, "target": "es5" }));
        let user = layer(json!({ "target": "es2017", "types": ["node"] }));

        let merged = base.merge(project).merge(user);
        assert_eq!(merged.module, Some(ModuleKind::Es2015));
        assert_eq!(merged.source_map, Some(false));
        assert_eq!(merged.no_emit_helpers, Some(true));
        assert_eq!(merged.types, Some(vec!["node".to_string()]));
        assert_eq!(merged.extra.get("target"), Some(&json!("es2017")));
    }

    #[test]
    fn test_compiler_json_shape() {
        let mut options = CompilerOptions::defaults();
        options.custom_transformers = Some(CustomTransformers::default());
        options.extra.insert("target".into(), json!("es5"));

        let json = options.to_compiler_json();
        assert_eq!(
            Value::Object(json),
            json!({ "module": "es2015", "sourceMap": true, "noEmitHelpers": true, "target": "es5" })
        );
    }
}
