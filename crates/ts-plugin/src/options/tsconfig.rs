//! tsconfig discovery and `extends` flattening.

use super::OptionsError;
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::fs;

/// Name of the project config file looked up from the working directory.
pub const TSCONFIG_FILENAME: &str = "tsconfig.json";

/// Options whose values are paths relative to the config that declares them.
const PATH_OPTIONS: [&str; 4] = ["baseUrl", "rootDir", "outDir", "declarationDir"];

/// Options whose values are lists of paths.
const PATH_LIST_OPTIONS: [&str; 1] = ["typeRoots"];

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Extends {
    One(String),
    Many(Vec<String>),
}

impl Extends {
    fn into_vec(self) -> Vec<String> {
        match self {
            Extends::One(one) => vec![one],
            Extends::Many(many) => many,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    extends: Option<Extends>,
    #[serde(default)]
    compiler_options: Map<String, Value>,
}

/// Finds the nearest tsconfig by walking up from `cwd`.
pub fn find_tsconfig(cwd: &Utf8Path) -> Option<Utf8PathBuf> {
    cwd.ancestors()
        .map(|dir| dir.join(TSCONFIG_FILENAME))
        .find(|candidate| candidate.is_file())
}

/// Loads the `compilerOptions` of `path` with its `extends` chain applied.
///
/// Parents are applied in order beneath the child, so later parents override
/// earlier ones and the child overrides them all. Path-valued options are made
/// absolute relative to the config that declares them.
pub fn load_compiler_options(path: &Utf8Path) -> Result<Map<String, Value>, OptionsError> {
    let mut stack = Vec::new();
    load_recursive(path, &mut stack)
}

fn load_recursive(
    path: &Utf8Path,
    stack: &mut Vec<Utf8PathBuf>,
) -> Result<Map<String, Value>, OptionsError> {
    let key = canonical(path);
    if stack.contains(&key) {
        let mut chain = stack.clone();
        chain.push(key);
        return Err(OptionsError::CircularExtends { chain });
    }
    stack.push(key);

    let raw = read_config(path)?;
    let dir = path.parent().unwrap_or(Utf8Path::new("."));

    let mut merged = Map::new();
    if let Some(extends) = raw.extends {
        for specifier in extends.into_vec() {
            let parent = resolve_extends(&specifier, dir).ok_or_else(|| {
                OptionsError::ExtendsNotFound {
                    specifier: specifier.clone(),
                    from: path.to_path_buf(),
                }
            })?;
            merged.extend(load_recursive(&parent, stack)?);
        }
    }

    let mut own = raw.compiler_options;
    rebase_paths(&mut own, dir);
    merged.extend(own);

    stack.pop();
    Ok(merged)
}

fn canonical(path: &Utf8Path) -> Utf8PathBuf {
    path.canonicalize_utf8()
        .unwrap_or_else(|_| path.to_path_buf())
}

fn read_config(path: &Utf8Path) -> Result<RawConfig, OptionsError> {
    let content = fs::read_to_string(path).map_err(|source| OptionsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let content = remove_trailing_commas(&remove_json_comments(&content));
    serde_json::from_str(&content).map_err(|source| OptionsError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolves an `extends` specifier declared in a config under `dir`.
fn resolve_extends(specifier: &str, dir: &Utf8Path) -> Option<Utf8PathBuf> {
    let is_path = specifier.starts_with("./")
        || specifier.starts_with("../")
        || Utf8Path::new(specifier).is_absolute();

    if is_path {
        let candidate = normalize(&dir.join(specifier));
        return with_json_extension(candidate);
    }

    // Package specifier: `pkg`, `pkg/file` or `@scope/pkg/file`.
    dir.ancestors().find_map(|ancestor| {
        let base = ancestor.join("node_modules").join(specifier);
        with_json_extension(base.clone()).or_else(|| {
            let nested = base.join(TSCONFIG_FILENAME);
            nested.is_file().then_some(nested)
        })
    })
}

/// Lexically removes `.` and `..` components.
fn normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut out = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            Utf8Component::CurDir => {}
            Utf8Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_str()),
        }
    }
    out
}

fn with_json_extension(candidate: Utf8PathBuf) -> Option<Utf8PathBuf> {
    if candidate.is_file() {
        return Some(candidate);
    }
    if candidate.extension() != Some("json") {
        let with_ext = Utf8PathBuf::from(format!("{candidate}.json"));
        if with_ext.is_file() {
            return Some(with_ext);
        }
    }
    None
}

fn rebase_paths(options: &mut Map<String, Value>, dir: &Utf8Path) {
    for key in PATH_OPTIONS {
        if let Some(Value::String(value)) = options.get_mut(key) {
            *value = normalize(&dir.join(value.as_str())).to_string();
        }
    }
    for key in PATH_LIST_OPTIONS {
        if let Some(Value::Array(values)) = options.get_mut(key) {
            for value in values.iter_mut() {
                if let Value::String(entry) = value {
                    *entry = normalize(&dir.join(entry.as_str())).to_string();
                }
            }
        }
    }
}

/// Removes single-line and multi-line comments from JSON.
fn remove_json_comments(json: &str) -> String {
    let mut result = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            result.push(c);
            if c == '"' {
                in_string = false;
            } else if c == '\\' {
                if let Some(next) = chars.next() {
                    result.push(next);
                }
            }
        } else if c == '"' {
            result.push(c);
            in_string = true;
        } else if c == '/' {
            match chars.peek() {
                Some('/') => {
                    chars.next();
                    while let Some(&next) = chars.peek() {
                        if next == '\n' {
                            break;
                        }
                        chars.next();
                    }
                }
                Some('*') => {
                    chars.next();
                    while let Some(next) = chars.next() {
                        if next == '*' && chars.peek() == Some(&'/') {
                            chars.next();
                            break;
                        }
                    }
                }
                _ => result.push(c),
            }
        } else {
            result.push(c);
        }
    }

    result
}

/// Drops commas that directly precede a closing `}` or `]`.
fn remove_trailing_commas(json: &str) -> String {
    let mut result = String::with_capacity(json.len());
    let mut in_string = false;
    let mut escaped = false;
    let mut pending_comma: Option<String> = None;

    for c in json.chars() {
        if in_string {
            result.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        if let Some(buffer) = pending_comma.as_mut() {
            if c.is_whitespace() {
                buffer.push(c);
                continue;
            }
            let mut buffer = pending_comma.take().unwrap_or_default();
            if c == '}' || c == ']' {
                buffer.remove(0);
            }
            result.push_str(&buffer);
        }

        match c {
            ',' => pending_comma = Some(String::from(",")),
            '"' => {
                in_string = true;
                result.push(c);
            }
            _ => result.push(c),
        }
    }

    if let Some(buffer) = pending_comma {
        result.push_str(&buffer);
    }
    result
}
