//! Plugin configuration.

use crate::options::CompilerOptions;
use camino::Utf8PathBuf;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Where the project config layer comes from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TsConfigSource {
    /// Look for the nearest `tsconfig.json` above the working directory.
    #[default]
    Discover,
    /// Use no project config at all.
    Disabled,
    /// Use this file; it is an error if it does not exist.
    Path(Utf8PathBuf),
}

impl<'de> Deserialize<'de> for TsConfigSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Path(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => TsConfigSource::Discover,
            Raw::Flag(false) => TsConfigSource::Disabled,
            Raw::Path(path) if path.is_empty() => {
                return Err(de::Error::custom("'tsconfig' path must not be empty"))
            }
            Raw::Path(path) => TsConfigSource::Path(path.into()),
        })
    }
}

/// What to do when the compiler resolves an import to a declaration file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeclarationPolicy {
    /// Treat it as unresolved and let the host's own resolution take over.
    #[default]
    Reject,
    /// Use the sibling `.js` file when one exists on disk.
    Implementation,
}

/// One glob or a list of globs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patterns(pub Vec<String>);

impl<'de> Deserialize<'de> for Patterns {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            One(String),
            Many(Vec<String>),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::One(one) => Patterns(vec![one]),
            Raw::Many(many) => Patterns(many),
        })
    }
}

/// Options accepted by [`TypeScriptPlugin`](crate::TypeScriptPlugin).
///
/// Keys the plugin does not recognise are compiler options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PluginOptions {
    /// Files to transform. Defaults to TypeScript sources.
    pub include: Option<Patterns>,

    /// Files to skip. Defaults to declaration files.
    pub exclude: Option<Patterns>,

    pub tsconfig: TsConfigSource,

    /// Keep a language service across files instead of transpiling each
    /// file in isolation.
    pub use_language_service: bool,

    /// Source text served for the helper module instead of the built-in one.
    pub tslib: Option<String>,

    pub declaration_resolution: DeclarationPolicy,

    /// Fail rebuilds (every pass after the first) on error diagnostics too.
    pub abort_on_rebuild_errors: bool,

    /// Working directory; the process's if unset.
    pub cwd: Option<Utf8PathBuf>,

    #[serde(flatten)]
    pub compiler_options: CompilerOptions,
}
