//! Configuration loading.

use camino::{Utf8Path, Utf8PathBuf};
use serde::Deserialize;
use std::fs;
use thiserror::Error;
use ts_plugin::{PluginOptions, TsConfigSource};

/// Default configuration file name, looked up in the workspace.
pub const CONFIG_FILENAME: &str = "ts-plugin.json";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("invalid configuration in {path}: {source}")]
    Parse {
        path: Utf8PathBuf,
        source: serde_json::Error,
    },
}

/// Contents of `ts-plugin.json`.
///
/// Everything except the keys below is passed to the plugin as
/// [`PluginOptions`], so compiler options sit at the top level just like in
/// a bundler configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CliConfig {
    /// Directory scanned for sources (default: the workspace).
    pub input: Option<Utf8PathBuf>,

    /// Directory the output is written to (default: `dist`).
    pub out_dir: Option<Utf8PathBuf>,

    /// Directory of the `typescript` package to load.
    pub typescript: Option<Utf8PathBuf>,

    #[serde(flatten)]
    pub plugin: PluginOptions,
}

impl CliConfig {
    /// Loads `explicit`, or `ts-plugin.json` in the workspace if present.
    ///
    /// An explicit path must exist. Without one and without a workspace
    /// file, every option takes its default.
    pub fn load(workspace: &Utf8Path, explicit: Option<&Utf8Path>) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => workspace.join(expand(path)),
            None => {
                let candidate = workspace.join(CONFIG_FILENAME);
                if !candidate.exists() {
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let mut config: CliConfig =
            serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.clone(),
                source,
            })?;
        config.expand_paths();
        Ok(config)
    }

    /// Expands `~` in every path-valued setting.
    fn expand_paths(&mut self) {
        for path in [
            &mut self.input,
            &mut self.out_dir,
            &mut self.typescript,
            &mut self.plugin.cwd,
        ]
        .into_iter()
        .flatten()
        {
            *path = expand(path);
        }
        if let TsConfigSource::Path(path) = &mut self.plugin.tsconfig {
            *path = expand(path);
        }
    }
}

fn expand(path: &Utf8Path) -> Utf8PathBuf {
    Utf8PathBuf::from(shellexpand::tilde(path.as_str()).as_ref())
}
