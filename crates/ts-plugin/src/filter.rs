//! Include/exclude filtering of module ids.

use crate::config::Patterns;
use camino::{Utf8Path, Utf8PathBuf};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use thiserror::Error;

const DEFAULT_INCLUDE: [&str; 2] = ["*.{ts,tsx}", "**/*.{ts,tsx}"];
const DEFAULT_EXCLUDE: [&str; 2] = ["*.d.ts", "**/*.d.ts"];

/// Invalid glob pattern.
#[derive(Debug, Error)]
#[error("invalid glob pattern '{pattern}': {message}")]
pub struct FilterError {
    pub pattern: String,
    pub message: String,
}

/// Decides which module ids the plugin transforms.
#[derive(Debug, Clone)]
pub struct Filter {
    include: GlobSet,
    exclude: GlobSet,
    cwd: Utf8PathBuf,
}

impl Filter {
    /// Builds a filter; missing pattern lists fall back to the defaults.
    pub fn new(
        include: Option<&Patterns>,
        exclude: Option<&Patterns>,
        cwd: &Utf8Path,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            include: build(include, &DEFAULT_INCLUDE)?,
            exclude: build(exclude, &DEFAULT_EXCLUDE)?,
            cwd: cwd.to_path_buf(),
        })
    }

    /// Returns true if `id` should be transformed.
    ///
    /// Ids starting with `\0` belong to other plugins and never match.
    pub fn matches(&self, id: &str) -> bool {
        if id.starts_with('\0') {
            return false;
        }

        let normalized = id.replace('\\', "/");
        let relative = Utf8Path::new(&normalized)
            .strip_prefix(&self.cwd)
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|_| normalized.clone());

        let hit = |set: &GlobSet| set.is_match(&normalized) || set.is_match(&relative);
        hit(&self.include) && !hit(&self.exclude)
    }
}

fn build(patterns: Option<&Patterns>, defaults: &[&str]) -> Result<GlobSet, FilterError> {
    let patterns: Vec<&str> = match patterns {
        Some(Patterns(list)) => list.iter().map(String::as_str).collect(),
        None => defaults.to_vec(),
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        // `*` stays within one path segment; only `**` crosses directories.
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|e| FilterError {
                pattern: pattern.to_string(),
                message: e.to_string(),
            })?;
        builder.add(glob);
    }
    builder.build().map_err(|e| FilterError {
        pattern: String::new(),
        message: e.to_string(),
    })
}
