//! Compiler versions and the feature table gated on them.

use semver::Version;
use std::fmt;
use thiserror::Error;

/// Error returned when a compiler reports an unparseable version.
#[derive(Debug, Error)]
#[error("invalid compiler version '{0}'")]
pub struct VersionError(pub String);

/// Compiler features whose availability depends on the compiler version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    /// The module-name resolver accepts compiler options.
    ResolverCompilerOptions,
    /// The `strictNullChecks` option exists.
    StrictNullChecks,
    /// Ambient `@types` packages are resolved through the `types` option.
    AmbientTypes,
    /// Transpilation accepts custom transformers.
    CustomTransformers,
}

impl Feature {
    /// All known features.
    pub const ALL: [Feature; 4] = [
        Feature::ResolverCompilerOptions,
        Feature::StrictNullChecks,
        Feature::AmbientTypes,
        Feature::CustomTransformers,
    ];

    /// First compiler release shipping this feature.
    pub fn minimum_version(self) -> Version {
        match self {
            Feature::ResolverCompilerOptions => Version::new(1, 8, 0),
            Feature::StrictNullChecks => Version::new(1, 9, 0),
            Feature::AmbientTypes => Version::new(2, 0, 0),
            Feature::CustomTransformers => Version::new(2, 3, 0),
        }
    }

    /// The option name users write to request this feature, if any.
    pub fn option_name(self) -> Option<&'static str> {
        match self {
            Feature::StrictNullChecks => Some("strictNullChecks"),
            Feature::CustomTransformers => Some("customTransformers"),
            Feature::ResolverCompilerOptions | Feature::AmbientTypes => None,
        }
    }
}

/// A compiler version as reported by the compiler itself.
///
/// Pre-release and build suffixes (`2.0.0-dev.20160601`, `1.8.0-fake`) are
/// kept for display but ignored when gating features, so a nightly counts as
/// the release it precedes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerVersion {
    raw: String,
    release: Version,
}

impl CompilerVersion {
    /// Parses a version string such as `5.4.5`, `2.0` or `1.8.0-fake`.
    pub fn parse(raw: &str) -> Result<Self, VersionError> {
        let trimmed = raw.trim();
        let core = trimmed.trim_start_matches('v');
        let core = core.split(|c: char| c == '-' || c == '+').next().unwrap_or_default();

        let mut parts = [0u64; 3];
        let mut count = 0;
        for (idx, part) in core.split('.').enumerate() {
            if idx >= parts.len() {
                return Err(VersionError(raw.to_string()));
            }
            parts[idx] = part
                .parse()
                .map_err(|_| VersionError(raw.to_string()))?;
            count += 1;
        }
        if count == 0 {
            return Err(VersionError(raw.to_string()));
        }

        Ok(Self {
            raw: trimmed.to_string(),
            release: Version::new(parts[0], parts[1], parts[2]),
        })
    }

    /// The version string as reported.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The release this version gates as.
    pub fn release(&self) -> &Version {
        &self.release
    }

    /// Returns whether this compiler version ships `feature`.
    pub fn supports(&self, feature: Feature) -> bool {
        self.release >= feature.minimum_version()
    }
}

impl fmt::Display for CompilerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
