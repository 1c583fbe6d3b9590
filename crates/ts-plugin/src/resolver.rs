//! Import resolution through the compiler's module resolver.

use crate::config::DeclarationPolicy;
use crate::session::is_declaration_file;
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use ts_service::{Feature, TypeScript};

/// Declaration suffixes and the implementation suffix each stands in for.
const IMPLEMENTATION_SUFFIXES: [(&str, &str); 3] =
    [(".d.ts", ".js"), (".d.mts", ".mjs"), (".d.cts", ".cjs")];

/// Resolves import specifiers the way the compiler does.
pub struct ModuleResolver {
    typescript: Arc<dyn TypeScript>,
    options: Map<String, Value>,
    policy: DeclarationPolicy,
}

impl ModuleResolver {
    pub fn new(
        typescript: Arc<dyn TypeScript>,
        options: Map<String, Value>,
        policy: DeclarationPolicy,
    ) -> Self {
        Self {
            typescript,
            options,
            policy,
        }
    }

    /// Resolves `specifier` imported from `importer`.
    ///
    /// Returns `None` for entry points, for imports the compiler cannot
    /// resolve, and for declaration files the policy does not map to an
    /// implementation. `None` means "let the host try"; it is never an error.
    pub fn resolve(&self, specifier: &str, importer: Option<&str>) -> Option<Utf8PathBuf> {
        let importer = importer?;
        let containing_file = Utf8PathBuf::from(importer.replace('\\', "/"));

        let options = self
            .typescript
            .version()
            .supports(Feature::ResolverCompilerOptions)
            .then_some(&self.options);

        let resolved = match self
            .typescript
            .resolve_module_name(specifier, &containing_file, options)
        {
            Ok(Some(resolved)) => resolved,
            Ok(None) => {
                debug!(specifier, importer = %containing_file, "module not resolved");
                return None;
            }
            Err(e) => {
                warn!(specifier, importer = %containing_file, "module resolution failed: {e}");
                return None;
            }
        };

        let path = resolved.resolved_file_name;
        if !is_declaration_file(&path) {
            return Some(path);
        }

        match self.policy {
            DeclarationPolicy::Reject => {
                debug!(specifier, declaration = %path, "ignoring declaration file");
                None
            }
            DeclarationPolicy::Implementation => implementation_for(&path),
        }
    }
}

/// The implementation file next to a declaration file, if it exists.
fn implementation_for(declaration: &Utf8Path) -> Option<Utf8PathBuf> {
    let name = declaration.as_str();
    IMPLEMENTATION_SUFFIXES
        .iter()
        .find_map(|(decl, implementation)| {
            name.strip_suffix(decl)
                .map(|stem| Utf8PathBuf::from(format!("{stem}{implementation}")))
        })
        .filter(|candidate| candidate.is_file())
}
