//! Language services hosted in the runner process.
//!
//! The node side keeps its own copy of the host state. Before every request
//! the Rust host is diffed against what was last sent, and only files whose
//! version changed travel over the pipe.

use crate::protocol::{DiagnosticsKind, EmitResult, FileUpdate, JsDiagnostic, Request};
use crate::runner::{read_file_text, Shared};
use camino::{Utf8Path, Utf8PathBuf};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use ts_service::{
    Diagnostic, EmitOutput, LanguageService, LanguageServiceHost, ScriptVersion, ServiceError,
};

pub(crate) struct TscLanguageService {
    shared: Arc<Shared>,
    id: u64,
    sent_versions: HashMap<Utf8PathBuf, ScriptVersion>,
    sent_names: Vec<Utf8PathBuf>,
    sent_settings: Option<Map<String, Value>>,
    sent_cwd: Option<Utf8PathBuf>,
}

impl TscLanguageService {
    pub(crate) fn new(shared: Arc<Shared>, id: u64) -> Self {
        Self {
            shared,
            id,
            sent_versions: HashMap::new(),
            sent_names: Vec::new(),
            sent_settings: None,
            sent_cwd: None,
        }
    }

    /// Brings the runner's copy of the host up to date.
    fn sync(&mut self, host: &dyn LanguageServiceHost) -> Result<(), ServiceError> {
        let names = host.script_file_names();
        let mut files = Vec::new();
        for name in &names {
            let version = host.script_version(name);
            if version == self.sent_versions.get(name.as_path()).copied() {
                continue;
            }
            let text = host.script_snapshot(name);
            match version {
                Some(version) if text.is_some() => {
                    self.sent_versions.insert(name.clone(), version);
                }
                _ => {
                    self.sent_versions.remove(name.as_path());
                }
            }
            files.push(FileUpdate {
                file_name: name.clone(),
                version: version.map(|v| v.0),
                text,
            });
        }

        let cwd = host.current_directory();
        let cwd_changed = self.sent_cwd.as_deref() != Some(cwd);
        let settings = host.compilation_settings();
        let settings_changed = self.sent_settings.as_ref() != Some(settings);
        let names_changed = self.sent_names != names;

        if files.is_empty() && !cwd_changed && !settings_changed && !names_changed {
            return Ok(());
        }
        debug!(
            service = self.id,
            updated = files.len(),
            names_changed,
            settings_changed,
            "syncing language service host"
        );

        let _: Value = self.shared.call(Request::SyncHost {
            service: self.id,
            cwd: cwd_changed.then_some(cwd),
            settings: settings_changed.then_some(settings),
            file_names: names_changed.then_some(names.as_slice()),
            files,
        })?;

        if cwd_changed {
            self.sent_cwd = Some(cwd.to_path_buf());
        }
        if settings_changed {
            self.sent_settings = Some(settings.clone());
        }
        if names_changed {
            self.sent_names = names;
        }
        Ok(())
    }

    fn diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
        kind: DiagnosticsKind,
        file_name: Option<&Utf8Path>,
    ) -> Result<Vec<Diagnostic>, ServiceError> {
        self.sync(host)?;
        let found: Vec<JsDiagnostic> = self.shared.call(Request::Diagnostics {
            service: self.id,
            kind,
            file_name,
        })?;
        Ok(found
            .into_iter()
            .map(|diag| {
                diag.into_diagnostic(|file| host.script_snapshot(file).or_else(|| read_file_text(file)))
            })
            .collect())
    }
}

impl LanguageService for TscLanguageService {
    fn emit_output(
        &mut self,
        host: &dyn LanguageServiceHost,
        file_name: &Utf8Path,
    ) -> Result<EmitOutput, ServiceError> {
        self.sync(host)?;
        let result: EmitResult = self.shared.call(Request::Emit {
            service: self.id,
            file_name,
        })?;
        Ok(EmitOutput {
            output_files: result.output_files.into_iter().map(Into::into).collect(),
            emit_skipped: result.emit_skipped,
        })
    }

    fn compiler_options_diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
    ) -> Result<Vec<Diagnostic>, ServiceError> {
        self.diagnostics(host, DiagnosticsKind::Options, None)
    }

    fn syntactic_diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
        file_name: &Utf8Path,
    ) -> Result<Vec<Diagnostic>, ServiceError> {
        self.diagnostics(host, DiagnosticsKind::Syntactic, Some(file_name))
    }

    fn semantic_diagnostics(
        &mut self,
        host: &dyn LanguageServiceHost,
        file_name: &Utf8Path,
    ) -> Result<Vec<Diagnostic>, ServiceError> {
        self.diagnostics(host, DiagnosticsKind::Semantic, Some(file_name))
    }
}

impl Drop for TscLanguageService {
    fn drop(&mut self) {
        let _: Result<Value, _> = self
            .shared
            .call(Request::DisposeService { service: self.id });
    }
}
