//! Build and watch passes.
//!
//! The binary plays the part of a bundler: it walks the input directory,
//! hands every TypeScript file to the plugin's `transform` hook and writes
//! what comes back next to a shared helper module.

use crate::cli::Args;
use crate::config::{CliConfig, ConfigError};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use std::fs;
use std::io::Write;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use ts_plugin::session::is_declaration_file;
use ts_plugin::{PluginError, TransformOutput, TypeScriptPlugin, HELPERS_ID};
use ts_service::TypeScript;
use tsc_runner::{TscError, TscRunner};
use walkdir::WalkDir;

/// File name of the helper module in the output directory.
pub const HELPERS_FILENAME: &str = "typescript-helpers.js";

const SOURCE_EXTENSIONS: [&str; 4] = ["ts", "tsx", "mts", "cts"];

/// Orchestration errors.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Runner(#[from] TscError),

    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// Failed to read a source file.
    #[error("failed to read {path}: {source}")]
    ReadFailed {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    /// Failed to write an output file.
    #[error("failed to write {path}: {source}")]
    WriteFailed {
        path: Utf8PathBuf,
        source: std::io::Error,
    },

    #[error("cannot determine the working directory: {0}")]
    WorkingDirectory(String),

    /// Watch error.
    #[error("watch error: {0}")]
    WatchFailed(String),
}

/// Counts for one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassSummary {
    /// Files transformed and written.
    pub transformed: usize,
    /// Files the plugin's filter declined.
    pub skipped: usize,
    /// Files whose errors were deferred to the host.
    pub failed: usize,
}

/// Where sources are read from and output is written to.
#[derive(Debug, Clone)]
pub struct Layout {
    pub workspace: Utf8PathBuf,
    pub input: Utf8PathBuf,
    pub out_dir: Utf8PathBuf,
}

impl Layout {
    pub fn new(workspace: &Utf8Path, config: &CliConfig, args: &Args) -> Self {
        let input = config
            .input
            .as_deref()
            .map(|input| workspace.join(input))
            .unwrap_or_else(|| workspace.to_path_buf());
        let out_dir = args
            .out_dir
            .as_deref()
            .or(config.out_dir.as_deref())
            .map(|out| workspace.join(out))
            .unwrap_or_else(|| workspace.join("dist"));
        Self {
            workspace: workspace.to_path_buf(),
            input,
            out_dir,
        }
    }

    pub fn helpers_path(&self) -> Utf8PathBuf {
        self.out_dir.join(HELPERS_FILENAME)
    }

    /// Paths never read as sources: dependencies and our own output.
    pub fn is_ignored(&self, path: &Utf8Path) -> bool {
        path.starts_with(&self.out_dir)
            || path
                .components()
                .any(|c| matches!(c, Utf8Component::Normal("node_modules")))
    }

    /// TypeScript files under the input directory, in a stable order.
    pub fn sources(&self) -> Vec<Utf8PathBuf> {
        let mut files: Vec<Utf8PathBuf> = WalkDir::new(&self.input)
            .into_iter()
            .filter_entry(|entry| {
                let hidden = entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.');
                let ignored = Utf8Path::from_path(entry.path())
                    .map(|path| self.is_ignored(path))
                    .unwrap_or(true);
                !hidden && !ignored
            })
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| Utf8PathBuf::from_path_buf(entry.into_path()).ok())
            .filter(|path| is_source(path))
            .collect();
        files.sort();
        files
    }

    /// `src/app/main.ts` -> `<out>/app/main.js` for input `src`.
    pub fn output_path(&self, source: &Utf8Path) -> Utf8PathBuf {
        let relative = source
            .strip_prefix(&self.input)
            .ok()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from(source.file_name().unwrap_or("index.ts")));
        self.out_dir.join(relative).with_extension(output_extension(source))
    }

    /// Writes one transformed file and its map.
    ///
    /// The helper import is pointed at the helper module in the output
    /// directory and the map's sources at the original file.
    pub fn write_output(
        &self,
        source: &Utf8Path,
        output: TransformOutput,
    ) -> Result<Utf8PathBuf, OrchestratorError> {
        let target = self.output_path(source);
        let target_dir = target
            .parent()
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| self.out_dir.clone());
        create_dir(&target_dir)?;

        let helpers = import_specifier(&target_dir, &self.helpers_path());
        let mut code = output
            .code
            .replace(&format!("'{HELPERS_ID}'"), &format!("'{helpers}'"));

        if let Some(mut map) = output.map {
            let map_path = Utf8PathBuf::from(format!("{target}.map"));
            map.file = target.file_name().map(str::to_string);
            map.source_root = None;
            map.sources = vec![relative_path(&target_dir, source)];
            write_file(&map_path, &map.to_json())?;
            if let Some(name) = map_path.file_name() {
                code.push_str(&format!("\n//# sourceMappingURL={name}"));
            }
        }

        write_file(&target, &code)?;
        Ok(target)
    }
}

/// Runs the binary: one build pass, then watch passes if requested.
pub async fn run(args: Args) -> Result<PassSummary, OrchestratorError> {
    let workspace = absolute(&args.workspace)?;
    let config = CliConfig::load(&workspace, args.config.as_deref())?;

    let typescript = args
        .typescript
        .as_deref()
        .or(config.typescript.as_deref())
        .map(|dir| workspace.join(dir));
    let runner = TscRunner::spawn(workspace.clone(), typescript)?;
    debug!(version = %runner.version(), "loaded typescript");

    let layout = Layout::new(&workspace, &config, &args);
    let mut options = config.plugin;
    if args.language_service {
        options.use_language_service = true;
    }
    options.cwd = Some(match options.cwd.take() {
        Some(cwd) => workspace.join(cwd),
        None => workspace.clone(),
    });
    let mut plugin = TypeScriptPlugin::new(options, Arc::new(runner))?;

    if let Some(specifier) = &args.resolve {
        let importer = args
            .importer
            .as_deref()
            .map(|importer| workspace.join(importer).into_string());
        match plugin.resolve_id(specifier, importer.as_deref()) {
            Some(id) => println!("{id}"),
            None => println!("{specifier}: left to the host"),
        }
        return Ok(PassSummary::default());
    }

    let summary = run_pass(&mut plugin, &layout)?;
    print_summary(&summary, &layout);

    if args.watch {
        return run_watch_mode(&mut plugin, &layout).await;
    }

    Ok(summary)
}

/// One build: every source through `transform`, then the helper module.
pub fn run_pass<W: Write>(
    plugin: &mut TypeScriptPlugin<W>,
    layout: &Layout,
) -> Result<PassSummary, OrchestratorError> {
    plugin.build_start()?;

    let mut summary = PassSummary::default();
    for source in layout.sources() {
        let code = fs::read_to_string(&source).map_err(|e| OrchestratorError::ReadFailed {
            path: source.clone(),
            source: e,
        })?;

        match plugin.transform(&code, source.as_str()) {
            Ok(Some(output)) => {
                let target = layout.write_output(&source, output)?;
                debug!(%source, %target, "wrote output");
                summary.transformed += 1;
            }
            Ok(None) => summary.skipped += 1,
            Err(err) if !err.is_fatal() => {
                warn!("{err}");
                summary.failed += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    if summary.transformed > 0 {
        if let Some(helpers) = plugin.resolve_id(HELPERS_ID, None) {
            if let Some(text) = plugin.load(&helpers) {
                create_dir(&layout.out_dir)?;
                write_file(&layout.helpers_path(), text)?;
            }
        }
    }

    plugin.write_bundle();
    Ok(summary)
}

fn print_summary(summary: &PassSummary, layout: &Layout) {
    let out_dir = layout
        .out_dir
        .strip_prefix(&layout.workspace)
        .unwrap_or(&layout.out_dir);
    println!(
        "Transformed {} file(s) into {}",
        summary.transformed, out_dir
    );
    if summary.failed > 0 {
        println!("{} file(s) had errors", summary.failed);
    }
}

/// Runs in watch mode.
async fn run_watch_mode<W: Write>(
    plugin: &mut TypeScriptPlugin<W>,
    layout: &Layout,
) -> Result<PassSummary, OrchestratorError> {
    use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
    use std::time::Duration;

    // Set up file watcher with tokio channel
    let (tx, mut rx) = tokio::sync::mpsc::channel(100);

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<notify::Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.blocking_send(event);
            }
        },
        Config::default().with_poll_interval(Duration::from_secs(1)),
    )
    .map_err(|e| OrchestratorError::WatchFailed(e.to_string()))?;

    watcher
        .watch(layout.input.as_std_path(), RecursiveMode::Recursive)
        .map_err(|e| OrchestratorError::WatchFailed(e.to_string()))?;

    println!("Watching for changes... (Ctrl+C to stop)\n");

    while let Some(event) = rx.recv().await {
        let mut paths = event.paths;
        while let Ok(more) = rx.try_recv() {
            paths.extend(more.paths);
        }

        let mut changed: Vec<Utf8PathBuf> = paths
            .into_iter()
            .filter_map(|p| Utf8PathBuf::from_path_buf(p).ok())
            .filter(|p| is_source(p) && !layout.is_ignored(p))
            .collect();
        changed.sort();
        changed.dedup();
        if changed.is_empty() {
            continue;
        }

        // Declarations never pass through `transform`; refresh them directly.
        for path in &changed {
            if is_declaration_file(path) && plugin.session().file_version(path).is_some() {
                if let Ok(code) = fs::read_to_string(path) {
                    plugin.refresh_file(path.as_str(), &code);
                }
            }
        }

        println!("File changed, rebuilding...\n");
        let summary = run_pass(plugin, layout)?;
        print_summary(&summary, layout);
    }

    Err(OrchestratorError::WatchFailed(
        "watch channel closed unexpectedly".to_string(),
    ))
}

fn is_source(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| SOURCE_EXTENSIONS.contains(&ext))
        .unwrap_or(false)
}

fn output_extension(source: &Utf8Path) -> &'static str {
    match source.extension() {
        Some("mts") => "mjs",
        Some("cts") => "cjs",
        _ => "js",
    }
}

/// Path of `to` relative to the directory `from_dir`, with `/` separators.
fn relative_path(from_dir: &Utf8Path, to: &Utf8Path) -> String {
    let from: Vec<_> = from_dir.components().collect();
    let target: Vec<_> = to.components().collect();
    let common = from
        .iter()
        .zip(&target)
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<&str> = vec![".."; from.len() - common];
    parts.extend(target[common..].iter().map(|c| c.as_str()));
    parts.join("/")
}

/// Like [`relative_path`], but always usable as an ES import specifier.
fn import_specifier(from_dir: &Utf8Path, to: &Utf8Path) -> String {
    let relative = relative_path(from_dir, to);
    if relative.starts_with("../") {
        relative
    } else {
        format!("./{relative}")
    }
}

fn absolute(path: &Utf8Path) -> Result<Utf8PathBuf, OrchestratorError> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir()
        .map_err(|e| OrchestratorError::WorkingDirectory(e.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd).map_err(|dir| {
        OrchestratorError::WorkingDirectory(format!("{} is not UTF-8", dir.display()))
    })?;
    Ok(match path.as_str() {
        "." => cwd,
        _ => cwd.join(path),
    })
}

fn create_dir(path: &Utf8Path) -> Result<(), OrchestratorError> {
    fs::create_dir_all(path).map_err(|source| OrchestratorError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })
}

fn write_file(path: &Utf8Path, contents: &str) -> Result<(), OrchestratorError> {
    fs::write(path, contents).map_err(|source| OrchestratorError::WriteFailed {
        path: path.to_path_buf(),
        source,
    })
}
