//! CLI argument parsing.

use camino::Utf8PathBuf;
use clap::Parser;

/// Transpile a TypeScript project the way a bundler plugin would.
#[derive(Debug, Parser)]
#[command(name = "ts-plugin")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Project directory
    #[arg(long, default_value = ".")]
    pub workspace: Utf8PathBuf,

    /// Path to the plugin configuration (default: <workspace>/ts-plugin.json)
    #[arg(long)]
    pub config: Option<Utf8PathBuf>,

    /// Output directory (overrides `outDir` from the configuration)
    #[arg(long = "out-dir")]
    pub out_dir: Option<Utf8PathBuf>,

    /// Re-run on every change
    #[arg(long)]
    pub watch: bool,

    /// Keep a language service across files (overrides `useLanguageService`)
    #[arg(long = "language-service")]
    pub language_service: bool,

    /// Resolve one import specifier and exit
    #[arg(long, requires = "importer")]
    pub resolve: Option<String>,

    /// File the resolved import appears in
    #[arg(long)]
    pub importer: Option<String>,

    /// Directory of the `typescript` package to load (default: resolved from the workspace)
    #[arg(long)]
    pub typescript: Option<Utf8PathBuf>,
}
