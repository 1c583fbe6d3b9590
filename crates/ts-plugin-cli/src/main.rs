//! ts-plugin: transpile a TypeScript project the way a bundler plugin would.

mod cli;
mod config;
mod orchestrator;

use clap::Parser;
use cli::Args;
use miette::Result;
use tracing_subscriber::filter::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("TS_PLUGIN_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match orchestrator::run(args).await {
        Ok(summary) => {
            if summary.failed > 0 {
                std::process::exit(1);
            }
            Ok(())
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}
