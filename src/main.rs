//! CLI entry point for gumroad-mirror.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use mirror_core::{EntityMapper, HttpClient, RunOrchestrator, Settings, load_config};

mod cli;

use cli::Args;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(args.default_log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let loaded = load_config(args.config.as_deref()).context("failed to load configuration")?;
    match &loaded.path {
        Some(path) => info!(path = %path.display(), "loaded config file"),
        None => debug!("no config file found; using defaults"),
    }
    let settings = Settings::resolve(loaded.config, args.output_dir.clone())
        .context("invalid configuration")?;
    if settings.cookies.app_session.is_none() {
        warn!("no app_session cookie configured; the library page will likely require a login");
    }

    let client = HttpClient::new(settings.client_settings()).context("failed to set up HTTP")?;
    let orchestrator = RunOrchestrator::new(
        Arc::new(client),
        EntityMapper::new(settings.source_site()),
        settings.run_options(),
    );

    info!(output = %settings.output_dir.display(), "gumroad-mirror starting");
    let summary = orchestrator.run().await.context("run aborted")?;

    if !args.quiet {
        println!(
            "Products: {} processed, {} failed",
            summary.products_processed, summary.products_failed
        );
        println!(
            "Files: {} downloaded ({} bytes), {} up to date ({} bytes), {} failed, {} out of scope",
            summary.files_downloaded,
            summary.bytes_downloaded,
            summary.files_skipped,
            summary.bytes_skipped,
            summary.files_failed,
            summary.out_of_scope
        );
        if !summary.issues.is_empty() {
            println!("\nCheck manually ({}):", summary.issues.len());
            for issue in &summary.issues {
                println!("  {issue}");
            }
        }
    }

    if summary.files_failed > 0 || summary.products_failed > 0 {
        Ok(ExitCode::from(2))
    } else {
        Ok(ExitCode::SUCCESS)
    }
}
