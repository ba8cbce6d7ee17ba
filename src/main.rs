//! CLI entry point for graph-transfer.

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

mod app_config;
mod cli;
mod commands;

use cli::{Args, Command};
use commands::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    debug!(command = ?args.command, "CLI arguments parsed");

    let loaded = app_config::load_config(args.config.as_deref())?;
    match &loaded.path {
        Some(path) if loaded.config.is_some() => debug!(path = %path.display(), "config loaded"),
        Some(path) => debug!(path = %path.display(), "no config file, using defaults"),
        None => debug!("config path unresolved, using defaults"),
    }
    let settings = Settings::resolve(&args, &loaded.file())?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    match &args.command {
        Command::Upload(upload) => commands::run_upload_command(&settings, upload, cancel).await,
        Command::Attach(attach) => commands::run_attach_command(&settings, attach, cancel).await,
        Command::Resume(resume) => commands::run_resume_command(&settings, resume, cancel).await,
        Command::List(list) => commands::run_list_command(&settings, list, cancel).await,
    }
}

/// First Ctrl-C cancels at the next slice or page boundary.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, stopping at the next boundary");
                cancel.cancel();
            }
            Err(e) => warn!(error = %e, "could not listen for Ctrl-C"),
        }
    });
}
