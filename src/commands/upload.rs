//! `upload`, `attach` and `resume` command handlers.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::fs::File;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use transfer_core::upload::{
    ChunkedUploadEngine, UploadProgress, UploadResult, UploadSession, UploadSessionRequest,
};
use transfer_core::TransferError;

use super::Settings;
use crate::cli::{AttachArgs, ResumeArgs, UploadArgs};

/// Whether the engine starts from byte 0 or asks the server where to continue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Fresh,
    Resume,
}

pub async fn run_upload_command(
    settings: &Settings,
    args: &UploadArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let request = UploadSessionRequest::DriveItem {
        item_path: args.item_path.clone(),
        conflict_behavior: args.conflict.into(),
    };
    ensure_regular_file(&args.file)?;
    let engine = build_engine(settings, args.slice_size, cancel)?;
    let mut session = engine
        .sessions()
        .create_for(&settings.base_url, &request)
        .await
        .context("Failed to create upload session")?;

    drive(settings, &engine, &mut session, &args.file, Mode::Fresh).await
}

pub async fn run_attach_command(
    settings: &Settings,
    args: &AttachArgs,
    cancel: CancellationToken,
) -> Result<()> {
    ensure_regular_file(&args.file)?;
    let name = args
        .file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .with_context(|| format!("'{}' has no file name", args.file.display()))?;
    let size = tokio::fs::metadata(&args.file)
        .await
        .with_context(|| format!("Failed to stat '{}'", args.file.display()))?
        .len();

    let request = UploadSessionRequest::Attachment {
        message_id: args.message_id.clone(),
        name,
        size,
    };
    let engine = build_engine(settings, args.slice_size, cancel)?;
    let mut session = engine
        .sessions()
        .create_for(&settings.base_url, &request)
        .await
        .context("Failed to create attachment upload session")?;

    drive(settings, &engine, &mut session, &args.file, Mode::Fresh).await
}

pub async fn run_resume_command(
    settings: &Settings,
    args: &ResumeArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let engine = build_engine(settings, args.slice_size, cancel)?;
    let mut session = UploadSession::new(args.upload_url.clone());
    // Nothing cached: the server's answer is the only source of truth here.
    session.next_expected_ranges.clear();

    drive(settings, &engine, &mut session, &args.file, Mode::Resume).await
}

fn build_engine(
    settings: &Settings,
    slice_size: Option<u64>,
    cancel: CancellationToken,
) -> Result<ChunkedUploadEngine> {
    let slice_size = slice_size.unwrap_or(settings.slice_size);
    let engine = ChunkedUploadEngine::new(settings.transport()?, slice_size, settings.retry_policy())
        .with_context(|| format!("Invalid --slice-size {slice_size}"))?;
    Ok(engine.with_cancellation(cancel))
}

async fn drive(
    settings: &Settings,
    engine: &ChunkedUploadEngine,
    session: &mut UploadSession,
    path: &Path,
    mode: Mode,
) -> Result<()> {
    ensure_regular_file(path)?;
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open '{}'", path.display()))?;
    let total = file
        .metadata()
        .await
        .with_context(|| format!("Failed to stat '{}'", path.display()))?
        .len();

    let bar = progress_bar(total, settings.quiet);
    let mut reporter = {
        let bar = bar.clone();
        move |progress: UploadProgress| bar.set_position(progress.bytes_acknowledged)
    };

    let outcome: Result<UploadResult, TransferError> = match mode {
        Mode::Fresh => engine.upload(session, &mut file, &mut reporter).await,
        Mode::Resume => engine.resume(session, &mut file, &mut reporter).await,
    };
    bar.finish_and_clear();

    match outcome {
        Ok(result) if result.cancelled => {
            warn!(
                acknowledged = result.bytes_acknowledged,
                total, "upload interrupted"
            );
            eprintln!(
                "Upload interrupted at {} of {total} bytes. Continue with:\n  graph-transfer resume {} --session '{}'",
                result.bytes_acknowledged,
                path.display(),
                session.upload_url
            );
            Ok(())
        }
        Ok(result) => {
            info!(total, "upload finished");
            match result.created_resource {
                Some(resource) => println!("{resource}"),
                None => println!("{{}}"),
            }
            Ok(())
        }
        Err(e @ TransferError::SessionExpired { .. }) => {
            Err(e).context("Upload session expired; start a new upload")
        }
        Err(e) if e.is_retryable() => {
            eprintln!(
                "Upload failed with a transient error. Continue later with:\n  graph-transfer resume {} --session '{}'",
                path.display(),
                session.upload_url
            );
            Err(e).context("Upload failed")
        }
        Err(e) => Err(e).context("Upload failed"),
    }
}

fn progress_bar(total: u64, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner} [{elapsed_precise}] [{bar:40}] {bytes}/{total_bytes} ({eta})",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

/// Rejects directories and other non-files before a session is spent on them.
fn ensure_regular_file(path: &Path) -> Result<()> {
    if !path.is_file() {
        bail!("'{}' is not a regular file", path.display());
    }
    Ok(())
}
