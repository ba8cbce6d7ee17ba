//! `list` command handler: walk a paged collection, optionally pausing
//! every N items and resuming after a delay.

use std::io::{self, Write};
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use transfer_core::TransferError;
use transfer_core::paging::{IteratorState, PageFetcher, PageIterator, RequestOptions, Visitor};

use super::Settings;
use crate::cli::ListArgs;

pub async fn run_list_command(
    settings: &Settings,
    args: &ListArgs,
    cancel: CancellationToken,
) -> Result<()> {
    let url = settings.resolve_url(&args.target);
    let options = request_options(settings, args);
    debug!(%url, %options, "listing collection");

    let fetcher = PageFetcher::new(settings.transport()?).with_options(options);
    let iterator =
        PageIterator::<Value>::from_url(fetcher, url.clone()).with_cancellation(cancel.clone());
    let mut sink = ItemSink::new(io::stdout().lock(), args.pause_after);

    let outcome = walk(iterator, &mut sink, Duration::from_secs(args.pause_secs), &cancel).await;
    if matches!(&outcome, Err(e) if e.is_cancelled()) {
        info!("listing cancelled");
        return Ok(());
    }
    let state = outcome.with_context(|| format!("Failed to list '{url}'"))?;
    sink.finish()?;

    info!(?state, visited = sink.visited, "listing finished");
    Ok(())
}

/// Writes each item as one JSON line and asks for a pause every
/// `pause_after` items. A failed write stops the walk and is kept for
/// [`finish`](Self::finish).
struct ItemSink<W> {
    out: W,
    pause_after: Option<u64>,
    visited: u64,
    error: Option<io::Error>,
}

impl<W: Write> ItemSink<W> {
    fn new(out: W, pause_after: Option<u64>) -> Self {
        Self {
            out,
            pause_after,
            visited: 0,
            error: None,
        }
    }

    fn failed(&self) -> bool {
        self.error.is_some()
    }

    /// Flushes the output and surfaces the first write error.
    fn finish(&mut self) -> Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e).context("Failed to write listing output");
        }
        self.out.flush().context("Failed to write listing output")
    }
}

impl<W: Write> Visitor<Value> for ItemSink<W> {
    fn visit(&mut self, item: &Value) -> bool {
        if let Err(e) = writeln!(self.out, "{item}") {
            self.error = Some(e);
            return false;
        }
        self.visited += 1;
        self.pause_after.is_none_or(|n| self.visited % n != 0)
    }
}

/// Drives `iterator` to completion, sleeping `pause` whenever the sink asks
/// for a break. Stops early once the sink has failed.
async fn walk<W: Write>(
    mut iterator: PageIterator<Value>,
    sink: &mut ItemSink<W>,
    pause: Duration,
    cancel: &CancellationToken,
) -> Result<IteratorState, TransferError> {
    let mut state = iterator.iterate(sink).await?;

    while state == IteratorState::Paused && !sink.failed() {
        info!(pause_secs = pause.as_secs(), "listing paused");
        tokio::select! {
            () = cancel.cancelled() => return Err(TransferError::Cancelled),
            () = tokio::time::sleep(pause) => {}
        }
        state = iterator.resume(sink).await?;
    }

    if let Some(delta_link) = iterator.delta_link() {
        info!(delta_link, "delta link for the next sync");
    }
    Ok(state)
}

fn request_options(settings: &Settings, args: &ListArgs) -> RequestOptions {
    let mut options = RequestOptions::new();
    if let Some(size) = settings.page_size {
        options = options.max_page_size(size);
    }
    for (name, value) in &args.headers {
        options = options.header(name.clone(), value.clone());
    }
    if let Some(select) = &args.select {
        options = options.query("$select", select.clone());
    }
    if let Some(top) = args.top {
        options = options.query("$top", top.to_string());
    }
    options
}
