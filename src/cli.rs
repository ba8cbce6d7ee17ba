//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use transfer_core::upload::ConflictBehavior;

/// Resumable large-file uploads and paged listings against Microsoft Graph.
#[derive(Parser, Debug)]
#[command(name = "graph-transfer")]
#[command(author, version, about)]
pub struct Args {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (defaults to $XDG_CONFIG_HOME/graph-transfer/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Access token sent as `Authorization: Bearer <token>`
    #[arg(long, env = "GRAPH_TOKEN", hide_env_values = true, global = true)]
    pub token: Option<String>,

    /// Maximum attempts per slice for transient failures (1-10)
    #[arg(short = 'r', long, global = true, value_parser = clap::value_parser!(u32).range(1..=10))]
    pub max_retries: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Upload a file to a path in your OneDrive
    Upload(UploadArgs),

    /// Attach a large file to a draft message
    Attach(AttachArgs),

    /// Continue an interrupted upload session
    Resume(ResumeArgs),

    /// List every item of a paged collection, one JSON object per line
    List(ListArgs),
}

/// Arguments for `upload`.
#[derive(clap::Args, Debug)]
pub struct UploadArgs {
    /// Local file to upload
    pub file: PathBuf,

    /// Destination path under the drive root, e.g. `Documents/video.mp4`
    #[arg(long = "to", value_name = "ITEM_PATH")]
    pub item_path: String,

    /// What to do if the destination exists
    #[arg(long, value_enum, default_value_t = ConflictArg::Replace)]
    pub conflict: ConflictArg,

    /// Slice size in bytes (multiple of 327680)
    #[arg(long)]
    pub slice_size: Option<u64>,
}

/// Arguments for `attach`.
#[derive(clap::Args, Debug)]
pub struct AttachArgs {
    /// Local file to attach
    pub file: PathBuf,

    /// Id of the draft message
    #[arg(long = "message", value_name = "ID")]
    pub message_id: String,

    /// Slice size in bytes (multiple of 327680)
    #[arg(long)]
    pub slice_size: Option<u64>,
}

/// Arguments for `resume`.
#[derive(clap::Args, Debug)]
pub struct ResumeArgs {
    /// The file originally being uploaded
    pub file: PathBuf,

    /// Upload URL printed when the upload was interrupted
    #[arg(long = "session", value_name = "UPLOAD_URL")]
    pub upload_url: String,

    /// Slice size in bytes (multiple of 327680)
    #[arg(long)]
    pub slice_size: Option<u64>,
}

/// Arguments for `list`.
#[derive(clap::Args, Debug)]
pub struct ListArgs {
    /// Collection URL, or a path relative to the base URL (e.g. `me/messages`)
    pub target: String,

    /// Extra request header, `Name: value` (repeatable)
    #[arg(long = "header", value_name = "HEADER", value_parser = parse_header)]
    pub headers: Vec<(String, String)>,

    /// Properties to return, comma separated (`$select`)
    #[arg(long)]
    pub select: Option<String>,

    /// Items per page requested from the server (`$top`)
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=999))]
    pub top: Option<u32>,

    /// Pause after every N items
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub pause_after: Option<u64>,

    /// Seconds to wait before resuming a paused listing
    #[arg(long, default_value_t = 5, value_name = "S")]
    pub pause_secs: u64,
}

/// `--conflict` values.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictArg {
    /// Overwrite the existing item
    Replace,
    /// Keep both items
    Rename,
    /// Fail the upload
    Fail,
}

impl From<ConflictArg> for ConflictBehavior {
    fn from(value: ConflictArg) -> Self {
        match value {
            ConflictArg::Replace => Self::Replace,
            ConflictArg::Rename => Self::Rename,
            ConflictArg::Fail => Self::Fail,
        }
    }
}

fn parse_header(raw: &str) -> Result<(String, String), String> {
    let (name, value) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected `Name: value`, got '{raw}'"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err("header name is empty".to_string());
    }
    Ok((name.to_string(), value.trim().to_string()))
}
