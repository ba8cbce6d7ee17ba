//! CLI command handlers.

mod list;
mod upload;

use std::sync::Arc;

use anyhow::{Context, Result};
use transfer_core::http::{
    Authorizer, BearerTokenAuthorizer, CONNECT_TIMEOUT_SECS, HttpClient, LoggingExecutor,
    LoggingOptions, NoAuthorization, READ_TIMEOUT_SECS, RequestExecutor, Transport,
};
use transfer_core::retry::{DEFAULT_MAX_RETRIES, RetryPolicy};
use transfer_core::upload::{DEFAULT_SLICE_SIZE, validate_slice_size};
use tracing::{debug, warn};

use crate::app_config::{DEFAULT_BASE_URL, FileConfig};
use crate::cli::Args;

pub use list::run_list_command;
pub use upload::{run_attach_command, run_resume_command, run_upload_command};

/// Effective settings after merging CLI flags over the config file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// API root.
    pub base_url: String,
    /// Slice size used unless a subcommand overrides it.
    pub slice_size: u64,
    /// Attempts per slice.
    pub max_retries: u32,
    /// Connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// Read timeout in seconds.
    pub read_timeout_secs: u64,
    /// Preferred page size for listings.
    pub page_size: Option<u32>,
    /// Request logging, when enabled.
    pub request_logging: Option<LoggingOptions>,
    /// Bearer token, if any.
    pub token: Option<String>,
    /// Hide progress output.
    pub quiet: bool,
}

impl Settings {
    /// CLI values win over file values, which win over built-in defaults.
    pub fn resolve(args: &Args, file: &FileConfig) -> Result<Self> {
        let slice_size = validate_slice_size(file.slice_size.unwrap_or(DEFAULT_SLICE_SIZE))
            .context("Invalid slice size in config")?;

        let request_logging = file.debug_log.unwrap_or(false).then(|| LoggingOptions {
            show_tokens: file.show_tokens.unwrap_or(false),
            show_payloads: file.show_payloads.unwrap_or(false),
        });

        Ok(Self {
            base_url: file
                .base_url
                .clone()
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            slice_size,
            max_retries: args
                .max_retries
                .or(file.max_retries)
                .unwrap_or(DEFAULT_MAX_RETRIES),
            connect_timeout_secs: file.connect_timeout_secs.unwrap_or(CONNECT_TIMEOUT_SECS),
            read_timeout_secs: file.read_timeout_secs.unwrap_or(READ_TIMEOUT_SECS),
            page_size: file.page_size,
            request_logging,
            token: args.token.clone().filter(|t| !t.trim().is_empty()),
            quiet: args.quiet,
        })
    }

    /// Retry policy for slice uploads.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_max_attempts(self.max_retries)
    }

    /// Builds the transport: reqwest client, optional request logging, and
    /// bearer authorization when a token is configured.
    pub fn transport(&self) -> Result<Transport> {
        let client = HttpClient::with_timeouts(self.connect_timeout_secs, self.read_timeout_secs)
            .context("Failed to build HTTP client")?;

        let executor: Arc<dyn RequestExecutor> = match self.request_logging {
            Some(options) => {
                debug!(?options, "request logging enabled");
                Arc::new(LoggingExecutor::new(Arc::new(client), options))
            }
            None => Arc::new(client),
        };

        let authorizer: Arc<dyn Authorizer> = match &self.token {
            Some(token) => Arc::new(BearerTokenAuthorizer::new(token.clone())),
            None => {
                warn!("no access token given (--token or GRAPH_TOKEN); sending unauthenticated requests");
                Arc::new(NoAuthorization)
            }
        };

        Ok(Transport::new(executor, authorizer))
    }

    /// Resolves `target` against the base URL unless it is already absolute.
    #[must_use]
    pub fn resolve_url(&self, target: &str) -> String {
        if target.starts_with("https://") || target.starts_with("http://") {
            return target.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            target.trim_start_matches('/')
        )
    }
}
