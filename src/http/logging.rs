//! Request/response debug logging around any executor.
//!
//! Emits one `tracing` event for the request line, one per header, and the
//! same for the response. Access tokens and payloads are hidden unless the
//! options opt in.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap};
use tracing::debug;

use super::{HttpRequest, HttpResponse, RequestExecutor, TransportError};

/// Payloads longer than this are summarised by size.
const MAX_LOGGED_PAYLOAD: usize = 4 * 1024;

/// What the logging executor is allowed to reveal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Log the `Authorization` header verbatim instead of `Bearer ***`.
    pub show_tokens: bool,
    /// Log request and response bodies.
    pub show_payloads: bool,
}

/// Wraps an executor and logs every exchange at debug level.
pub struct LoggingExecutor {
    inner: Arc<dyn RequestExecutor>,
    options: LoggingOptions,
}

impl LoggingExecutor {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn RequestExecutor>, options: LoggingOptions) -> Self {
        Self { inner, options }
    }
}

#[async_trait]
impl RequestExecutor for LoggingExecutor {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        debug!("REQUEST {} {}", request.method, request.url);
        log_headers(&request.headers, self.options);
        if let Some(body) = request.body.as_deref()
            && let Some(rendered) = render_payload(body, self.options)
        {
            debug!("{rendered}");
        }

        let result = self.inner.execute(request).await;

        match &result {
            Ok(response) => {
                debug!("RESPONSE {}", response.status);
                log_headers(&response.headers, self.options);
                if let Some(rendered) = render_payload(&response.body, self.options) {
                    debug!("{rendered}");
                }
            }
            Err(error) => debug!(error = %error, "REQUEST FAILED"),
        }

        result
    }
}

fn log_headers(headers: &HeaderMap, options: LoggingOptions) {
    for (name, value) in headers {
        let value = value.to_str().unwrap_or("<non-ascii>");
        debug!("{}", render_header(name.as_str(), value, options));
    }
}

/// Formats one header line, masking credentials unless allowed.
fn render_header(name: &str, value: &str, options: LoggingOptions) -> String {
    if !options.show_tokens && name.eq_ignore_ascii_case(AUTHORIZATION.as_str()) {
        return format!("{name}: Bearer ***");
    }
    format!("{name}: {value}")
}

/// Formats a body for logging, or `None` when payload logging is off.
fn render_payload(body: &[u8], options: LoggingOptions) -> Option<String> {
    if !options.show_payloads || body.is_empty() {
        return None;
    }
    match std::str::from_utf8(body) {
        Ok(text) if body.len() <= MAX_LOGGED_PAYLOAD => Some(text.to_string()),
        _ => Some(format!("<{} bytes>", body.len())),
    }
}
