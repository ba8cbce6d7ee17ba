//! Single-page requests.

use std::fmt;

use serde::de::DeserializeOwned;
use tracing::{debug, instrument};
use url::Url;

use super::options::{RequestConfigurator, RequestOptions};
use super::page::Page;
use crate::error::TransferError;
use crate::http::{HttpRequest, Transport};

/// Fetches one page at a time, applying the configurator to each request.
///
/// Failures are never retried here; the iterator hands them to its caller.
#[derive(Clone)]
pub struct PageFetcher {
    transport: Transport,
    configurator: Option<RequestConfigurator>,
}

impl PageFetcher {
    /// Creates a fetcher with no request decorations.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            configurator: None,
        }
    }

    /// Applies `configurator` to every request, the first included.
    #[must_use]
    pub fn with_configurator(mut self, configurator: RequestConfigurator) -> Self {
        self.configurator = Some(configurator);
        self
    }

    /// Shorthand for `with_configurator(options.into_configurator())`.
    #[must_use]
    pub fn with_options(self, options: RequestOptions) -> Self {
        if options.is_empty() {
            return self;
        }
        self.with_configurator(options.into_configurator())
    }

    /// Fetches and parses the page at `url`.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Protocol`] for a malformed URL, a 404/410 on the
    ///   cursor, or a body without `value`
    /// - [`TransferError::Transient`] for network failures, timeouts, 5xx, 429
    /// - [`TransferError::Application`] for other 4xx
    #[instrument(skip(self))]
    pub async fn fetch<T: DeserializeOwned>(&self, url: &str) -> Result<Page<T>, TransferError> {
        if Url::parse(url).is_err() {
            return Err(TransferError::protocol(url, "malformed page cursor"));
        }

        let mut request = HttpRequest::get(url);
        if let Some(configure) = &self.configurator {
            request = configure(request);
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| TransferError::from_transport(&e, 1))?;

        match response.status {
            404 | 410 => {
                return Err(TransferError::protocol(
                    url,
                    format!("page cursor no longer resolves (HTTP {})", response.status),
                ));
            }
            _ if !response.is_success() => {
                return Err(TransferError::from_response(url, &response));
            }
            _ => {}
        }

        let page: Page<T> = response
            .json()
            .map_err(|e| TransferError::protocol(url, format!("invalid page body: {e}")))?;
        let page = page.normalized();

        debug!(
            items = page.items.len(),
            has_next = page.next_link.is_some(),
            "page fetched"
        );
        Ok(page)
    }
}

impl fmt::Debug for PageFetcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PageFetcher")
            .field("transport", &self.transport)
            .field("configured", &self.configurator.is_some())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::http::{HttpResponse, RequestExecutor, TransportError};

    struct Fixed {
        response: HttpResponse,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl Fixed {
        fn new(response: HttpResponse) -> Arc<Self> {
            Arc::new(Self {
                response,
                seen: Mutex::default(),
            })
        }
    }

    #[async_trait]
    impl RequestExecutor for Fixed {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push(request);
            Ok(self.response.clone())
        }
    }

    fn fetcher(executor: Arc<Fixed>) -> PageFetcher {
        PageFetcher::new(Transport::unauthenticated(executor))
    }

    #[tokio::test]
    async fn test_fetch_parses_page_and_applies_configurator() {
        let executor = Fixed::new(HttpResponse::json_body(
            200,
            &json!({"value": [1, 2], "@odata.nextLink": "https://g/next"}),
        ));
        let fetcher = fetcher(executor.clone())
            .with_options(RequestOptions::new().header("Prefer", "odata.maxpagesize=2"));

        let page: Page<u32> = fetcher.fetch("https://g/items").await.unwrap();

        assert_eq!(page.items, vec![1, 2]);
        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen[0].header("prefer"), Some("odata.maxpagesize=2"));
    }

    #[tokio::test]
    async fn test_malformed_cursor_is_protocol_error_without_request() {
        let executor = Fixed::new(HttpResponse::new(200, ""));
        let error = fetcher(executor.clone())
            .fetch::<u32>("::not a url::")
            .await
            .unwrap_err();
        assert!(matches!(error, TransferError::Protocol { .. }));
        assert!(executor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_gone_cursor_is_protocol_error() {
        let executor = Fixed::new(HttpResponse::new(410, ""));
        let error = fetcher(executor).fetch::<u32>("https://g/x").await.unwrap_err();
        assert!(matches!(error, TransferError::Protocol { .. }));
    }

    #[tokio::test]
    async fn test_server_error_is_transient() {
        let executor = Fixed::new(HttpResponse::new(503, ""));
        let error = fetcher(executor).fetch::<u32>("https://g/x").await.unwrap_err();
        assert!(error.is_retryable());
    }

    #[tokio::test]
    async fn test_forbidden_is_application_error() {
        let executor = Fixed::new(HttpResponse::json_body(
            403,
            &json!({"error": {"code": "accessDenied", "message": "no"}}),
        ));
        let error = fetcher(executor).fetch::<u32>("https://g/x").await.unwrap_err();
        assert!(matches!(error, TransferError::Application { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_body_without_value_is_protocol_error() {
        let executor = Fixed::new(HttpResponse::json_body(200, &json!({"items": []})));
        let error = fetcher(executor).fetch::<u32>("https://g/x").await.unwrap_err();
        assert!(matches!(error, TransferError::Protocol { .. }));
    }
}
