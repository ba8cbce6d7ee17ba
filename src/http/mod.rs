//! Transport seam between the transfer engines and the network.
//!
//! The engines never talk to reqwest directly. They build an [`HttpRequest`],
//! hand it to a [`Transport`], and interpret the [`HttpResponse`] that comes
//! back. A transport is two collaborators glued together:
//!
//! - [`Authorizer`] - attaches credentials, invoked before every request
//! - [`RequestExecutor`] - sends the request and returns status, headers, body
//!
//! [`HttpClient`] is the reqwest-backed executor used in production,
//! [`LoggingExecutor`] wraps any executor with request/response debug logging.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use transfer_core::http::{BearerTokenAuthorizer, HttpClient, HttpRequest, Transport};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let transport = Transport::new(
//!     Arc::new(HttpClient::try_new()?),
//!     Arc::new(BearerTokenAuthorizer::new("token")),
//! );
//! let response = transport
//!     .send(HttpRequest::get("https://graph.microsoft.com/v1.0/me"))
//!     .await?;
//! println!("HTTP {}", response.status);
//! # Ok(())
//! # }
//! ```

mod auth;
mod client;
mod error;
mod logging;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;

pub use auth::{BearerTokenAuthorizer, NoAuthorization};
pub use client::{CONNECT_TIMEOUT_SECS, HttpClient, READ_TIMEOUT_SECS};
pub use error::TransportError;
pub use logging::{LoggingExecutor, LoggingOptions};

/// An outgoing request, independent of any HTTP library.
#[derive(Clone)]
pub struct HttpRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute request URL.
    pub url: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Raw request body, if any. Cloning shares the buffer.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Creates a request with no headers and no body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Creates a GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    /// Sets a header, replacing any previous value under the same name.
    ///
    /// Invalid header names or values are dropped; the caller-facing
    /// builders in this crate only pass static names and ASCII values.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.set_header(name, value);
        self
    }

    /// In-place form of [`with_header`](Self::with_header).
    ///
    /// Returns `false` when the name or value is not a legal HTTP header.
    pub fn set_header(&mut self, name: &str, value: &str) -> bool {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.insert(name, value);
                true
            }
            _ => false,
        }
    }

    /// Attaches a raw body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Attaches a JSON body and sets `Content-Type: application/json`.
    #[must_use]
    pub fn with_json(self, value: &serde_json::Value) -> Self {
        // Serializing a `Value` cannot fail.
        let body = serde_json::to_vec(value).unwrap_or_default();
        self.with_header("content-type", "application/json")
            .with_body(body)
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

// Bodies can be many megabytes; print their length only.
impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers.len())
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .finish()
    }
}

/// A response as seen by the engines.
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw response body.
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response with the given status and body and no headers.
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    /// Creates a response with a JSON body.
    #[must_use]
    pub fn json_body(status: u16, value: &serde_json::Value) -> Self {
        let mut response = Self::new(status, serde_json::to_vec(value).unwrap_or_default());
        response.headers.insert(
            reqwest::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        response
    }

    /// Adds a header; invalid names or values are ignored.
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Returns true for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Returns a header value as a string, if present and valid UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Deserializes the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns the serde error when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }

    /// Returns the body as lossy UTF-8 text, for diagnostics.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Sends a request and returns the response.
///
/// Any HTTP status is a successful execution. Only failures to obtain a
/// response at all (DNS, connect, TLS, timeout) are errors.
///
/// Uses `async_trait` so executors can be shared as `Arc<dyn RequestExecutor>`.
#[async_trait]
pub trait RequestExecutor: Send + Sync {
    /// Executes one request.
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Attaches credentials to a request.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Returns the request with credentials attached.
    async fn authorize(&self, request: HttpRequest) -> HttpRequest;
}

/// Authorizer + executor pair used by every engine in this crate.
#[derive(Clone)]
pub struct Transport {
    executor: Arc<dyn RequestExecutor>,
    authorizer: Arc<dyn Authorizer>,
}

impl Transport {
    /// Creates a transport from its two collaborators.
    #[must_use]
    pub fn new(executor: Arc<dyn RequestExecutor>, authorizer: Arc<dyn Authorizer>) -> Self {
        Self {
            executor,
            authorizer,
        }
    }

    /// Creates a transport that sends requests without credentials.
    #[must_use]
    pub fn unauthenticated(executor: Arc<dyn RequestExecutor>) -> Self {
        Self::new(executor, Arc::new(NoAuthorization))
    }

    /// Authorizes then executes a request.
    ///
    /// # Errors
    ///
    /// Propagates the executor's [`TransportError`].
    pub async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let request = self.authorizer.authorize(request).await;
        self.executor.execute(request).await
    }
}

impl fmt::Debug for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transport").finish_non_exhaustive()
    }
}
