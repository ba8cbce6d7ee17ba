//! Errors raised when a request could not be executed at all.

use thiserror::Error;

/// Boxed source for transport failures, so fakes can report failures
/// without constructing a `reqwest::Error`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A request that produced no HTTP response.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Network-level error (DNS resolution, connection refused, TLS, reset).
    #[error("network error calling {url}: {source}")]
    Network {
        /// The URL that was being called.
        url: String,
        /// The underlying error.
        #[source]
        source: BoxError,
    },

    /// Request timed out before a response arrived.
    #[error("timeout calling {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// The URL is malformed.
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },
}

impl TransportError {
    /// Creates a network error.
    pub fn network(url: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Network {
            url: url.into(),
            source: source.into(),
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// The URL the failed request targeted.
    #[must_use]
    pub fn url(&self) -> &str {
        match self {
            Self::Network { url, .. } | Self::Timeout { url } | Self::InvalidUrl { url } => url,
        }
    }
}
