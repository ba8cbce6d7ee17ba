//! Error taxonomy shared by the upload engine and the page iterator.
//!
//! Every failure surfaced by the engines is one of five kinds:
//!
//! | Variant | Retried automatically | Meaning |
//! |---------|----------------------|---------|
//! | [`TransferError::Transient`] | yes, bounded | network failure, timeout, 5xx, 429 |
//! | [`TransferError::SessionExpired`] | no | upload session gone (404/410) or past expiry |
//! | [`TransferError::Protocol`] | no | response missing or mangling required fields |
//! | [`TransferError::Application`] | no | structured API rejection, surfaced verbatim |
//! | [`TransferError::Cancelled`] | no | cooperative cancellation observed |
//!
//! [`TransferError::Io`] covers the local side: the payload stream could not
//! be read or sought.

use serde::Deserialize;
use thiserror::Error;

use crate::http::{HttpResponse, TransportError};
use crate::retry::{FailureType, classify_status};

/// Errors produced by the transfer engines.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Network failure or server-side hiccup; safe to try again later.
    #[error("transient failure calling {url} after {attempts} attempt(s): {reason}")]
    Transient {
        /// The URL that failed.
        url: String,
        /// How many attempts were made before giving up.
        attempts: u32,
        /// Human-readable cause.
        reason: String,
        /// HTTP status, when the failure was a response rather than a transport error.
        status: Option<u16>,
    },

    /// The upload session can no longer accept slices.
    ///
    /// A new session must be created to retry the upload.
    #[error("upload session {upload_url} is no longer valid: {reason}")]
    SessionExpired {
        /// The session's upload URL.
        upload_url: String,
        /// Why the session is considered gone.
        reason: String,
    },

    /// The server answered with something the protocol does not allow.
    #[error("protocol error from {url}: {reason}")]
    Protocol {
        /// The URL whose response was malformed.
        url: String,
        /// What was wrong with it.
        reason: String,
    },

    /// The API rejected the request with a structured error payload.
    #[error("HTTP {status} from {url}: {code}: {message}")]
    Application {
        /// The URL that was rejected.
        url: String,
        /// HTTP status code.
        status: u16,
        /// API error code (`error.code`), or the status reason if absent.
        code: String,
        /// API error message (`error.message`), or the raw body if absent.
        message: String,
        /// Raw response body for diagnostics.
        body: String,
    },

    /// Cancellation was requested and honoured at a suspension point.
    #[error("operation cancelled")]
    Cancelled,

    /// Reading the local payload failed.
    #[error("{context}: {source}")]
    Io {
        /// What was being done.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl TransferError {
    /// Creates a transient error.
    pub fn transient(
        url: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
        status: Option<u16>,
    ) -> Self {
        Self::Transient {
            url: url.into(),
            attempts,
            reason: reason.into(),
            status,
        }
    }

    /// Creates a session-expired error.
    pub fn session_expired(upload_url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SessionExpired {
            upload_url: upload_url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a protocol error.
    pub fn protocol(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Protocol {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Creates a local I/O error.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Builds an application error from a rejected response.
    ///
    /// Uses the OData `{"error": {"code", "message"}}` payload when present.
    #[must_use]
    pub fn application(url: impl Into<String>, response: &HttpResponse) -> Self {
        let body = response.text();
        let (code, message) = parse_odata_error(&response.body).unwrap_or_else(|| {
            let reason = reqwest::StatusCode::from_u16(response.status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("unknown status")
                .to_string();
            (reason, body.clone())
        });
        Self::Application {
            url: url.into(),
            status: response.status,
            code,
            message,
            body,
        }
    }

    /// Maps a non-success response from a request that is not retried here.
    ///
    /// 5xx, 408 and 429 are transient; every other status is an
    /// application error.
    #[must_use]
    pub fn from_response(url: impl Into<String>, response: &HttpResponse) -> Self {
        match classify_status(response.status) {
            FailureType::Transient | FailureType::RateLimited => Self::transient(
                url,
                1,
                format!("HTTP {}", response.status),
                Some(response.status),
            ),
            FailureType::Permanent => Self::application(url, response),
        }
    }

    /// Maps a transport failure after `attempts` tries.
    ///
    /// A malformed URL will never succeed, so it is a protocol error; every
    /// other transport failure is transient.
    #[must_use]
    pub fn from_transport(error: &TransportError, attempts: u32) -> Self {
        match error {
            TransportError::InvalidUrl { url } => Self::protocol(url, "malformed URL"),
            TransportError::Timeout { url } => Self::transient(url, attempts, "timed out", None),
            TransportError::Network { url, source } => {
                Self::transient(url, attempts, source.to_string(), None)
            }
        }
    }

    /// Returns true if the same operation may succeed when tried again later.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns true for the cooperative-cancellation outcome.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status associated with the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } => *status,
            Self::Application { status, .. } => Some(*status),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ODataErrorEnvelope {
    error: ODataErrorBody,
}

#[derive(Debug, Deserialize)]
struct ODataErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Extracts `(code, message)` from an OData error payload.
#[must_use]
pub fn parse_odata_error(body: &[u8]) -> Option<(String, String)> {
    let envelope: ODataErrorEnvelope = serde_json::from_slice(body).ok()?;
    let code = envelope.error.code.unwrap_or_else(|| "unknown".to_string());
    let message = envelope.error.message.unwrap_or_default();
    Some((code, message))
}
