//! Upload sessions: the server-side resource tracking one multi-slice upload.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info, instrument};

use crate::error::TransferError;
use crate::http::{HttpRequest, Transport};

/// An upload session as returned by `createUploadSession`.
///
/// Owned by the single engine driving the upload; never share one session
/// between concurrent uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    /// Opaque endpoint that receives the slices.
    pub upload_url: String,
    /// When the server will discard the session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date_time: Option<DateTime<Utc>>,
    /// Byte ranges the server still expects; empty means nothing is missing.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub next_expected_ranges: Vec<String>,
}

/// Session fields echoed by slice responses and session queries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSessionStatus {
    /// Refreshed expiry, if the server sent one.
    #[serde(default)]
    pub expiration_date_time: Option<DateTime<Utc>>,
    /// Ranges still expected.
    #[serde(default, deserialize_with = "null_as_empty")]
    pub next_expected_ranges: Vec<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

impl UploadSession {
    /// Creates a session value from its upload URL, expecting the whole payload.
    #[must_use]
    pub fn new(upload_url: impl Into<String>) -> Self {
        Self {
            upload_url: upload_url.into(),
            expiration_date_time: None,
            next_expected_ranges: vec!["0-".to_string()],
        }
    }

    /// Parses the expected ranges.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Protocol`] for a malformed range string.
    pub fn expected_ranges(&self) -> Result<Vec<ByteRange>, TransferError> {
        self.next_expected_ranges
            .iter()
            .map(|raw| {
                raw.parse::<ByteRange>().map_err(|e| {
                    TransferError::protocol(&self.upload_url, format!("{e}: {raw:?}"))
                })
            })
            .collect()
    }

    /// The lowest range the server still expects, if any.
    ///
    /// # Errors
    ///
    /// Returns [`TransferError::Protocol`] for a malformed range string.
    pub fn first_expected(&self) -> Result<Option<ByteRange>, TransferError> {
        Ok(self
            .expected_ranges()?
            .into_iter()
            .min_by_key(|range| range.start))
    }

    /// True when the server expects no more bytes.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.next_expected_ranges.is_empty()
    }

    /// True when the session's expiry is at or before `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date_time.is_some_and(|expiry| expiry <= now)
    }

    /// Merges a status reported by the server into this session.
    pub fn apply_status(&mut self, status: UploadSessionStatus) {
        if status.expiration_date_time.is_some() {
            self.expiration_date_time = status.expiration_date_time;
        }
        self.next_expected_ranges = status.next_expected_ranges;
    }
}

/// One `"<start>-<end>"` entry of `nextExpectedRanges`; `end` is inclusive
/// and absent for open-ended ranges (`"<start>-"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// First expected byte.
    pub start: u64,
    /// Last expected byte, inclusive.
    pub end: Option<u64>,
}

/// Why a range string could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseRangeError {
    /// No `-` separator.
    #[error("range is missing '-' separator")]
    MissingSeparator,
    /// Start or end is not an unsigned integer.
    #[error("range bound is not a non-negative integer")]
    InvalidBound,
    /// End precedes start.
    #[error("range end precedes start")]
    Inverted,
}

impl FromStr for ByteRange {
    type Err = ParseRangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .trim()
            .split_once('-')
            .ok_or(ParseRangeError::MissingSeparator)?;
        let start = start
            .trim()
            .parse::<u64>()
            .map_err(|_| ParseRangeError::InvalidBound)?;
        let end = match end.trim() {
            "" => None,
            raw => Some(raw.parse::<u64>().map_err(|_| ParseRangeError::InvalidBound)?),
        };
        if end.is_some_and(|end| end < start) {
            return Err(ParseRangeError::Inverted);
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for ByteRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.end {
            Some(end) => write!(f, "{}-{end}", self.start),
            None => write!(f, "{}-", self.start),
        }
    }
}

/// What the server should do when the target item already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictBehavior {
    /// Overwrite the existing item.
    #[default]
    Replace,
    /// Keep both, renaming the new one.
    Rename,
    /// Fail the upload.
    Fail,
}

impl ConflictBehavior {
    /// Wire value of `@microsoft.graph.conflictBehavior`.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Replace => "replace",
            Self::Rename => "rename",
            Self::Fail => "fail",
        }
    }
}

/// The kinds of upload session this crate knows how to request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadSessionRequest {
    /// Upload a drive item at a path under the signed-in user's drive root.
    DriveItem {
        /// Path relative to the drive root, e.g. `Documents/vacation.gif`.
        item_path: String,
        /// Behavior when the item exists.
        conflict_behavior: ConflictBehavior,
    },
    /// Attach a large file to a draft message.
    Attachment {
        /// Draft message id.
        message_id: String,
        /// Attachment file name.
        name: String,
        /// Attachment size in bytes.
        size: u64,
    },
}

impl UploadSessionRequest {
    /// The `createUploadSession` URL below `base_url`.
    #[must_use]
    pub fn url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        match self {
            Self::DriveItem { item_path, .. } => {
                let encoded = item_path
                    .trim_matches('/')
                    .split('/')
                    .map(|segment| urlencoding::encode(segment).into_owned())
                    .collect::<Vec<_>>()
                    .join("/");
                format!("{base}/me/drive/root:/{encoded}:/createUploadSession")
            }
            Self::Attachment { message_id, .. } => format!(
                "{base}/me/messages/{}/attachments/createUploadSession",
                urlencoding::encode(message_id)
            ),
        }
    }

    /// The JSON body for the session request.
    #[must_use]
    pub fn body(&self) -> Value {
        match self {
            Self::DriveItem {
                conflict_behavior, ..
            } => json!({
                "item": {
                    "@microsoft.graph.conflictBehavior": conflict_behavior.as_str(),
                }
            }),
            Self::Attachment { name, size, .. } => json!({
                "AttachmentItem": {
                    "attachmentType": "file",
                    "name": name,
                    "size": size,
                }
            }),
        }
    }
}

/// Creates, queries and cancels upload sessions.
#[derive(Debug, Clone)]
pub struct UploadSessionClient {
    transport: Transport,
}

impl UploadSessionClient {
    /// Creates a client over `transport`.
    #[must_use]
    pub fn new(transport: Transport) -> Self {
        Self { transport }
    }

    /// POSTs `body` to a `createUploadSession` URL.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Protocol`] when the response lacks `uploadUrl`
    /// - [`TransferError::Transient`] for network failures and 5xx/429
    /// - [`TransferError::Application`] for other rejections
    #[instrument(skip(self, body))]
    pub async fn create(&self, url: &str, body: &Value) -> Result<UploadSession, TransferError> {
        let request = HttpRequest::new(Method::POST, url).with_json(body);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| TransferError::from_transport(&e, 1))?;

        if !response.is_success() {
            return Err(TransferError::from_response(url, &response));
        }

        let session: UploadSession = response
            .json()
            .map_err(|e| TransferError::protocol(url, format!("invalid session body: {e}")))?;
        if session.upload_url.trim().is_empty() {
            return Err(TransferError::protocol(url, "session has empty uploadUrl"));
        }

        info!(
            expires = ?session.expiration_date_time,
            ranges = ?session.next_expected_ranges,
            "upload session created"
        );
        Ok(session)
    }

    /// Creates a session for one of the known request shapes.
    ///
    /// # Errors
    ///
    /// Same as [`create`](Self::create).
    pub async fn create_for(
        &self,
        base_url: &str,
        request: &UploadSessionRequest,
    ) -> Result<UploadSession, TransferError> {
        self.create(&request.url(base_url), &request.body()).await
    }

    /// Fetches the server's current view of `session`.
    ///
    /// # Errors
    ///
    /// - [`TransferError::SessionExpired`] on 404/410
    /// - otherwise as [`create`](Self::create)
    #[instrument(skip(self, session), fields(upload_url = %session.upload_url))]
    pub async fn query(&self, session: &UploadSession) -> Result<UploadSession, TransferError> {
        let url = session.upload_url.as_str();
        let response = self
            .transport
            .send(HttpRequest::get(url))
            .await
            .map_err(|e| TransferError::from_transport(&e, 1))?;

        match response.status {
            404 | 410 => {
                return Err(TransferError::session_expired(
                    url,
                    format!("HTTP {} on session query", response.status),
                ));
            }
            _ if !response.is_success() => return Err(TransferError::from_response(url, &response)),
            _ => {}
        }

        let status: UploadSessionStatus = response
            .json()
            .map_err(|e| TransferError::protocol(url, format!("invalid session status: {e}")))?;
        let mut refreshed = session.clone();
        refreshed.apply_status(status);
        debug!(ranges = ?refreshed.next_expected_ranges, "session queried");
        Ok(refreshed)
    }

    /// Deletes the session, discarding any bytes received so far.
    ///
    /// A session that is already gone counts as cancelled.
    ///
    /// # Errors
    ///
    /// As [`create`](Self::create).
    #[instrument(skip(self, session), fields(upload_url = %session.upload_url))]
    pub async fn cancel(&self, session: &UploadSession) -> Result<(), TransferError> {
        let url = session.upload_url.as_str();
        let response = self
            .transport
            .send(HttpRequest::new(Method::DELETE, url))
            .await
            .map_err(|e| TransferError::from_transport(&e, 1))?;

        match response.status {
            200..=299 | 404 | 410 => {
                info!(status = response.status, "upload session cancelled");
                Ok(())
            }
            _ => Err(TransferError::from_response(url, &response)),
        }
    }
}
