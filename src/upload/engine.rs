//! The slice loop: reads the payload in aligned slices, PUTs each one to the
//! session's upload URL, and follows the server's `nextExpectedRanges`.

use std::io::SeekFrom;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::Method;
use serde::de::DeserializeOwned;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::session::{UploadSession, UploadSessionClient, UploadSessionStatus};
use super::slice::{ChunkSlice, UploadConfigError, validate_slice_size};
use crate::error::TransferError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::retry::{
    FailureType, RetryDecision, RetryPolicy, classify_status, classify_transport,
    parse_retry_after,
};

/// Bytes the server has durably accepted, out of the total.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    /// Offset of the first byte the server still needs.
    pub bytes_acknowledged: u64,
    /// Payload length.
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Fraction complete in `0.0..=1.0`; an empty payload counts as done.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            1.0
        } else {
            self.bytes_acknowledged as f64 / self.total_bytes as f64
        }
    }
}

/// Receives progress notifications from the engine.
///
/// Called only when `bytes_acknowledged` strictly increases.
pub trait ProgressReporter: Send {
    /// Handles one notification.
    fn report(&mut self, progress: UploadProgress);
}

impl<F> ProgressReporter for F
where
    F: FnMut(UploadProgress) + Send,
{
    fn report(&mut self, progress: UploadProgress) {
        self(progress);
    }
}

/// A reporter that discards notifications.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _progress: UploadProgress) {}
}

/// Outcome of an upload that did not fail.
#[derive(Debug, Clone)]
pub struct UploadResult<T = serde_json::Value> {
    /// The server reported completion.
    pub succeeded: bool,
    /// Cancellation stopped the upload before completion.
    pub cancelled: bool,
    /// The resource the final slice created, if the server returned one.
    pub created_resource: Option<T>,
    /// The final slice response, when there was one.
    pub raw_response: Option<HttpResponse>,
    /// Bytes acknowledged when the upload stopped.
    pub bytes_acknowledged: u64,
}

impl<T> UploadResult<T> {
    fn cancelled(bytes_acknowledged: u64) -> Self {
        Self {
            succeeded: false,
            cancelled: true,
            created_resource: None,
            raw_response: None,
            bytes_acknowledged,
        }
    }
}

/// What one slice request ended in.
enum SliceOutcome {
    /// 200/201: the payload is complete.
    Completed(HttpResponse),
    /// 202: the server's ranges after this slice.
    Accepted(UploadSessionStatus, HttpResponse),
    /// Cancellation observed between attempts.
    Cancelled,
}

/// Uploads a payload to an upload session in aligned slices.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use transfer_core::http::{BearerTokenAuthorizer, HttpClient, Transport};
/// use transfer_core::retry::RetryPolicy;
/// use transfer_core::upload::{ChunkedUploadEngine, NoProgress, UploadResult, UploadSession};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let transport = Transport::new(
///     Arc::new(HttpClient::try_new()?),
///     Arc::new(BearerTokenAuthorizer::new("token")),
/// );
/// let engine = ChunkedUploadEngine::new(transport, 320 * 1024, RetryPolicy::default())?;
/// let mut session = UploadSession::new("https://example.com/upload/abc");
/// let mut file = tokio::fs::File::open("video.mp4").await?;
/// let result: UploadResult = engine.upload(&mut session, &mut file, &mut NoProgress).await?;
/// assert!(result.succeeded);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ChunkedUploadEngine {
    transport: Transport,
    sessions: UploadSessionClient,
    slice_size: u64,
    retry_policy: RetryPolicy,
    cancel: CancellationToken,
}

impl ChunkedUploadEngine {
    /// Creates an engine with a validated slice size.
    ///
    /// # Errors
    ///
    /// Returns [`UploadConfigError`] when `slice_size` is zero, not a
    /// multiple of 320 KiB, or above 60 MiB.
    pub fn new(
        transport: Transport,
        slice_size: u64,
        retry_policy: RetryPolicy,
    ) -> Result<Self, UploadConfigError> {
        let slice_size = validate_slice_size(slice_size)?;
        Ok(Self {
            sessions: UploadSessionClient::new(transport.clone()),
            transport,
            slice_size,
            retry_policy,
            cancel: CancellationToken::new(),
        })
    }

    /// Uses `token` for cooperative cancellation.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// The token that cancels this engine's uploads.
    #[must_use]
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Configured slice size in bytes.
    #[must_use]
    pub fn slice_size(&self) -> u64 {
        self.slice_size
    }

    /// Client for the session endpoints, sharing this engine's transport.
    #[must_use]
    pub fn sessions(&self) -> &UploadSessionClient {
        &self.sessions
    }

    /// Uploads the whole of `stream`, starting at byte 0.
    ///
    /// The stream length is taken by seeking to its end. `session` is
    /// updated from every 202 response so a caller can persist it and
    /// resume later.
    ///
    /// # Errors
    ///
    /// - [`TransferError::Transient`] once a slice exhausts its attempts
    /// - [`TransferError::SessionExpired`] on 404/410 or a past expiry
    /// - [`TransferError::Protocol`] for malformed or non-advancing responses
    /// - [`TransferError::Application`] for other 4xx rejections
    /// - [`TransferError::Io`] when the stream cannot be read
    #[instrument(skip(self, session, stream, progress), fields(upload_url = %session.upload_url))]
    pub async fn upload<S, T, P>(
        &self,
        session: &mut UploadSession,
        stream: &mut S,
        progress: &mut P,
    ) -> Result<UploadResult<T>, TransferError>
    where
        S: AsyncRead + AsyncSeek + Unpin + Send,
        T: DeserializeOwned,
        P: ProgressReporter + ?Sized,
    {
        let total = stream_length(stream).await?;
        info!(total, slice_size = self.slice_size, "starting upload");
        self.run(session, stream, total, 0, None, progress).await
    }

    /// Continues an interrupted upload from the first byte the server lacks.
    ///
    /// The session is refreshed from the server first. If that query fails
    /// transiently, the ranges cached in `session` are used instead. An
    /// empty range list means the server already has everything, which is
    /// reported as success without a created resource.
    ///
    /// Cancelled before the query, the result carries the offset from the
    /// cached ranges.
    ///
    /// # Errors
    ///
    /// As [`upload`](Self::upload).
    #[instrument(skip(self, session, stream, progress), fields(upload_url = %session.upload_url))]
    pub async fn resume<S, T, P>(
        &self,
        session: &mut UploadSession,
        stream: &mut S,
        progress: &mut P,
    ) -> Result<UploadResult<T>, TransferError>
    where
        S: AsyncRead + AsyncSeek + Unpin + Send,
        T: DeserializeOwned,
        P: ProgressReporter + ?Sized,
    {
        let total = stream_length(stream).await?;

        if self.cancel.is_cancelled() {
            return Ok(UploadResult::cancelled(cached_offset(session, total)));
        }

        match self.sessions.query(session).await {
            Ok(refreshed) => *session = refreshed,
            Err(e) if e.is_retryable() && !session.next_expected_ranges.is_empty() => {
                warn!(error = %e, "session query failed, resuming from cached ranges");
            }
            Err(e) => return Err(e),
        }

        let Some(first) = session.first_expected()? else {
            info!(total, "server already holds the full payload");
            return Ok(UploadResult {
                succeeded: true,
                cancelled: false,
                created_resource: None,
                raw_response: None,
                bytes_acknowledged: total,
            });
        };

        info!(total, offset = first.start, "resuming upload");
        self.run(session, stream, total, first.start, first.end, progress)
            .await
    }

    async fn run<S, T, P>(
        &self,
        session: &mut UploadSession,
        stream: &mut S,
        total: u64,
        start: u64,
        first_range_end: Option<u64>,
        progress: &mut P,
    ) -> Result<UploadResult<T>, TransferError>
    where
        S: AsyncRead + AsyncSeek + Unpin + Send,
        T: DeserializeOwned,
        P: ProgressReporter + ?Sized,
    {
        let mut offset = start;
        let mut range_end = first_range_end;
        let mut reported = start;
        let mut stalls = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                info!(offset, "upload cancelled");
                return Ok(UploadResult::cancelled(offset));
            }
            if session.is_expired_at(Utc::now()) {
                return Err(TransferError::session_expired(
                    &session.upload_url,
                    "session expiration time has passed",
                ));
            }
            if offset > total {
                return Err(TransferError::protocol(
                    &session.upload_url,
                    format!("server expects offset {offset} beyond payload length {total}"),
                ));
            }

            let slice = ChunkSlice::plan(offset, self.slice_size, total, range_end);
            let bytes = read_slice(stream, &slice).await?;

            match self.send_slice(session, &slice, bytes).await? {
                SliceOutcome::Cancelled => {
                    info!(offset, "upload cancelled");
                    return Ok(UploadResult::cancelled(offset));
                }
                SliceOutcome::Completed(response) => {
                    let created_resource = parse_created(&session.upload_url, &response)?;
                    info!(total, status = response.status, "upload completed");
                    return Ok(completed(created_resource, response, total, reported, progress));
                }
                SliceOutcome::Accepted(status, response) => {
                    session.apply_status(status);
                    let Some(next) = session.first_expected()? else {
                        // An empty range list after the last byte means done.
                        if slice.is_final() {
                            info!(total, "server expects no further bytes");
                            return Ok(completed(None, response, total, reported, progress));
                        }
                        return Err(TransferError::protocol(
                            &session.upload_url,
                            format!(
                                "202 response without nextExpectedRanges before the final slice (offset {offset})"
                            ),
                        ));
                    };

                    if next.start == offset {
                        stalls += 1;
                        warn!(offset, stalls, "slice accepted without advancing");
                        if stalls >= self.retry_policy.max_attempts() {
                            return Err(TransferError::protocol(
                                &session.upload_url,
                                format!("upload stalled at offset {offset}"),
                            ));
                        }
                    } else {
                        stalls = 0;
                    }

                    debug!(from = offset, to = next.start, "slice acknowledged");
                    offset = next.start;
                    range_end = next.end;

                    if offset > reported {
                        reported = offset;
                        progress.report(UploadProgress {
                            bytes_acknowledged: offset,
                            total_bytes: total,
                        });
                    }
                }
            }
        }
    }

    /// Sends one slice, retrying the same slice on transient failures.
    #[instrument(skip(self, session, bytes), fields(range = %slice.content_range()))]
    async fn send_slice(
        &self,
        session: &UploadSession,
        slice: &ChunkSlice,
        bytes: Bytes,
    ) -> Result<SliceOutcome, TransferError> {
        let url = session.upload_url.as_str();
        let content_range = slice.content_range();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            debug!(attempt, "sending slice");

            let request = HttpRequest::new(Method::PUT, url)
                .with_header("content-range", &content_range)
                .with_body(bytes.clone());

            let (failure_type, retry_after, error) = match self.transport.send(request).await {
                Ok(response) => match response.status {
                    200 | 201 => return Ok(SliceOutcome::Completed(response)),
                    202 => {
                        let status = response.json::<UploadSessionStatus>().map_err(|e| {
                            TransferError::protocol(url, format!("invalid 202 body: {e}"))
                        })?;
                        return Ok(SliceOutcome::Accepted(status, response));
                    }
                    404 | 410 => {
                        return Err(TransferError::session_expired(
                            url,
                            format!("HTTP {} on slice upload", response.status),
                        ));
                    }
                    status if (200..300).contains(&status) => {
                        return Err(TransferError::protocol(
                            url,
                            format!("unexpected HTTP {status} for slice upload"),
                        ));
                    }
                    status => {
                        let failure_type = classify_status(status);
                        if failure_type == FailureType::Permanent {
                            return Err(TransferError::application(url, &response));
                        }
                        let retry_after = response
                            .header("retry-after")
                            .and_then(parse_retry_after);
                        let error = TransferError::transient(
                            url,
                            attempt,
                            format!("HTTP {status}"),
                            Some(status),
                        );
                        (failure_type, retry_after, error)
                    }
                },
                Err(e) => (
                    classify_transport(&e),
                    None,
                    TransferError::from_transport(&e, attempt),
                ),
            };

            match self.retry_policy.should_retry(failure_type, attempt) {
                RetryDecision::Retry {
                    delay: backoff_delay,
                    attempt: next_attempt,
                } => {
                    let delay = retry_after.unwrap_or(backoff_delay);
                    info!(
                        attempt = next_attempt,
                        max_attempts = self.retry_policy.max_attempts(),
                        delay_ms = delay.as_millis(),
                        using_retry_after = retry_after.is_some(),
                        error = %error,
                        "retrying slice"
                    );
                    if self.wait_or_cancel(delay).await {
                        return Ok(SliceOutcome::Cancelled);
                    }
                }
                RetryDecision::DoNotRetry { reason } => {
                    warn!(%reason, error = %error, "giving up on slice");
                    return Err(error);
                }
            }
        }
    }

    /// Sleeps for `delay`; returns true if cancelled first.
    async fn wait_or_cancel(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return self.cancel.is_cancelled();
        }
        tokio::select! {
            () = self.cancel.cancelled() => true,
            () = tokio::time::sleep(delay) => false,
        }
    }
}

/// Builds the success result and reports final progress if it is news.
fn completed<T, P>(
    created_resource: Option<T>,
    response: HttpResponse,
    total: u64,
    reported: u64,
    progress: &mut P,
) -> UploadResult<T>
where
    P: ProgressReporter + ?Sized,
{
    if total > reported || total == 0 {
        progress.report(UploadProgress {
            bytes_acknowledged: total,
            total_bytes: total,
        });
    }
    UploadResult {
        succeeded: true,
        cancelled: false,
        created_resource,
        raw_response: Some(response),
        bytes_acknowledged: total,
    }
}

/// First byte the cached ranges say the server still needs.
fn cached_offset(session: &UploadSession, total: u64) -> u64 {
    match session.first_expected() {
        Ok(Some(range)) => range.start,
        Ok(None) => total,
        Err(_) => 0,
    }
}

async fn stream_length<S>(stream: &mut S) -> Result<u64, TransferError>
where
    S: AsyncSeek + Unpin,
{
    stream
        .seek(SeekFrom::End(0))
        .await
        .map_err(|e| TransferError::io("determining payload length", e))
}

async fn read_slice<S>(stream: &mut S, slice: &ChunkSlice) -> Result<Bytes, TransferError>
where
    S: AsyncRead + AsyncSeek + Unpin,
{
    let length = usize::try_from(slice.length).map_err(|_| {
        TransferError::io(
            "allocating slice buffer",
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "slice too large"),
        )
    })?;
    let mut buffer = vec![0u8; length];
    if length == 0 {
        return Ok(Bytes::new());
    }
    stream
        .seek(SeekFrom::Start(slice.offset))
        .await
        .map_err(|e| TransferError::io(format!("seeking to offset {}", slice.offset), e))?;
    stream
        .read_exact(&mut buffer)
        .await
        .map_err(|e| TransferError::io(format!("reading slice at offset {}", slice.offset), e))?;
    Ok(Bytes::from(buffer))
}

/// Parses the created resource from a completion response.
///
/// An empty body means the server returned no resource.
fn parse_created<T: DeserializeOwned>(
    url: &str,
    response: &HttpResponse,
) -> Result<Option<T>, TransferError> {
    if response.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    response
        .json::<T>()
        .map(Some)
        .map_err(|e| TransferError::protocol(url, format!("invalid completion body: {e}")))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::VecDeque;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::http::{RequestExecutor, TransportError};
    use crate::upload::ALIGNMENT_UNIT;

    /// Replays canned responses and records each request's method and Content-Range.
    #[derive(Default)]
    struct Scripted {
        responses: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
        seen: Mutex<Vec<(String, Option<String>)>>,
        bodies: Mutex<Vec<Option<Bytes>>>,
    }

    impl Scripted {
        fn new(responses: Vec<Result<HttpResponse, TransportError>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                seen: Mutex::default(),
                bodies: Mutex::default(),
            })
        }

        fn ranges(&self) -> Vec<Option<String>> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .map(|(_, range)| range.clone())
                .collect()
        }
    }

    #[async_trait]
    impl RequestExecutor for Scripted {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.seen.lock().unwrap().push((
                request.method.to_string(),
                request.header("content-range").map(str::to_string),
            ));
            self.bodies.lock().unwrap().push(request.body.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(HttpResponse::new(500, "script exhausted")))
        }
    }

    fn accepted(next: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::json_body(
            202,
            &json!({"nextExpectedRanges": [next]}),
        ))
    }

    fn created() -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::json_body(201, &json!({"id": "item-1"})))
    }

    fn engine(executor: Arc<Scripted>, attempts: u32) -> ChunkedUploadEngine {
        ChunkedUploadEngine::new(
            Transport::unauthenticated(executor),
            ALIGNMENT_UNIT,
            RetryPolicy::immediate(attempts),
        )
        .unwrap()
    }

    fn payload(len: u64) -> Cursor<Vec<u8>> {
        Cursor::new((0..len).map(|i| (i % 251) as u8).collect())
    }

    #[test]
    fn test_new_rejects_misaligned_slice_size() {
        let result = ChunkedUploadEngine::new(
            Transport::unauthenticated(Scripted::new(vec![])),
            1000,
            RetryPolicy::default(),
        );
        assert!(matches!(result, Err(UploadConfigError::Misaligned { .. })));
    }

    #[tokio::test]
    async fn test_upload_two_slices_reports_progress() {
        let a = ALIGNMENT_UNIT;
        let executor = Scripted::new(vec![accepted(&format!("{a}-")), created()]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");
        let mut events = Vec::new();
        let mut reporter = |p: UploadProgress| events.push(p.bytes_acknowledged);

        let result: UploadResult = engine
            .upload(&mut session, &mut payload(a + 5), &mut reporter)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(result.created_resource.unwrap()["id"], "item-1");
        assert_eq!(events, vec![a, a + 5]);
        assert_eq!(
            executor.ranges(),
            vec![
                Some(format!("bytes 0-{}/{}", a - 1, a + 5)),
                Some(format!("bytes {a}-{}/{}", a + 4, a + 5)),
            ]
        );
    }

    #[tokio::test]
    async fn test_transient_failure_retries_same_slice_only() {
        let a = ALIGNMENT_UNIT;
        let executor = Scripted::new(vec![
            accepted(&format!("{a}-")),
            Ok(HttpResponse::new(503, "busy")),
            created(),
        ]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");

        let result: UploadResult = engine
            .upload(&mut session, &mut payload(a * 2), &mut NoProgress)
            .await
            .unwrap();

        assert!(result.succeeded);
        let ranges = executor.ranges();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[1], ranges[2]);
        assert_ne!(ranges[0], ranges[1]);

        // The retry reuses the slice buffer instead of copying it.
        let bodies = executor.bodies.lock().unwrap();
        let (first, retry) = (bodies[1].as_ref().unwrap(), bodies[2].as_ref().unwrap());
        assert_eq!(first.len(), usize::try_from(a).unwrap());
        assert_eq!(first.as_ptr(), retry.as_ptr());
    }

    #[tokio::test]
    async fn test_retries_exhausted_is_transient_error() {
        let executor = Scripted::new(vec![
            Ok(HttpResponse::new(500, "")),
            Err(TransportError::timeout("https://up.example.com/s")),
        ]);
        let engine = engine(executor, 2);
        let mut session = UploadSession::new("https://up.example.com/s");

        let error = engine
            .upload::<_, serde_json::Value, _>(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::Transient { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn test_client_error_is_application_and_not_retried() {
        let executor = Scripted::new(vec![Ok(HttpResponse::json_body(
            416,
            &json!({"error": {"code": "invalidRange", "message": "bad range"}}),
        ))]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");

        let error = engine
            .upload::<_, serde_json::Value, _>(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(
            error,
            TransferError::Application { status: 416, ref code, .. } if code == "invalidRange"
        ));
        assert_eq!(executor.ranges().len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_session_expired() {
        let executor = Scripted::new(vec![Ok(HttpResponse::new(404, ""))]);
        let engine = engine(executor, 3);
        let mut session = UploadSession::new("https://up.example.com/s");

        let error = engine
            .upload::<_, serde_json::Value, _>(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::SessionExpired { .. }));
    }

    #[tokio::test]
    async fn test_past_expiry_fails_without_request() {
        let executor = Scripted::new(vec![]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");
        session.expiration_date_time = Some(Utc::now() - chrono::Duration::minutes(1));

        let error = engine
            .upload::<_, serde_json::Value, _>(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::SessionExpired { .. }));
        assert!(executor.ranges().is_empty());
    }

    #[tokio::test]
    async fn test_stall_becomes_protocol_error() {
        let executor = Scripted::new(vec![accepted("0-"), accepted("0-")]);
        let engine = engine(executor, 2);
        let mut session = UploadSession::new("https://up.example.com/s");

        let error = engine
            .upload::<_, serde_json::Value, _>(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::Protocol { .. }));
    }

    fn accepted_with_no_ranges() -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse::json_body(
            202,
            &json!({"nextExpectedRanges": []}),
        ))
    }

    #[tokio::test]
    async fn test_empty_ranges_after_final_slice_completes() {
        let executor = Scripted::new(vec![accepted_with_no_ranges()]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");
        let mut events = Vec::new();
        let mut reporter = |p: UploadProgress| events.push(p.bytes_acknowledged);

        let result: UploadResult = engine
            .upload(&mut session, &mut payload(10), &mut reporter)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(!result.cancelled);
        assert!(result.created_resource.is_none());
        assert_eq!(result.raw_response.unwrap().status, 202);
        assert_eq!(result.bytes_acknowledged, 10);
        assert_eq!(events, vec![10]);
        assert_eq!(executor.ranges().len(), 1);
    }

    #[tokio::test]
    async fn test_upload_and_resume_agree_on_empty_ranges() {
        let uploaded: UploadResult = engine(Scripted::new(vec![accepted_with_no_ranges()]), 3)
            .upload(
                &mut UploadSession::new("https://up.example.com/s"),
                &mut payload(10),
                &mut NoProgress,
            )
            .await
            .unwrap();
        let resumed: UploadResult = engine(
            Scripted::new(vec![Ok(HttpResponse::json_body(
                200,
                &json!({"nextExpectedRanges": []}),
            ))]),
            3,
        )
        .resume(
            &mut UploadSession::new("https://up.example.com/s"),
            &mut payload(10),
            &mut NoProgress,
        )
        .await
        .unwrap();

        assert!(uploaded.succeeded && resumed.succeeded);
        assert_eq!(uploaded.bytes_acknowledged, resumed.bytes_acknowledged);
    }

    #[tokio::test]
    async fn test_empty_ranges_before_final_slice_is_protocol_error() {
        let a = ALIGNMENT_UNIT;
        let executor = Scripted::new(vec![accepted_with_no_ranges()]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");

        let error = engine
            .upload::<_, serde_json::Value, _>(&mut session, &mut payload(a + 1), &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::Protocol { .. }), "{error:?}");
        assert_eq!(executor.ranges().len(), 1);
    }

    #[tokio::test]
    async fn test_zero_length_payload_sends_unsatisfied_range() {
        let executor = Scripted::new(vec![Ok(HttpResponse::new(201, ""))]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");

        let result: UploadResult = engine
            .upload(&mut session, &mut payload(0), &mut NoProgress)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(result.created_resource.is_none());
        assert_eq!(executor.ranges(), vec![Some("bytes */0".to_string())]);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_sends_nothing() {
        let executor = Scripted::new(vec![]);
        let token = CancellationToken::new();
        token.cancel();
        let engine = engine(executor.clone(), 3).with_cancellation(token);
        let mut session = UploadSession::new("https://up.example.com/s");

        let result: UploadResult = engine
            .upload(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert!(!result.succeeded);
        assert!(executor.ranges().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_resume_reports_cached_offset() {
        let executor = Scripted::new(vec![]);
        let token = CancellationToken::new();
        token.cancel();
        let engine = engine(executor.clone(), 3).with_cancellation(token);
        let mut session = UploadSession::new("https://up.example.com/s");
        session.next_expected_ranges = vec!["6-".into()];

        let result: UploadResult = engine
            .resume(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.bytes_acknowledged, 6);
        assert!(executor.ranges().is_empty(), "no query or slice sent");
    }

    #[tokio::test]
    async fn test_resume_starts_at_first_gap() {
        let a = ALIGNMENT_UNIT;
        let executor = Scripted::new(vec![
            Ok(HttpResponse::json_body(
                200,
                &json!({"nextExpectedRanges": [format!("{a}-")]}),
            )),
            created(),
        ]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");

        let result: UploadResult = engine
            .resume(&mut session, &mut payload(a + 1), &mut NoProgress)
            .await
            .unwrap();

        assert!(result.succeeded);
        let seen = executor.seen.lock().unwrap().clone();
        assert_eq!(seen[0].0, "GET");
        assert_eq!(seen[1].1, Some(format!("bytes {a}-{a}/{}", a + 1)));
    }

    #[tokio::test]
    async fn test_resume_with_nothing_expected_succeeds_without_upload() {
        let executor = Scripted::new(vec![Ok(HttpResponse::json_body(
            200,
            &json!({"nextExpectedRanges": []}),
        ))]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");

        let result: UploadResult = engine
            .resume(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert!(result.created_resource.is_none());
        assert_eq!(executor.ranges().len(), 1);
    }

    #[tokio::test]
    async fn test_resume_falls_back_to_cached_ranges() {
        let executor = Scripted::new(vec![
            Err(TransportError::network("https://up.example.com/s", "reset")),
            created(),
        ]);
        let engine = engine(executor.clone(), 3);
        let mut session = UploadSession::new("https://up.example.com/s");
        session.next_expected_ranges = vec!["4-".into()];

        let result: UploadResult = engine
            .resume(&mut session, &mut payload(10), &mut NoProgress)
            .await
            .unwrap();

        assert!(result.succeeded);
        assert_eq!(executor.ranges()[1], Some("bytes 4-9/10".to_string()));
    }

    #[tokio::test]
    async fn test_short_stream_is_io_error() {
        struct ShortRead(Cursor<Vec<u8>>);

        impl AsyncRead for ShortRead {
            // EOF at every position.
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Ok(()))
            }
        }

        impl AsyncSeek for ShortRead {
            fn start_seek(
                mut self: std::pin::Pin<&mut Self>,
                position: SeekFrom,
            ) -> std::io::Result<()> {
                std::pin::Pin::new(&mut self.0).start_seek(position)
            }

            fn poll_complete(
                mut self: std::pin::Pin<&mut Self>,
                cx: &mut std::task::Context<'_>,
            ) -> std::task::Poll<std::io::Result<u64>> {
                std::pin::Pin::new(&mut self.0).poll_complete(cx)
            }
        }

        let executor = Scripted::new(vec![]);
        let engine = engine(executor, 3);
        let mut session = UploadSession::new("https://up.example.com/s");
        let mut stream = ShortRead(payload(10));

        let error = engine
            .upload::<_, serde_json::Value, _>(&mut session, &mut stream, &mut NoProgress)
            .await
            .unwrap_err();

        assert!(matches!(error, TransferError::Io { .. }));
    }
}
