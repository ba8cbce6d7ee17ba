//! In-memory upload session endpoint.
//!
//! Accepts slices the way the service does: each PUT must carry a
//! `Content-Range`, bytes are written at the stated offset, and the reply is
//! 202 with the next expected range until the payload is complete, then 201
//! with the created item. GET on the session returns its ranges.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;
use transfer_core::http::{HttpRequest, HttpResponse, RequestExecutor, TransportError};

pub const UPLOAD_URL: &str = "https://upload.example.com/session/42";

/// One PUT as the server saw it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceRecord {
    pub offset: u64,
    pub len: u64,
    pub total: u64,
    pub accepted: bool,
}

#[derive(Debug, Default)]
struct State {
    received: Vec<u8>,
    acknowledged: u64,
    accepted_slices: usize,
    /// Accepted-slice index -> responses to return before accepting it.
    failures: HashMap<usize, Vec<HttpResponse>>,
    /// Transport errors to return before anything else.
    drop_connections: u32,
    puts: Vec<SliceRecord>,
    gets: usize,
}

#[derive(Debug, Default)]
pub struct FakeUploadServer {
    state: Mutex<State>,
}

impl FakeUploadServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pretends an earlier run already delivered `prefix`.
    pub fn with_received(prefix: &[u8]) -> Self {
        let server = Self::new();
        {
            let mut state = server.state.lock().unwrap();
            state.received = prefix.to_vec();
            state.acknowledged = prefix.len() as u64;
        }
        server
    }

    /// Answers the `index`-th slice with 503 `times` times before accepting it.
    pub fn fail_slice(self, index: usize, times: u32) -> Self {
        for _ in 0..times {
            self.inject(index, HttpResponse::new(503, "try again"));
        }
        self
    }

    /// Answers the `index`-th slice once with 429 and a `Retry-After`.
    pub fn throttle_slice(self, index: usize, retry_after_secs: u64) -> Self {
        self.inject(
            index,
            HttpResponse::new(429, "slow down")
                .with_header("retry-after", &retry_after_secs.to_string()),
        );
        self
    }

    /// Answers the `index`-th slice once with `response`.
    pub fn reject_slice(self, index: usize, response: HttpResponse) -> Self {
        self.inject(index, response);
        self
    }

    fn inject(&self, index: usize, response: HttpResponse) {
        self.state
            .lock()
            .unwrap()
            .failures
            .entry(index)
            .or_default()
            .push(response);
    }

    /// Fails the next `times` requests at the transport level.
    pub fn drop_connections(self, times: u32) -> Self {
        self.state.lock().unwrap().drop_connections = times;
        self
    }

    pub fn received(&self) -> Vec<u8> {
        self.state.lock().unwrap().received.clone()
    }

    pub fn puts(&self) -> Vec<SliceRecord> {
        self.state.lock().unwrap().puts.clone()
    }

    pub fn gets(&self) -> usize {
        self.state.lock().unwrap().gets
    }

    fn ranges_body(acknowledged: u64) -> serde_json::Value {
        json!({
            "expirationDateTime": "2099-01-01T00:00:00Z",
            "nextExpectedRanges": [format!("{acknowledged}-")],
        })
    }
}

/// Parses `bytes a-b/total` or `bytes */total` into `(offset, len, total)`.
fn parse_content_range(raw: &str) -> Option<(u64, u64, u64)> {
    let rest = raw.strip_prefix("bytes ")?;
    let (range, total) = rest.split_once('/')?;
    let total = total.parse().ok()?;
    if range == "*" {
        return Some((0, 0, total));
    }
    let (start, end) = range.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end: u64 = end.parse().ok()?;
    Some((start, end - start + 1, total))
}

#[async_trait]
impl RequestExecutor for FakeUploadServer {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut guard = self.state.lock().unwrap();
        let state = &mut *guard;

        if state.drop_connections > 0 {
            state.drop_connections -= 1;
            return Err(TransportError::network(&request.url, "connection reset by peer"));
        }

        if request.method == reqwest::Method::GET {
            state.gets += 1;
            return Ok(HttpResponse::json_body(
                200,
                &Self::ranges_body(state.acknowledged),
            ));
        }

        let Some((offset, len, total)) = request
            .header("content-range")
            .and_then(parse_content_range)
        else {
            return Ok(HttpResponse::new(400, "missing Content-Range"));
        };
        let body = request.body.unwrap_or_default();

        let index = state.accepted_slices;
        if let Some(queued) = state.failures.get_mut(&index)
            && !queued.is_empty()
        {
            let response = queued.remove(0);
            state.puts.push(SliceRecord {
                offset,
                len,
                total,
                accepted: false,
            });
            return Ok(response);
        }

        assert_eq!(body.len() as u64, len, "body length must match Content-Range");
        let start = usize::try_from(offset).unwrap();
        if state.received.len() < start + body.len() {
            state.received.resize(start + body.len(), 0);
        }
        state.received[start..start + body.len()].copy_from_slice(&body);
        state.acknowledged = state.acknowledged.max(offset + len);
        state.accepted_slices += 1;
        state.puts.push(SliceRecord {
            offset,
            len,
            total,
            accepted: true,
        });

        if state.acknowledged >= total {
            Ok(HttpResponse::json_body(
                201,
                &json!({"id": "01BYE5RZ", "name": "upload.bin", "size": total}),
            ))
        } else {
            Ok(HttpResponse::json_body(
                202,
                &Self::ranges_body(state.acknowledged),
            ))
        }
    }
}
