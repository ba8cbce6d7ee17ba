//! In-memory paged collection.
//!
//! Page `i` lives at `{BASE}/page/{i}` and links to page `i + 1`; the last
//! page carries a delta link instead. Every request is recorded with its
//! headers so tests can check that decorations survive continuation links.

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Value, json};
use transfer_core::http::{HttpRequest, HttpResponse, RequestExecutor, TransportError};

pub const BASE: &str = "https://graph.example.com/v1.0/me/messages";

pub const DELTA_LINK: &str = "https://graph.example.com/v1.0/me/messages/delta?token=end";

#[derive(Debug)]
pub struct FakePageServer {
    pages: Vec<Vec<Value>>,
    requests: Mutex<Vec<HttpRequest>>,
    failing: Mutex<HashSet<String>>,
}

impl FakePageServer {
    pub fn new(pages: Vec<Vec<Value>>) -> Self {
        Self {
            pages,
            requests: Mutex::default(),
            failing: Mutex::default(),
        }
    }

    /// Pages of plain integers.
    pub fn numbers(pages: &[&[u64]]) -> Self {
        Self::new(
            pages
                .iter()
                .map(|page| page.iter().map(|n| json!(n)).collect())
                .collect(),
        )
    }

    pub fn page_url(index: usize) -> String {
        format!("{BASE}/page/{index}")
    }

    /// Makes requests to `url` fail with a transport error until cleared.
    pub fn fail(&self, url: &str) {
        self.failing.lock().unwrap().insert(url.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn fetch_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn page_body(&self, index: usize) -> Value {
        let mut body = json!({
            "@odata.context": "https://graph.example.com/v1.0/$metadata#messages",
            "value": self.pages[index],
        });
        if index + 1 < self.pages.len() {
            body["@odata.nextLink"] = json!(Self::page_url(index + 1));
        } else {
            body["@odata.deltaLink"] = json!(DELTA_LINK);
        }
        body
    }
}

#[async_trait]
impl RequestExecutor for FakePageServer {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());

        // Match on the path only; decorations may add query pairs.
        let path = request.url.split('?').next().unwrap_or_default().to_string();
        if self.failing.lock().unwrap().contains(&path) {
            return Err(TransportError::network(&request.url, "connection reset"));
        }

        let index = path
            .strip_prefix(&format!("{BASE}/page/"))
            .and_then(|i| i.parse::<usize>().ok())
            .filter(|i| *i < self.pages.len());

        Ok(match index {
            Some(i) => HttpResponse::json_body(200, &self.page_body(i)),
            None => HttpResponse::json_body(
                404,
                &json!({"error": {"code": "itemNotFound", "message": "no such page"}}),
            ),
        })
    }
}
