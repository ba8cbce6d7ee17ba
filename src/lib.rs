//! Transfer Core Library
//!
//! Client-side engines for moving large payloads to, and enumerating large
//! result sets from, a Graph-style HTTP API.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`http`] - Request/response types, executor and authorizer seams, reqwest client
//! - [`upload`] - Upload sessions and the resumable chunked upload engine
//! - [`paging`] - Page fetcher and the pausable page iterator
//! - [`retry`] - Failure classification and exponential backoff
//! - [`error`] - Error taxonomy shared by both engines

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod http;
pub mod paging;
pub mod retry;
pub mod upload;
mod user_agent;

// Re-export commonly used types
pub use error::TransferError;
pub use http::{HttpClient, HttpRequest, HttpResponse, RequestExecutor, Transport};
pub use paging::{IteratorState, Page, PageFetcher, PageIterator, RequestOptions, Visitor};
pub use retry::{DEFAULT_MAX_RETRIES, FailureType, RetryDecision, RetryPolicy};
pub use upload::{
    ALIGNMENT_UNIT, ChunkedUploadEngine, UploadProgress, UploadResult, UploadSession,
    UploadSessionClient, UploadSessionRequest,
};
