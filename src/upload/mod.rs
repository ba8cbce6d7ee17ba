//! Resumable chunked uploads to Graph-style upload sessions.
//!
//! An upload runs in three steps:
//!
//! 1. [`UploadSessionClient::create_for`] asks the service for an upload
//!    session and returns its [`UploadSession`].
//! 2. [`ChunkedUploadEngine::upload`] PUTs the payload in slices that are
//!    multiples of [`ALIGNMENT_UNIT`], each carrying a `Content-Range`
//!    header, and follows the `nextExpectedRanges` the server reports.
//! 3. The final slice returns 200/201 with the created resource.
//!
//! An interrupted upload is picked up again with
//! [`ChunkedUploadEngine::resume`], which asks the server what it is still
//! missing and continues from there.
//!
//! Transient failures retry the current slice only; bytes the server has
//! already acknowledged are never sent again.

mod engine;
mod session;
mod slice;

pub use engine::{ChunkedUploadEngine, NoProgress, ProgressReporter, UploadProgress, UploadResult};
pub use session::{
    ByteRange, ConflictBehavior, ParseRangeError, UploadSession, UploadSessionClient,
    UploadSessionRequest, UploadSessionStatus,
};
pub use slice::{
    ALIGNMENT_UNIT, ChunkSlice, DEFAULT_SLICE_SIZE, MAX_SLICE_SIZE, UploadConfigError,
    validate_slice_size,
};
