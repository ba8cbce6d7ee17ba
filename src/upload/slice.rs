//! Slice planning and slice-size validation.

use thiserror::Error;

/// Granularity every non-final slice must be a multiple of (320 KiB).
pub const ALIGNMENT_UNIT: u64 = 320 * 1024;

/// Largest slice the service accepts in one request (60 MiB).
pub const MAX_SLICE_SIZE: u64 = 60 * 1024 * 1024;

/// Default slice size (one alignment unit).
pub const DEFAULT_SLICE_SIZE: u64 = ALIGNMENT_UNIT;

/// Invalid engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadConfigError {
    /// Slice size of zero.
    #[error("slice size must be greater than zero")]
    ZeroSliceSize,

    /// Slice size not a multiple of the alignment unit.
    #[error("slice size {slice_size} is not a multiple of {ALIGNMENT_UNIT} bytes (320 KiB)")]
    Misaligned {
        /// The rejected value.
        slice_size: u64,
    },

    /// Slice size over the service maximum.
    #[error("slice size {slice_size} exceeds the maximum of {MAX_SLICE_SIZE} bytes")]
    TooLarge {
        /// The rejected value.
        slice_size: u64,
    },
}

/// Checks a slice size against the alignment and size rules.
///
/// # Errors
///
/// Returns the [`UploadConfigError`] describing the violated rule.
pub fn validate_slice_size(slice_size: u64) -> Result<u64, UploadConfigError> {
    if slice_size == 0 {
        return Err(UploadConfigError::ZeroSliceSize);
    }
    if slice_size % ALIGNMENT_UNIT != 0 {
        return Err(UploadConfigError::Misaligned { slice_size });
    }
    if slice_size > MAX_SLICE_SIZE {
        return Err(UploadConfigError::TooLarge { slice_size });
    }
    Ok(slice_size)
}

/// One contiguous byte range of the payload, sent as a single request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSlice {
    /// First byte of the slice.
    pub offset: u64,
    /// Number of bytes in the slice.
    pub length: u64,
    /// Total payload length.
    pub total: u64,
}

impl ChunkSlice {
    /// Plans the slice starting at `offset`.
    ///
    /// The length is capped by the slice size, by the bytes remaining, and
    /// by `range_end` (inclusive) when the server expects a bounded range.
    /// `offset` must not exceed `total`.
    #[must_use]
    pub fn plan(offset: u64, slice_size: u64, total: u64, range_end: Option<u64>) -> Self {
        let remaining = total.saturating_sub(offset);
        let mut length = slice_size.min(remaining);
        if let Some(end) = range_end {
            length = length.min(end.saturating_add(1).saturating_sub(offset));
        }
        Self {
            offset,
            length,
            total,
        }
    }

    /// True if this slice reaches the end of the payload.
    #[must_use]
    pub fn is_final(&self) -> bool {
        self.offset + self.length >= self.total
    }

    /// Offset just past the slice.
    #[must_use]
    pub fn end_exclusive(&self) -> u64 {
        self.offset + self.length
    }

    /// The `Content-Range` header value for this slice.
    ///
    /// An empty slice has no byte positions, so it uses the unsatisfied
    /// form `bytes */<total>`.
    #[must_use]
    pub fn content_range(&self) -> String {
        if self.length == 0 {
            format!("bytes */{}", self.total)
        } else {
            format!(
                "bytes {}-{}/{}",
                self.offset,
                self.end_exclusive() - 1,
                self.total
            )
        }
    }
}
