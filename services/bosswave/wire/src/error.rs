//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Malformed frame. The decoder has already skipped past it, so the
    /// stream is positioned at the start of the next frame.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// KV key that cannot be represented on the wire
    #[error("invalid kv key {0:?}")]
    InvalidKey(String),

    /// Buffered frame exceeds the configured size limit
    #[error("size limit exceeded: {0}")]
    Size(usize),
}

impl WireError {
    /// Whether the error is confined to a single frame.
    ///
    /// Frame-local errors leave the byte stream usable; anything else means
    /// the stream can no longer be trusted.
    pub fn is_frame_local(&self) -> bool {
        matches!(self, WireError::InvalidFrame(_))
    }

    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        WireError::InvalidFrame(reason.into())
    }
}
