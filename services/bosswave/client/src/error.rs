//! Client error types.

use bw_wire::WireError;
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced to callers of the client
#[derive(Error, Debug)]
pub enum ClientError {
    /// Transport failure; the connection is no longer usable
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Frame could not be built or decoded
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Router did not acknowledge the connection with HELLO
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Connection closed before the operation could complete
    #[error("connection closed")]
    ConnectionClosed,

    /// Operation did not complete in time
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Configuration could not be loaded
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Whether the error only affected a single inbound frame
    pub fn is_frame_local(&self) -> bool {
        matches!(self, ClientError::Wire(e) if e.is_frame_local())
    }
}
