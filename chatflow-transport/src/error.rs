//! Transport errors.

use thiserror::Error;

/// Errors that can occur at the transport layer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// Connection failed or was closed unexpectedly.
    #[error("connection error: {0}")]
    Connection(String),

    /// The in-flight request was aborted.
    #[error("request aborted")]
    Aborted,

    /// Incoming frame buffer grew beyond the allowed size.
    #[error("frame buffer overflow")]
    BufferOverflow,

    /// Wire frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// Whether retrying the request could succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Io(_))
    }
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;
