//! Client errors.

use chatflow_transport::TransportError;
use thiserror::Error;

/// Errors surfaced by [`crate::ChatClient`] operations.
#[derive(Debug, Error)]
pub enum ChatClientError {
    /// The transport failed and the failure was not a user cancellation.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A stream is already in flight; wait for it or call `stop`.
    #[error("a stream is already in flight")]
    Busy,
}

/// Result type for client operations.
pub type ChatClientResult<T> = Result<T, ChatClientError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        assert_eq!(
            ChatClientError::Busy.to_string(),
            "a stream is already in flight"
        );
    }
}
