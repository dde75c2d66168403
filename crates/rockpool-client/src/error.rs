//! Error types for the mirror service.

use thiserror::Error;

use rockpool_store::StoreError;

/// A failure reported by the transport collaborator.
///
/// Retry and backoff policy belong to the transport; the mirror only
/// records the failure by settling the pending counter without a merge.
#[derive(Debug, Error)]
#[error("transport error: {message}")]
pub struct TransportError {
    pub message: String,
}

impl TransportError {
    /// Create a transport error from a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Errors raised by mirror-service operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The local store rejected an operation.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The remote call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The remote returned a response the mirror cannot use.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
