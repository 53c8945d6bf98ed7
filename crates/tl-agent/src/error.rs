use thiserror::Error;

/// Why a single delivery attempt failed. The split decides whether the event
/// is kept for a retry.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    /// The request never reached the server (refused, unreachable, timed out).
    #[error("ingestion endpoint unreachable: {message}")]
    Connectivity { message: String },
    /// The server answered but did not accept the event.
    #[error("event rejected: {message}")]
    Rejected { message: String },
}

impl DeliveryError {
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity { .. })
    }
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage unavailable: {message}")]
    Unavailable { message: String },
    #[error("failed to encode stored value: {message}")]
    Encode { message: String },
    #[error("failed to decode stored value: {message}")]
    Decode { message: String },
}
