//! Shared error taxonomy for the crate.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ChunkError>;

/// Errors surfaced by the chunk store, summarization pipeline, and search
/// engine.
///
/// Not-found conditions (missing chunk, missing section title) are expressed
/// as `Option`/empty results by the APIs themselves and never appear here.
#[derive(Debug, Error)]
pub enum ChunkError {
    /// A caller-supplied argument was rejected (empty document id, empty
    /// query, malformed filter).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A component was used before its setup completed.
    #[error("not initialized: {0}")]
    NotInitialized(String),

    /// An embedding, LLM, or other remote call failed or timed out.
    #[error("external service failure: {0}")]
    ExternalService(String),

    /// The underlying vector index engine failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// Payload encoding or decoding failed.
    #[error("serialization failure: {0}")]
    Serialization(String),

    /// Filesystem failure (summary cache, sqlite database file).
    #[error("i/o failure: {0}")]
    Io(String),

    /// The operation was aborted by a cancellation signal. Distinct from
    /// failure: batch pipelines report this as an aborted outcome, not as an
    /// error bubbled to the caller.
    #[error("operation cancelled")]
    Cancelled,
}

impl ChunkError {
    /// Returns `true` for the cancellation marker.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ChunkError::Cancelled)
    }
}

impl From<std::io::Error> for ChunkError {
    fn from(err: std::io::Error) -> Self {
        ChunkError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ChunkError {
    fn from(err: serde_json::Error) -> Self {
        ChunkError::Serialization(err.to_string())
    }
}

impl From<tokio_rusqlite::Error> for ChunkError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        ChunkError::Storage(err.to_string())
    }
}

impl From<reqwest::Error> for ChunkError {
    fn from(err: reqwest::Error) -> Self {
        ChunkError::ExternalService(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_distinguishable() {
        assert!(ChunkError::Cancelled.is_cancelled());
        assert!(!ChunkError::Storage("x".into()).is_cancelled());
    }

    #[test]
    fn io_errors_convert() {
        let err: ChunkError = std::io::Error::other("disk gone").into();
        assert!(matches!(err, ChunkError::Io(_)));
    }
}
