use thiserror::Error;

/// Errors surfaced by job transport backends.
#[derive(Debug, Error)]
pub enum TransportError {
    /// No row exists with the given id (already acked or never enqueued).
    #[error("job not found: {0}")]
    NotFound(i64),

    /// A job body or header failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend itself failed.
    #[error("backend error: {0}")]
    Backend(String),
}
