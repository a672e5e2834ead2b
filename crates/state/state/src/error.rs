use thiserror::Error;

/// Errors surfaced by entity store backends.
#[derive(Debug, Error)]
pub enum StateError {
    /// A uniqueness or versioning conflict.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A value failed to (de)serialize.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The backend itself failed (connection, I/O, ...).
    #[error("backend error: {0}")]
    Backend(String),
}
