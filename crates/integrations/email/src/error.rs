use thiserror::Error;

/// Errors raised by mail transports.
#[derive(Debug, Error)]
pub enum EmailError {
    /// The transport is misconfigured (bad relay URL, bad from address).
    #[error("mail configuration error: {0}")]
    Configuration(String),

    /// The relay could not be reached. Retryable.
    #[error("mail connection error: {0}")]
    Connection(String),

    /// The relay rejected the message. Retryable at the job layer; repeated
    /// rejection exhausts the queue's retry budget.
    #[error("mail transmission failed: {0}")]
    Transmission(String),
}

impl EmailError {
    /// Whether the send handler should surface this as a retryable failure.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection(_) | Self::Transmission(_))
    }
}
