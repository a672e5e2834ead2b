use thiserror::Error;

use leadflow_transport::TransportError;

/// Errors raised while configuring or running the dispatcher.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// A schedule entry carries an unparseable cron expression.
    #[error("invalid cron expression {expr:?}: {message}")]
    InvalidCron {
        /// The offending expression.
        expr: String,
        /// Parser diagnostic.
        message: String,
    },

    /// The underlying transport failed.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_cron_display() {
        let err = DispatchError::InvalidCron {
            expr: "not cron".into(),
            message: "bad field".into(),
        };
        assert!(err.to_string().contains("not cron"));
    }
}
