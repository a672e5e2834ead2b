use thiserror::Error;

/// Semantic error kinds shared across the platform.
///
/// Job handlers translate low-level failures into one of these kinds; the
/// dispatcher decides between retry and the failed queue based on
/// [`is_retryable`](CoreError::is_retryable), and the HTTP boundary maps each
/// kind onto a status code.
#[derive(Debug, Clone, Error)]
pub enum CoreError {
    /// The target entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (e.g. "lead", "offer").
        entity: &'static str,
        /// Identifier that failed to resolve.
        id: String,
    },

    /// Syntactic or semantic validation failure on caller input.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A state-machine transition that is not allowed from the current state.
    #[error("invalid transition: {transition} from {from}")]
    InvalidTransition {
        /// Current state the entity was in.
        from: String,
        /// Attempted transition.
        transition: String,
    },

    /// A sending budget was exhausted. Retryable inside a worker.
    #[error("rate limited: {reason}")]
    RateLimited {
        /// Which limit denied the send.
        reason: String,
    },

    /// An external provider or analyzer failed. Retryable inside a worker.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    /// Deterministic failure (e.g. malformed job body). Never retried.
    #[error("permanent failure: {0}")]
    PermanentFailure(String),

    /// The recipient is on the suppression list. The send handler exits as a
    /// logged no-op, so this kind never reaches callers as an error.
    #[error("recipient suppressed: {email}")]
    Suppressed {
        /// Normalized recipient address.
        email: String,
    },

    /// The handler context deadline expired or the worker is shutting down.
    /// Treated as a retryable failure.
    #[error("handler cancelled: {0}")]
    Cancelled(String),
}

impl CoreError {
    /// Convenience constructor for [`CoreError::NotFound`].
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the dispatcher should retry a handler that failed with this
    /// error, subject to the queue's retry budget.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited { .. } | Self::UpstreamUnavailable(_) | Self::Cancelled(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(
            CoreError::RateLimited {
                reason: "daily".into()
            }
            .is_retryable()
        );
        assert!(CoreError::UpstreamUnavailable("timeout".into()).is_retryable());
        assert!(CoreError::Cancelled("deadline".into()).is_retryable());
    }

    #[test]
    fn permanent_kinds() {
        assert!(!CoreError::PermanentFailure("bad body".into()).is_retryable());
        assert!(!CoreError::not_found("lead", "abc").is_retryable());
        assert!(!CoreError::InvalidInput("no".into()).is_retryable());
        assert!(
            !CoreError::InvalidTransition {
                from: "draft".into(),
                transition: "send".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn display_includes_context() {
        let err = CoreError::not_found("offer", "42");
        assert_eq!(err.to_string(), "offer not found: 42");
    }
}
