use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

use crate::error::CoreError;

/// Execution context carried into every job handler invocation.
///
/// Carries the handler deadline (claim time plus the queue's maximum handler
/// duration) and the worker's shutdown token. Handlers check it at
/// suspension points -- before store round-trips and outbound calls -- and
/// abort cleanly; an aborted handler counts as a failure and re-enters the
/// retry path.
#[derive(Debug, Clone)]
pub struct JobContext {
    deadline: DateTime<Utc>,
    cancel: CancellationToken,
    attempt: u32,
}

impl JobContext {
    /// Create a context with the given deadline and shutdown token.
    #[must_use]
    pub fn new(deadline: DateTime<Utc>, cancel: CancellationToken, attempt: u32) -> Self {
        Self {
            deadline,
            cancel,
            attempt,
        }
    }

    /// A context that never expires, for tests and foreground CLI runs.
    #[must_use]
    pub fn unbounded() -> Self {
        Self {
            deadline: Utc::now() + chrono::Duration::days(365),
            cancel: CancellationToken::new(),
            attempt: 0,
        }
    }

    /// The absolute handler deadline.
    #[must_use]
    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    /// Delivery attempt of the job being handled, starting at 0.
    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether the deadline passed or shutdown was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled() || Utc::now() >= self.deadline
    }

    /// Bail out when cancelled. Call at suspension points.
    pub fn checkpoint(&self) -> Result<(), CoreError> {
        if self.cancel.is_cancelled() {
            return Err(CoreError::Cancelled("worker shutting down".into()));
        }
        if Utc::now() >= self.deadline {
            return Err(CoreError::Cancelled("handler deadline exceeded".into()));
        }
        Ok(())
    }

    /// Time remaining before the deadline, clamped at zero.
    #[must_use]
    pub fn remaining(&self) -> std::time::Duration {
        (self.deadline - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO)
    }
}
