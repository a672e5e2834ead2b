use std::time::Duration;

use leadflow_core::QueueName;

/// Retry budget and backoff shape for one queue.
///
/// A failed delivery with `retry_count < max_retries` is released back to
/// its queue with `available_at = now + backoff(retry_count)`; otherwise it
/// moves to the `failed` queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Number of retries after the first delivery.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied per consumed retry.
    pub multiplier: u32,
}

impl RetryPolicy {
    /// The fixed per-queue policies.
    ///
    /// `failed` gets a zero budget: rows land there exhausted and only an
    /// operator re-drive moves them out.
    #[must_use]
    pub fn for_queue(queue: QueueName) -> Self {
        match queue {
            QueueName::High => Self {
                max_retries: 3,
                base_delay: Duration::from_secs(1),
                multiplier: 2,
            },
            QueueName::Normal => Self {
                max_retries: 3,
                base_delay: Duration::from_secs(5),
                multiplier: 3,
            },
            QueueName::Low => Self {
                max_retries: 2,
                base_delay: Duration::from_secs(30),
                multiplier: 2,
            },
            QueueName::Failed => Self {
                max_retries: 0,
                base_delay: Duration::ZERO,
                multiplier: 1,
            },
        }
    }

    /// Backoff before retry number `retry_count + 1`.
    #[must_use]
    pub fn backoff(&self, retry_count: u32) -> Duration {
        self.base_delay * self.multiplier.pow(retry_count)
    }
}
