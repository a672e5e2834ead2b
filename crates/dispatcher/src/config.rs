use std::time::Duration;

use leadflow_core::QueueName;

/// Configuration for the [`WorkerPool`](crate::worker::WorkerPool).
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queues polled by each worker, in priority order. The first non-empty
    /// claim wins. The `failed` queue must not appear here.
    pub queues: Vec<QueueName>,

    /// Number of concurrent workers.
    pub concurrency: usize,

    /// Sleep between polls when every queue is empty.
    pub idle_sleep: Duration,

    /// Maximum wall time for one handler invocation; also the deadline
    /// carried in the handler context.
    pub handler_timeout: Duration,

    /// Claims older than this are considered dead and recovered by the
    /// lease reaper.
    pub lease_timeout: Duration,

    /// How often the lease reaper runs.
    pub reap_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            queues: vec![QueueName::High, QueueName::Normal, QueueName::Low],
            concurrency: 4,
            idle_sleep: Duration::from_millis(200),
            handler_timeout: Duration::from_secs(120),
            lease_timeout: Duration::from_secs(600),
            reap_interval: Duration::from_secs(60),
        }
    }
}
