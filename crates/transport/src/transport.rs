use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leadflow_core::{JobKind, QueueName};

use crate::error::TransportError;
use crate::job::{JobHeaders, QueuedJob};

/// Contract every transport backend implements.
///
/// The claim protocol is the load-bearing piece: `claim` must atomically
/// pick the claimable row with the smallest `available_at` in the requested
/// queue and mark it delivered, so that a job is delivered to at most one
/// worker at a time. A database backend would express this as
/// `SELECT ... FOR UPDATE SKIP LOCKED ... RETURNING *`.
#[async_trait]
pub trait JobTransport: Send + Sync {
    /// Insert a row. Returns the new row id.
    async fn enqueue(
        &self,
        queue: QueueName,
        body: String,
        headers: JobHeaders,
        available_at: DateTime<Utc>,
    ) -> Result<i64, TransportError>;

    /// Atomically claim the oldest-available row in `queue`, marking it
    /// delivered at `now`. Returns `None` when the queue has no claimable
    /// row.
    async fn claim(&self, queue: QueueName, now: DateTime<Utc>)
    -> Result<Option<QueuedJob>, TransportError>;

    /// Delete a claimed row after successful handling.
    async fn ack(&self, id: i64) -> Result<(), TransportError>;

    /// Return a claimed row to its queue for retry: clears the delivery
    /// mark, replaces the headers, and postpones availability to
    /// `available_at`.
    async fn release(
        &self,
        id: i64,
        headers: JobHeaders,
        available_at: DateTime<Utc>,
    ) -> Result<(), TransportError>;

    /// Move a claimed row to the `failed` queue, recording its original
    /// queue in the headers. Failed rows are never claimed automatically.
    async fn fail(&self, id: i64, headers: JobHeaders) -> Result<(), TransportError>;

    /// Move a failed row back to its original queue (or `fallback` when the
    /// headers carry none) and make it immediately claimable.
    async fn redrive(&self, id: i64, fallback: QueueName) -> Result<(), TransportError>;

    /// Rows currently in a queue, oldest first.
    async fn list(&self, queue: QueueName, limit: usize)
    -> Result<Vec<QueuedJob>, TransportError>;

    /// Number of rows in a queue (claimed or not).
    async fn len(&self, queue: QueueName) -> Result<usize, TransportError>;

    /// Clear delivery marks older than `lease_timeout`, making crashed
    /// workers' claims claimable again. Returns the number of recovered
    /// rows.
    async fn reap_dead_leases(
        &self,
        lease_timeout: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, TransportError>;
}

/// Serialize a [`JobKind`] and enqueue it on its default queue, immediately
/// claimable.
pub async fn enqueue_job(
    transport: &dyn JobTransport,
    kind: &JobKind,
    headers: JobHeaders,
) -> Result<i64, TransportError> {
    let body =
        serde_json::to_string(kind).map_err(|e| TransportError::Serialization(e.to_string()))?;
    transport
        .enqueue(kind.default_queue(), body, headers, Utc::now())
        .await
}
