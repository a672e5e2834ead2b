use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use leadflow_core::{JobKind, QueueName};

use crate::error::TransportError;

/// Delivery metadata carried in the row's `headers` column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHeaders {
    /// Number of retries already consumed.
    #[serde(default)]
    pub retry_count: u32,

    /// The queue the job was originally enqueued on. Set when the job is
    /// moved to `failed` so operators can re-drive it.
    #[serde(default)]
    pub original_queue: Option<QueueName>,

    /// Optional dedup key recorded by the enqueuer (e.g. profile + day for
    /// batch discovery).
    #[serde(default)]
    pub dedup_key: Option<String>,
}

impl JobHeaders {
    /// Headers for a fresh enqueue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a dedup key.
    #[must_use]
    pub fn with_dedup_key(mut self, key: impl Into<String>) -> Self {
        self.dedup_key = Some(key.into());
        self
    }
}

/// One row of the job table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedJob {
    /// Monotonic row id.
    pub id: i64,

    /// Queue lane the row currently sits in.
    pub queue: QueueName,

    /// Serialized [`JobKind`] body (internally tagged JSON).
    pub body: String,

    /// Delivery metadata.
    pub headers: JobHeaders,

    /// When the row was first enqueued.
    pub created_at: DateTime<Utc>,

    /// Earliest claimable time.
    pub available_at: DateTime<Utc>,

    /// Set while a worker holds the claim; null when claimable.
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
}

impl QueuedJob {
    /// Deserialize the body into a [`JobKind`].
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Serialization`] for malformed bodies --
    /// the dispatcher treats that as a permanent failure.
    pub fn kind(&self) -> Result<JobKind, TransportError> {
        serde_json::from_str(&self.body).map_err(|e| TransportError::Serialization(e.to_string()))
    }
}
