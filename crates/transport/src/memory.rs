use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leadflow_core::QueueName;

use crate::error::TransportError;
use crate::job::{JobHeaders, QueuedJob};
use crate::transport::JobTransport;

#[derive(Default)]
struct Inner {
    rows: BTreeMap<i64, QueuedJob>,
    next_id: i64,
}

/// In-memory transport backend.
///
/// All operations run under one mutex, which makes the claim protocol
/// trivially atomic. The lock is never held across an `.await` point.
#[derive(Default)]
pub struct MemoryTransport {
    inner: Mutex<Inner>,
}

impl MemoryTransport {
    /// Create an empty transport.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("transport mutex poisoned")
    }
}

#[async_trait]
impl JobTransport for MemoryTransport {
    async fn enqueue(
        &self,
        queue: QueueName,
        body: String,
        headers: JobHeaders,
        available_at: DateTime<Utc>,
    ) -> Result<i64, TransportError> {
        let mut inner = self.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.rows.insert(
            id,
            QueuedJob {
                id,
                queue,
                body,
                headers,
                created_at: Utc::now(),
                available_at,
                delivered_at: None,
            },
        );
        Ok(id)
    }

    async fn claim(
        &self,
        queue: QueueName,
        now: DateTime<Utc>,
    ) -> Result<Option<QueuedJob>, TransportError> {
        let mut inner = self.lock();
        let candidate = inner
            .rows
            .values()
            .filter(|row| row.queue == queue && row.delivered_at.is_none())
            .filter(|row| row.available_at <= now)
            .min_by_key(|row| (row.available_at, row.id))
            .map(|row| row.id);

        let Some(id) = candidate else {
            return Ok(None);
        };
        let row = inner.rows.get_mut(&id).expect("candidate row exists");
        row.delivered_at = Some(now);
        Ok(Some(row.clone()))
    }

    async fn ack(&self, id: i64) -> Result<(), TransportError> {
        match self.lock().rows.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TransportError::NotFound(id)),
        }
    }

    async fn release(
        &self,
        id: i64,
        headers: JobHeaders,
        available_at: DateTime<Utc>,
    ) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let row = inner.rows.get_mut(&id).ok_or(TransportError::NotFound(id))?;
        row.headers = headers;
        row.available_at = available_at;
        row.delivered_at = None;
        Ok(())
    }

    async fn fail(&self, id: i64, mut headers: JobHeaders) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let row = inner.rows.get_mut(&id).ok_or(TransportError::NotFound(id))?;
        headers.original_queue.get_or_insert(row.queue);
        row.headers = headers;
        row.queue = QueueName::Failed;
        row.delivered_at = None;
        Ok(())
    }

    async fn redrive(&self, id: i64, fallback: QueueName) -> Result<(), TransportError> {
        let mut inner = self.lock();
        let row = inner.rows.get_mut(&id).ok_or(TransportError::NotFound(id))?;
        row.queue = row.headers.original_queue.unwrap_or(fallback);
        row.headers.retry_count = 0;
        row.headers.original_queue = None;
        row.available_at = Utc::now();
        row.delivered_at = None;
        Ok(())
    }

    async fn list(
        &self,
        queue: QueueName,
        limit: usize,
    ) -> Result<Vec<QueuedJob>, TransportError> {
        let inner = self.lock();
        Ok(inner
            .rows
            .values()
            .filter(|row| row.queue == queue)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn len(&self, queue: QueueName) -> Result<usize, TransportError> {
        Ok(self
            .lock()
            .rows
            .values()
            .filter(|row| row.queue == queue)
            .count())
    }

    async fn reap_dead_leases(
        &self,
        lease_timeout: std::time::Duration,
        now: DateTime<Utc>,
    ) -> Result<usize, TransportError> {
        let cutoff = now
            - chrono::Duration::from_std(lease_timeout)
                .map_err(|e| TransportError::Backend(e.to_string()))?;
        let mut inner = self.lock();
        let mut recovered = 0;
        for row in inner.rows.values_mut() {
            if row.delivered_at.is_some_and(|at| at < cutoff) {
                row.delivered_at = None;
                recovered += 1;
            }
        }
        Ok(recovered)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    async fn enqueue(
        transport: &MemoryTransport,
        queue: QueueName,
        body: &str,
        available_at: DateTime<Utc>,
    ) -> i64 {
        transport
            .enqueue(queue, body.into(), JobHeaders::new(), available_at)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn claim_returns_oldest_available() {
        let transport = MemoryTransport::new();
        let now = Utc::now();
        enqueue(&transport, QueueName::Normal, "b", now).await;
        enqueue(
            &transport,
            QueueName::Normal,
            "a",
            now - chrono::Duration::seconds(10),
        )
        .await;

        let job = transport.claim(QueueName::Normal, now).await.unwrap().unwrap();
        assert_eq!(job.body, "a");
    }

    #[tokio::test]
    async fn claim_skips_future_rows() {
        let transport = MemoryTransport::new();
        let now = Utc::now();
        enqueue(
            &transport,
            QueueName::High,
            "later",
            now + chrono::Duration::seconds(30),
        )
        .await;

        assert!(transport.claim(QueueName::High, now).await.unwrap().is_none());
        let after = now + chrono::Duration::seconds(31);
        assert!(transport.claim(QueueName::High, after).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn claimed_row_is_not_reclaimed() {
        let transport = MemoryTransport::new();
        let now = Utc::now();
        enqueue(&transport, QueueName::Normal, "only", now).await;

        assert!(transport.claim(QueueName::Normal, now).await.unwrap().is_some());
        assert!(transport.claim(QueueName::Normal, now).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claims_are_exclusive_under_concurrency() {
        let transport = Arc::new(MemoryTransport::new());
        let now = Utc::now();
        for i in 0..8 {
            enqueue(&transport, QueueName::Normal, &format!("job-{i}"), now).await;
        }

        let mut handles = Vec::new();
        for _ in 0..16 {
            let transport = Arc::clone(&transport);
            handles.push(tokio::spawn(async move {
                transport.claim(QueueName::Normal, Utc::now()).await.unwrap()
            }));
        }

        let mut seen = std::collections::HashSet::new();
        let mut claimed = 0;
        for handle in handles {
            if let Some(job) = handle.await.unwrap() {
                claimed += 1;
                assert!(seen.insert(job.id), "job {} claimed twice", job.id);
            }
        }
        assert_eq!(claimed, 8);
    }

    #[tokio::test]
    async fn ack_deletes_the_row() {
        let transport = MemoryTransport::new();
        let now = Utc::now();
        let id = enqueue(&transport, QueueName::Low, "x", now).await;
        transport.claim(QueueName::Low, now).await.unwrap().unwrap();
        transport.ack(id).await.unwrap();
        assert_eq!(transport.len(QueueName::Low).await.unwrap(), 0);
        assert!(matches!(
            transport.ack(id).await,
            Err(TransportError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn release_postpones_and_requeues() {
        let transport = MemoryTransport::new();
        let now = Utc::now();
        let id = enqueue(&transport, QueueName::High, "x", now).await;
        transport.claim(QueueName::High, now).await.unwrap().unwrap();

        let mut headers = JobHeaders::new();
        headers.retry_count = 1;
        let retry_at = now + chrono::Duration::seconds(5);
        transport.release(id, headers, retry_at).await.unwrap();

        assert!(transport.claim(QueueName::High, now).await.unwrap().is_none());
        let job = transport
            .claim(QueueName::High, retry_at)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.headers.retry_count, 1);
    }

    #[tokio::test]
    async fn fail_moves_to_failed_with_original_queue() {
        let transport = MemoryTransport::new();
        let now = Utc::now();
        let id = enqueue(&transport, QueueName::Normal, "x", now).await;
        transport.claim(QueueName::Normal, now).await.unwrap().unwrap();
        transport.fail(id, JobHeaders::new()).await.unwrap();

        assert_eq!(transport.len(QueueName::Normal).await.unwrap(), 0);
        assert_eq!(transport.len(QueueName::Failed).await.unwrap(), 1);

        // The failed queue is never claimed automatically by workers; rows
        // stay until an operator re-drives them.
        let rows = transport.list(QueueName::Failed, 10).await.unwrap();
        assert_eq!(rows[0].headers.original_queue, Some(QueueName::Normal));
    }

    #[tokio::test]
    async fn redrive_returns_to_original_queue() {
        let transport = MemoryTransport::new();
        let now = Utc::now();
        let id = enqueue(&transport, QueueName::High, "x", now).await;
        transport.claim(QueueName::High, now).await.unwrap().unwrap();
        transport.fail(id, JobHeaders::new()).await.unwrap();

        transport.redrive(id, QueueName::Normal).await.unwrap();
        assert_eq!(transport.len(QueueName::Failed).await.unwrap(), 0);
        let job = transport
            .claim(QueueName::High, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.headers.retry_count, 0);
    }

    #[tokio::test]
    async fn dead_lease_reaper_recovers_crashed_claims() {
        let transport = MemoryTransport::new();
        let claim_time = Utc::now() - chrono::Duration::minutes(10);
        enqueue(&transport, QueueName::Normal, "x", claim_time).await;
        transport
            .claim(QueueName::Normal, claim_time)
            .await
            .unwrap()
            .unwrap();

        let now = Utc::now();
        assert!(transport.claim(QueueName::Normal, now).await.unwrap().is_none());

        let recovered = transport
            .reap_dead_leases(std::time::Duration::from_secs(300), now)
            .await
            .unwrap();
        assert_eq!(recovered, 1);
        assert!(transport.claim(QueueName::Normal, now).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn fresh_lease_is_not_reaped() {
        let transport = MemoryTransport::new();
        let now = Utc::now();
        enqueue(&transport, QueueName::Normal, "x", now).await;
        transport.claim(QueueName::Normal, now).await.unwrap().unwrap();

        let recovered = transport
            .reap_dead_leases(std::time::Duration::from_secs(300), now)
            .await
            .unwrap();
        assert_eq!(recovered, 0);
    }
}
