use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use leadflow_core::{CoreError, JobContext, QueueName};
use leadflow_transport::{JobHeaders, JobTransport, QueuedJob, TransportError};

use crate::config::WorkerConfig;
use crate::registry::{HandlerRegistry, JobHandler as _};
use crate::retry::RetryPolicy;

/// A pool of workers draining the transport in queue-priority order.
///
/// Each worker claims one job at a time: it tries the configured queues in
/// order, dispatches the first claim to the registered handler, and applies
/// the queue's retry policy on failure. Claim and handler execution are
/// separate steps -- a crashed worker leaves a delivered row behind, which
/// the lease reaper makes claimable again.
pub struct WorkerPool {
    transport: Arc<dyn JobTransport>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Create a pool. Workers start on [`start`](Self::start).
    #[must_use]
    pub fn new(
        transport: Arc<dyn JobTransport>,
        registry: Arc<HandlerRegistry>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            transport,
            registry,
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Token cancelling every worker; cancel it to shut the pool down.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Spawn the configured number of workers plus the lease reaper.
    ///
    /// Returns the task handles; join them after cancelling the shutdown
    /// token for a clean stop.
    #[must_use]
    pub fn start(&self) -> Vec<JoinHandle<()>> {
        info!(
            concurrency = self.config.concurrency,
            queues = ?self.config.queues,
            kinds = ?self.registry.kinds(),
            "starting worker pool"
        );
        let mut handles = Vec::with_capacity(self.config.concurrency + 1);
        for worker_id in 0..self.config.concurrency {
            let transport = Arc::clone(&self.transport);
            let registry = Arc::clone(&self.registry);
            let config = self.config.clone();
            let token = self.shutdown.clone();
            handles.push(tokio::spawn(async move {
                worker_loop(&*transport, &registry, &config, &token, worker_id).await;
            }));
        }

        let transport = Arc::clone(&self.transport);
        let config = self.config.clone();
        let token = self.shutdown.clone();
        handles.push(tokio::spawn(async move {
            reaper_loop(&*transport, &config, &token).await;
        }));
        handles
    }

    /// Process claimable jobs inline until every queue is drained.
    ///
    /// Used by foreground CLI runs and tests; jobs postponed into the
    /// future (retry backoff) are left in place.
    pub async fn drain(&self) -> Result<usize, TransportError> {
        let mut processed = 0;
        while let Some(job) = claim_next(&*self.transport, &self.config.queues).await? {
            process_job(
                &*self.transport,
                &self.registry,
                &self.config,
                &self.shutdown,
                job,
            )
            .await;
            processed += 1;
        }
        Ok(processed)
    }
}

async fn worker_loop(
    transport: &dyn JobTransport,
    registry: &HandlerRegistry,
    config: &WorkerConfig,
    token: &CancellationToken,
    worker_id: usize,
) {
    debug!(worker = worker_id, "worker started");
    loop {
        if token.is_cancelled() {
            break;
        }
        match claim_next(transport, &config.queues).await {
            Ok(Some(job)) => {
                process_job(transport, registry, config, token, job).await;
            }
            Ok(None) => {
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(config.idle_sleep) => {}
                }
            }
            Err(e) => {
                warn!(worker = worker_id, error = %e, "claim failed");
                tokio::select! {
                    () = token.cancelled() => break,
                    () = tokio::time::sleep(config.idle_sleep) => {}
                }
            }
        }
    }
    debug!(worker = worker_id, "worker stopped");
}

async fn reaper_loop(transport: &dyn JobTransport, config: &WorkerConfig, token: &CancellationToken) {
    loop {
        tokio::select! {
            () = token.cancelled() => break,
            () = tokio::time::sleep(config.reap_interval) => {}
        }
        match transport.reap_dead_leases(config.lease_timeout, Utc::now()).await {
            Ok(0) => {}
            Ok(recovered) => info!(recovered, "recovered dead job leases"),
            Err(e) => warn!(error = %e, "lease reaper failed"),
        }
    }
}

/// Try each queue in listed order; the first successful claim wins.
async fn claim_next(
    transport: &dyn JobTransport,
    queues: &[QueueName],
) -> Result<Option<QueuedJob>, TransportError> {
    for queue in queues {
        if let Some(job) = transport.claim(*queue, Utc::now()).await? {
            return Ok(Some(job));
        }
    }
    Ok(None)
}

async fn process_job(
    transport: &dyn JobTransport,
    registry: &HandlerRegistry,
    config: &WorkerConfig,
    token: &CancellationToken,
    job: QueuedJob,
) {
    let kind = match job.kind() {
        Ok(kind) => kind,
        Err(e) => {
            warn!(job_id = job.id, error = %e, "malformed job body; moving to failed queue");
            fail_job(transport, &job, job.headers.clone()).await;
            return;
        }
    };

    let Some(handler) = registry.get(kind.kind()) else {
        warn!(
            job_id = job.id,
            kind = kind.kind(),
            "no handler registered; moving to failed queue"
        );
        fail_job(transport, &job, job.headers.clone()).await;
        return;
    };

    let deadline = Utc::now()
        + chrono::Duration::from_std(config.handler_timeout)
            .unwrap_or_else(|_| chrono::Duration::seconds(120));
    let ctx = JobContext::new(deadline, token.child_token(), job.headers.retry_count);

    let started = std::time::Instant::now();
    let result = match tokio::time::timeout(config.handler_timeout, handler.handle(kind, &ctx))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(CoreError::Cancelled("handler wall time exceeded".into())),
    };

    match result {
        Ok(()) => {
            debug!(
                job_id = job.id,
                queue = %job.queue,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "job completed"
            );
            if let Err(e) = transport.ack(job.id).await {
                warn!(job_id = job.id, error = %e, "ack failed");
            }
        }
        Err(e) if e.is_retryable() => {
            retry_or_fail(transport, &job, &e).await;
        }
        Err(e) => {
            warn!(job_id = job.id, error = %e, "permanent failure; moving to failed queue");
            fail_job(transport, &job, job.headers.clone()).await;
        }
    }
}

async fn retry_or_fail(transport: &dyn JobTransport, job: &QueuedJob, error: &CoreError) {
    let policy = RetryPolicy::for_queue(job.queue);
    let mut headers = job.headers.clone();
    if headers.retry_count < policy.max_retries {
        let backoff = policy.backoff(headers.retry_count);
        headers.retry_count += 1;
        info!(
            job_id = job.id,
            queue = %job.queue,
            retry = headers.retry_count,
            backoff_secs = backoff.as_secs(),
            error = %error,
            "retrying job"
        );
        let available_at = Utc::now()
            + chrono::Duration::from_std(backoff).unwrap_or_else(|_| chrono::Duration::seconds(60));
        if let Err(e) = transport.release(job.id, headers, available_at).await {
            warn!(job_id = job.id, error = %e, "release failed");
        }
    } else {
        warn!(
            job_id = job.id,
            queue = %job.queue,
            error = %error,
            "retries exhausted; moving to failed queue"
        );
        fail_job(transport, job, headers).await;
    }
}

async fn fail_job(transport: &dyn JobTransport, job: &QueuedJob, headers: JobHeaders) {
    if let Err(e) = transport.fail(job.id, headers).await {
        warn!(job_id = job.id, error = %e, "failed to move job to failed queue");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use leadflow_core::JobKind;
    use leadflow_transport::{MemoryTransport, enqueue_job};

    use super::*;
    use crate::registry::JobHandler;

    struct StubHandler {
        kind: &'static str,
        calls: AtomicUsize,
        result: fn() -> Result<(), CoreError>,
    }

    #[async_trait]
    impl JobHandler for StubHandler {
        fn kind(&self) -> &'static str {
            self.kind
        }

        async fn handle(&self, _job: JobKind, _ctx: &JobContext) -> Result<(), CoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn pool_with(
        transport: Arc<MemoryTransport>,
        handler: Arc<dyn JobHandler>,
    ) -> WorkerPool {
        let mut registry = HandlerRegistry::new();
        registry.register(handler);
        WorkerPool::new(transport, Arc::new(registry), WorkerConfig::default())
    }

    #[tokio::test]
    async fn successful_job_is_acked() {
        let transport = Arc::new(MemoryTransport::new());
        let handler = Arc::new(StubHandler {
            kind: "batch_discovery",
            calls: AtomicUsize::new(0),
            result: || Ok(()),
        });
        let pool = pool_with(Arc::clone(&transport), Arc::clone(&handler) as _);

        enqueue_job(&*transport, &JobKind::BatchDiscovery, JobHeaders::new())
            .await
            .unwrap();
        let processed = pool.drain().await.unwrap();

        assert_eq!(processed, 1);
        assert_eq!(handler.calls.load(Ordering::SeqCst), 1);
        assert_eq!(transport.len(QueueName::Low).await.unwrap(), 0);
        assert_eq!(transport.len(QueueName::Failed).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn retryable_failure_is_released_with_backoff() {
        let transport = Arc::new(MemoryTransport::new());
        let handler = Arc::new(StubHandler {
            kind: "expire_proposals",
            calls: AtomicUsize::new(0),
            result: || Err(CoreError::UpstreamUnavailable("flaky".into())),
        });
        let pool = pool_with(Arc::clone(&transport), handler as _);

        enqueue_job(&*transport, &JobKind::ExpireProposals, JobHeaders::new())
            .await
            .unwrap();
        pool.drain().await.unwrap();

        // Released back onto its queue with the retry counter bumped and a
        // future availability, so drain stops at one pass.
        let rows = transport.list(QueueName::Low, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].headers.retry_count, 1);
        assert!(rows[0].delivered_at.is_none());
        assert!(rows[0].available_at > Utc::now());
    }

    #[tokio::test]
    async fn exhausted_retries_move_to_failed() {
        let transport = Arc::new(MemoryTransport::new());
        let handler = Arc::new(StubHandler {
            kind: "expire_proposals",
            calls: AtomicUsize::new(0),
            result: || Err(CoreError::RateLimited {
                reason: "daily".into(),
            }),
        });
        let pool = pool_with(Arc::clone(&transport), handler as _);

        // Low queue allows 2 retries; a job already at the budget fails over.
        let mut headers = JobHeaders::new();
        headers.retry_count = 2;
        let id = transport
            .enqueue(
                QueueName::Low,
                serde_json::to_string(&JobKind::ExpireProposals).unwrap(),
                headers,
                Utc::now(),
            )
            .await
            .unwrap();
        pool.drain().await.unwrap();

        assert_eq!(transport.len(QueueName::Low).await.unwrap(), 0);
        let failed = transport.list(QueueName::Failed, 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, id);
        assert_eq!(failed[0].headers.original_queue, Some(QueueName::Low));
    }

    #[tokio::test]
    async fn permanent_failure_skips_retries() {
        let transport = Arc::new(MemoryTransport::new());
        let handler = Arc::new(StubHandler {
            kind: "check_ssl",
            calls: AtomicUsize::new(0),
            result: || Err(CoreError::PermanentFailure("broken".into())),
        });
        let pool = pool_with(Arc::clone(&transport), handler as _);

        enqueue_job(&*transport, &JobKind::CheckSsl, JobHeaders::new())
            .await
            .unwrap();
        pool.drain().await.unwrap();

        let failed = transport.list(QueueName::Failed, 10).await.unwrap();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].headers.retry_count, 0);
    }

    #[tokio::test]
    async fn unregistered_kind_goes_to_failed() {
        let transport = Arc::new(MemoryTransport::new());
        let handler = Arc::new(StubHandler {
            kind: "check_ssl",
            calls: AtomicUsize::new(0),
            result: || Ok(()),
        });
        let pool = pool_with(Arc::clone(&transport), handler as _);

        enqueue_job(&*transport, &JobKind::BatchDiscovery, JobHeaders::new())
            .await
            .unwrap();
        pool.drain().await.unwrap();

        assert_eq!(transport.len(QueueName::Failed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn malformed_body_goes_to_failed() {
        let transport = Arc::new(MemoryTransport::new());
        let handler = Arc::new(StubHandler {
            kind: "check_ssl",
            calls: AtomicUsize::new(0),
            result: || Ok(()),
        });
        let pool = pool_with(Arc::clone(&transport), handler as _);

        transport
            .enqueue(
                QueueName::Normal,
                "{definitely not a job".into(),
                JobHeaders::new(),
                Utc::now(),
            )
            .await
            .unwrap();
        pool.drain().await.unwrap();

        assert_eq!(transport.len(QueueName::Failed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn high_queue_is_drained_before_low() {
        let transport = Arc::new(MemoryTransport::new());
        let order: Arc<std::sync::Mutex<Vec<&'static str>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));

        struct OrderHandler {
            kind: &'static str,
            order: Arc<std::sync::Mutex<Vec<&'static str>>>,
        }

        #[async_trait]
        impl JobHandler for OrderHandler {
            fn kind(&self) -> &'static str {
                self.kind
            }

            async fn handle(&self, _job: JobKind, _ctx: &JobContext) -> Result<(), CoreError> {
                self.order.lock().unwrap().push(self.kind);
                Ok(())
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(OrderHandler {
            kind: "batch_discovery",
            order: Arc::clone(&order),
        }));
        registry.register(Arc::new(OrderHandler {
            kind: "send_email",
            order: Arc::clone(&order),
        }));
        let pool = WorkerPool::new(
            Arc::clone(&transport) as _,
            Arc::new(registry),
            WorkerConfig::default(),
        );

        // Low-priority job enqueued first, high-priority second.
        enqueue_job(&*transport, &JobKind::BatchDiscovery, JobHeaders::new())
            .await
            .unwrap();
        enqueue_job(
            &*transport,
            &JobKind::SendEmail {
                offer_id: leadflow_core::types::OfferId::new(),
            },
            JobHeaders::new(),
        )
        .await
        .unwrap();

        pool.drain().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["send_email", "batch_discovery"]);
    }

    #[tokio::test(start_paused = true)]
    async fn handler_wall_time_is_bounded() {
        let transport = Arc::new(MemoryTransport::new());

        struct SlowHandler;

        #[async_trait]
        impl JobHandler for SlowHandler {
            fn kind(&self) -> &'static str {
                "check_ssl"
            }

            async fn handle(&self, _job: JobKind, _ctx: &JobContext) -> Result<(), CoreError> {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Ok(())
            }
        }

        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(SlowHandler));
        let config = WorkerConfig {
            handler_timeout: std::time::Duration::from_millis(50),
            ..WorkerConfig::default()
        };
        let pool = WorkerPool::new(Arc::clone(&transport) as _, Arc::new(registry), config);

        enqueue_job(&*transport, &JobKind::CheckSsl, JobHeaders::new())
            .await
            .unwrap();
        pool.drain().await.unwrap();

        // Timed out => treated as a retryable failure.
        let rows = transport.list(QueueName::Low, 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].headers.retry_count, 1);
    }
}
