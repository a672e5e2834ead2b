use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use leadflow_core::{CleanupTarget, JobKind};
use leadflow_transport::{JobHeaders, JobTransport, enqueue_job};

use crate::error::DispatchError;

/// One recurring emission: a cron expression plus the job it enqueues.
pub struct ScheduleEntry {
    /// Human-readable name for logs.
    pub name: String,
    /// Parsed cron expression (standard 5-field, UTC).
    cron: croner::Cron,
    /// Job enqueued at each tick.
    pub job: JobKind,
}

impl ScheduleEntry {
    /// Create an entry from a cron expression.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::InvalidCron`] when the expression does not
    /// parse.
    pub fn new(
        name: impl Into<String>,
        expr: &str,
        job: JobKind,
    ) -> Result<Self, DispatchError> {
        let cron = croner::Cron::new(expr)
            .parse()
            .map_err(|e| DispatchError::InvalidCron {
                expr: expr.to_owned(),
                message: format!("{e}"),
            })?;
        Ok(Self {
            name: name.into(),
            cron,
            job,
        })
    }

    /// Next occurrence strictly after `after`, or `None` when the
    /// expression has no future match.
    #[must_use]
    pub fn next_occurrence(&self, after: &DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.cron.find_next_occurrence(after, false).ok()
    }
}

/// Single-node time source emitting recurring jobs into the transport.
///
/// Emission is at-least-once per scheduled tick while the process runs;
/// handlers tolerate duplicates through their idempotency keys. Ticks that
/// pass while the scheduler is down are skipped: the next fire time is
/// always computed from `now`, never from the missed past (no catch-up
/// storm).
pub struct Scheduler {
    transport: Arc<dyn JobTransport>,
    entries: Vec<ScheduleEntry>,
    next_fires: Vec<Option<DateTime<Utc>>>,
    check_interval: Duration,
    shutdown: CancellationToken,
}

impl Scheduler {
    /// Create a scheduler over the given entries.
    #[must_use]
    pub fn new(transport: Arc<dyn JobTransport>, entries: Vec<ScheduleEntry>) -> Self {
        Self {
            transport,
            entries,
            next_fires: Vec::new(),
            check_interval: Duration::from_secs(30),
            shutdown: CancellationToken::new(),
        }
    }

    /// The default platform schedule: weekly benchmarks, daily proposal
    /// expiry, daily TLS checks, weekly data cleanup, and daily batch
    /// discovery (the handler expands per-tenant profiles and applies the
    /// per-profile-per-day dedup).
    ///
    /// # Errors
    ///
    /// Never fails in practice; the expressions are fixed.
    pub fn with_default_schedule(
        transport: Arc<dyn JobTransport>,
    ) -> Result<Self, DispatchError> {
        let entries = vec![
            ScheduleEntry::new(
                "calculate-benchmarks",
                "0 3 * * 1",
                JobKind::CalculateBenchmarks { industry: None },
            )?,
            ScheduleEntry::new("expire-proposals", "0 1 * * *", JobKind::ExpireProposals)?,
            ScheduleEntry::new("check-ssl", "30 1 * * *", JobKind::CheckSsl)?,
            ScheduleEntry::new(
                "cleanup-old-data",
                "0 4 * * 0",
                JobKind::CleanupOldData {
                    target: CleanupTarget::All,
                },
            )?,
            ScheduleEntry::new("batch-discovery", "0 5 * * *", JobKind::BatchDiscovery)?,
        ];
        Ok(Self::new(transport, entries))
    }

    /// Token cancelling the scheduler loop.
    #[must_use]
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Compute the initial fire times from `now`.
    fn prime(&mut self, now: DateTime<Utc>) {
        self.next_fires = self
            .entries
            .iter()
            .map(|entry| entry.next_occurrence(&now))
            .collect();
        for (entry, next) in self.entries.iter().zip(&self.next_fires) {
            debug!(entry = %entry.name, next = ?next, "scheduled");
        }
    }

    /// Indices of entries due at `now`, advancing their fire times from
    /// `now` (not from the tick itself -- missed ticks are skipped).
    fn due(&mut self, now: DateTime<Utc>) -> Vec<usize> {
        let mut due = Vec::new();
        for (idx, entry) in self.entries.iter().enumerate() {
            let Some(Some(fire_at)) = self.next_fires.get(idx).copied() else {
                continue;
            };
            if fire_at <= now {
                due.push(idx);
                self.next_fires[idx] = entry.next_occurrence(&now);
            }
        }
        due
    }

    /// Run until the shutdown token is cancelled.
    pub async fn run(mut self) {
        self.prime(Utc::now());
        info!(entries = self.entries.len(), "scheduler started");
        loop {
            tokio::select! {
                () = self.shutdown.cancelled() => break,
                () = tokio::time::sleep(self.check_interval) => {}
            }
            let now = Utc::now();
            for idx in self.due(now) {
                let entry = &self.entries[idx];
                match enqueue_job(&*self.transport, &entry.job, JobHeaders::new()).await {
                    Ok(job_id) => {
                        info!(entry = %entry.name, job_id, "emitted scheduled job");
                    }
                    Err(e) => {
                        warn!(entry = %entry.name, error = %e, "failed to emit scheduled job");
                    }
                }
            }
        }
        info!("scheduler stopped");
    }
}
