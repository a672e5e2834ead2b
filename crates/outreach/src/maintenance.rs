use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use leadflow_core::{CleanupTarget, CoreError, JobContext, JobKind};
use leadflow_dispatcher::JobHandler;
use leadflow_state::{
    AnalysisStore as _, EmailLogStore as _, LeadStore as _, Store, TenantStore as _,
};

/// Seam for the TLS probe used by `check_ssl`.
#[async_trait]
pub trait TlsProbe: Send + Sync {
    /// Whether the URL serves valid TLS.
    async fn check(&self, url: &str) -> Result<bool, CoreError>;
}

/// Probe that trusts the URL scheme: `https` passes, anything else fails.
///
/// A production deployment plugs in a real certificate check here; the
/// scheme check already catches the plain-`http` leads.
#[derive(Default)]
pub struct SchemeTlsProbe;

#[async_trait]
impl TlsProbe for SchemeTlsProbe {
    async fn check(&self, url: &str) -> Result<bool, CoreError> {
        Ok(url.starts_with("https://"))
    }
}

/// Handler for `check_ssl` jobs: probes every lead and records the result
/// on the row.
pub struct CheckSslHandler {
    store: Arc<dyn Store>,
    probe: Arc<dyn TlsProbe>,
}

impl CheckSslHandler {
    /// Wire the handler.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, probe: Arc<dyn TlsProbe>) -> Self {
        Self { store, probe }
    }
}

#[async_trait]
impl JobHandler for CheckSslHandler {
    fn kind(&self) -> &'static str {
        "check_ssl"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        if !matches!(job, JobKind::CheckSsl) {
            return Err(CoreError::PermanentFailure(format!(
                "check_ssl handler received {} job",
                job.kind()
            )));
        }

        let tenants = self.store.list_tenants().await.map_err(store_err)?;
        let mut flagged = 0usize;
        for tenant in tenants {
            for mut lead in self
                .store
                .list_leads(&tenant.user_code)
                .await
                .map_err(store_err)?
            {
                ctx.checkpoint()?;
                let valid = self.probe.check(&lead.url).await?;
                if !valid {
                    flagged += 1;
                    warn!(lead = %lead.id, url = %lead.url, "lead fails TLS check");
                }
                if lead.ssl_valid != Some(valid) {
                    lead.ssl_valid = Some(valid);
                    self.store.update_lead(lead).await.map_err(store_err)?;
                }
            }
        }
        info!(flagged, "TLS check pass finished");
        Ok(())
    }
}

/// Retention settings for `cleanup_old_data`.
#[derive(Debug, Clone)]
pub struct CleanupConfig {
    /// Analyses finished earlier than this many days ago are pruned.
    pub analysis_retention_days: i64,
    /// Number of newest analyses always kept per lead.
    pub keep_latest_analyses: usize,
    /// Tracking events older than this many days are pruned.
    pub event_retention_days: i64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            analysis_retention_days: 365,
            keep_latest_analyses: 5,
            event_retention_days: 180,
        }
    }
}

/// Handler for `cleanup_old_data` jobs.
pub struct CleanupOldDataHandler {
    store: Arc<dyn Store>,
    config: CleanupConfig,
}

impl CleanupOldDataHandler {
    /// Wire the handler.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: CleanupConfig) -> Self {
        Self { store, config }
    }

    async fn prune_analyses(&self) -> Result<usize, CoreError> {
        let cutoff = Utc::now() - Duration::days(self.config.analysis_retention_days);
        self.store
            .prune_analyses(cutoff, self.config.keep_latest_analyses)
            .await
            .map_err(store_err)
    }

    async fn prune_events(&self) -> Result<usize, CoreError> {
        let cutoff = Utc::now() - Duration::days(self.config.event_retention_days);
        self.store
            .prune_events_before(cutoff)
            .await
            .map_err(store_err)
    }
}

#[async_trait]
impl JobHandler for CleanupOldDataHandler {
    fn kind(&self) -> &'static str {
        "cleanup_old_data"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        let JobKind::CleanupOldData { target } = job else {
            return Err(CoreError::PermanentFailure(format!(
                "cleanup_old_data handler received {} job",
                job.kind()
            )));
        };
        ctx.checkpoint()?;

        let (analyses, events) = match target {
            CleanupTarget::Analyses => (self.prune_analyses().await?, 0),
            CleanupTarget::TrackingEvents => (0, self.prune_events().await?),
            CleanupTarget::All => (self.prune_analyses().await?, self.prune_events().await?),
        };
        info!(analyses, events, "cleanup pass finished");
        Ok(())
    }
}

fn store_err(e: leadflow_state::StateError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}
