use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use leadflow_core::{Company, CoreError, JobContext, JobKind};
use leadflow_dispatcher::JobHandler;
use leadflow_state::CompanyStore;

/// Seam for the public business-registry lookup (ARES-shaped: one record
/// per registration number).
#[async_trait]
pub trait CompanyLookup: Send + Sync {
    /// Fetch the registry record for an ICO; `None` when the registry does
    /// not know it.
    async fn lookup(&self, ico: &str) -> Result<Option<Company>, CoreError>;
}

/// Lookup answering from a fixed map, for tests and development.
#[derive(Default)]
pub struct StaticCompanyLookup {
    records: HashMap<String, Company>,
}

impl StaticCompanyLookup {
    /// Create an empty lookup.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record.
    #[must_use]
    pub fn with_company(mut self, company: Company) -> Self {
        self.records.insert(company.ico.clone(), company);
        self
    }
}

#[async_trait]
impl CompanyLookup for StaticCompanyLookup {
    async fn lookup(&self, ico: &str) -> Result<Option<Company>, CoreError> {
        Ok(self.records.get(ico).cloned())
    }
}

/// Handler for `sync_company_by_ico` jobs.
///
/// Idempotent per ICO: each sync replaces the stored record with the
/// registry's current state.
pub struct SyncCompanyHandler {
    store: Arc<dyn CompanyStore>,
    lookup: Arc<dyn CompanyLookup>,
}

impl SyncCompanyHandler {
    /// Wire the handler.
    #[must_use]
    pub fn new(store: Arc<dyn CompanyStore>, lookup: Arc<dyn CompanyLookup>) -> Self {
        Self { store, lookup }
    }
}

#[async_trait]
impl JobHandler for SyncCompanyHandler {
    fn kind(&self) -> &'static str {
        "sync_company_by_ico"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        let JobKind::SyncCompanyByIco { icos } = job else {
            return Err(CoreError::PermanentFailure(format!(
                "sync_company_by_ico handler received {} job",
                job.kind()
            )));
        };

        for ico in icos {
            ctx.checkpoint()?;
            match self.lookup.lookup(&ico).await? {
                Some(company) => {
                    self.store
                        .upsert_company(company)
                        .await
                        .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?;
                    info!(ico = %ico, "company synced");
                }
                None => {
                    warn!(ico = %ico, "registry does not know this ico; skipping");
                }
            }
        }
        Ok(())
    }
}
