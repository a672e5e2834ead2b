use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{info, warn};

use leadflow_core::types::{AnalysisId, LeadId};
use leadflow_core::{
    Analysis, CoreError, JobContext, JobKind, Lead, Proposal, ProposalStatus, TenantId,
};
use leadflow_dispatcher::JobHandler;
use leadflow_state::{
    AnalysisStore as _, LeadStore as _, ProposalStore as _, Store, TenantStore as _,
};

/// Tuning knobs for proposal generation.
#[derive(Debug, Clone)]
pub struct ProposalConfig {
    /// How long a generated proposal stays usable.
    pub validity_days: i64,
}

impl Default for ProposalConfig {
    fn default() -> Self {
        Self { validity_days: 30 }
    }
}

/// Generates, expires, and recycles proposal documents.
pub struct ProposalService {
    store: Arc<dyn Store>,
    config: ProposalConfig,
}

impl ProposalService {
    /// Wire the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ProposalConfig) -> Self {
        Self { store, config }
    }

    /// Generate a proposal for a lead from its newest (or a named)
    /// analysis.
    ///
    /// Idempotent per `(lead, proposal_type)`: an existing non-expired
    /// proposal of the type is returned untouched.
    pub async fn generate(
        &self,
        lead_id: LeadId,
        tenant_id: &TenantId,
        proposal_type: &str,
        analysis_id: Option<AnalysisId>,
        ctx: &JobContext,
    ) -> Result<Proposal, CoreError> {
        let lead = self
            .store
            .get_lead(&lead_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("lead", lead_id))?;
        if &lead.tenant != tenant_id {
            return Err(CoreError::InvalidInput(format!(
                "lead {lead_id} is not owned by tenant {tenant_id}"
            )));
        }

        if let Some(existing) = self
            .store
            .find_proposal_for_lead(&lead_id, proposal_type)
            .await
            .map_err(store_err)?
            && existing.status != ProposalStatus::Expired
        {
            info!(
                lead = %lead_id,
                proposal = %existing.id,
                "proposal of this type already exists; skipping generation"
            );
            return Ok(existing);
        }
        ctx.checkpoint()?;

        let analysis = match analysis_id {
            Some(id) => self.store.get_analysis(&id).await.map_err(store_err)?,
            None => self.store.latest_analysis(&lead_id).await.map_err(store_err)?,
        }
        .ok_or_else(|| CoreError::not_found("analysis", lead_id))?;

        let content = compose_content(&lead, &analysis, proposal_type);
        let mut proposal = Proposal::new(
            tenant_id.clone(),
            lead_id,
            proposal_type,
            content,
        );
        proposal.analysis = Some(analysis.id);
        proposal.industry = lead.industry.clone();
        proposal.ai_generated = true;
        proposal.recyclable = true;
        proposal.status = ProposalStatus::Ready;
        proposal.expires_at = Some(Utc::now() + Duration::days(self.config.validity_days));

        self.store
            .insert_proposal(proposal.clone())
            .await
            .map_err(store_err)?;
        info!(lead = %lead_id, proposal = %proposal.id, "proposal generated");
        Ok(proposal)
    }

    /// Mark every proposal past its deadline as expired. Returns the number
    /// expired.
    pub async fn expire_due(&self) -> Result<usize, CoreError> {
        let due = self
            .store
            .list_expiring(Utc::now())
            .await
            .map_err(store_err)?;
        let expired = due.len();
        for mut proposal in due {
            proposal.status = ProposalStatus::Expired;
            self.store
                .update_proposal(proposal.clone())
                .await
                .map_err(store_err)?;
            info!(proposal = %proposal.id, "proposal expired");
        }
        Ok(expired)
    }

    /// Whether a recyclable proposal exists for `(industry, type)`.
    pub async fn recyclable_available(
        &self,
        industry: &str,
        proposal_type: &str,
    ) -> Result<bool, CoreError> {
        Ok(self
            .store
            .find_recyclable(industry, proposal_type)
            .await
            .map_err(store_err)?
            .is_some())
    }

    /// Move a recyclable proposal to a new tenant and lead, resetting it to
    /// draft.
    ///
    /// The target lead is `lead_id` when given, otherwise the tenant's
    /// first lead. The industry is matched from the target lead (falling
    /// back to the tenant); no match fails with the invalid-transition kind
    /// so the API surfaces 409.
    pub async fn recycle(
        &self,
        tenant_id: &TenantId,
        lead_id: Option<LeadId>,
        proposal_type: &str,
    ) -> Result<Proposal, CoreError> {
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("tenant", tenant_id))?;

        let lead = match lead_id {
            Some(id) => self
                .store
                .get_lead(&id)
                .await
                .map_err(store_err)?
                .filter(|lead| &lead.tenant == tenant_id)
                .ok_or_else(|| CoreError::not_found("lead", id))?,
            None => self
                .store
                .list_leads(tenant_id)
                .await
                .map_err(store_err)?
                .into_iter()
                .next()
                .ok_or_else(|| CoreError::not_found("lead", tenant_id))?,
        };

        let industry = lead
            .industry
            .clone()
            .or_else(|| tenant.industry.clone())
            .ok_or_else(|| CoreError::InvalidInput("target lead has no industry".into()))?;

        let mut proposal = self
            .store
            .find_recyclable(&industry, proposal_type)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::InvalidTransition {
                from: "none".into(),
                transition: "recycle".into(),
            })?;

        proposal.recycle_to(tenant_id.clone(), lead.id)?;
        self.store
            .update_proposal(proposal.clone())
            .await
            .map_err(store_err)?;
        info!(
            proposal = %proposal.id,
            tenant = %tenant_id,
            lead = %lead.id,
            "proposal recycled"
        );
        Ok(proposal)
    }
}

/// Render the proposal document from the analysis outcome.
fn compose_content(lead: &Lead, analysis: &Analysis, proposal_type: &str) -> String {
    let mut content = format!(
        "# {proposal_type} proposal for {domain}\n\n\
         Current score: {score}\n",
        domain = lead.domain,
        score = analysis.total_score,
    );
    if let Some(delta) = analysis.score_delta {
        content.push_str(&format!("Change since last assessment: {delta:+}\n"));
    }
    if let Some(issue_delta) = &analysis.issue_delta
        && !issue_delta.added.is_empty()
    {
        content.push_str("\nNew problems found:\n");
        for code in &issue_delta.added {
            content.push_str(&format!("- {code}\n"));
        }
    }
    content
}

fn store_err(e: leadflow_state::StateError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}

/// Handler for `generate_proposal` jobs.
pub struct GenerateProposalHandler {
    service: Arc<ProposalService>,
}

impl GenerateProposalHandler {
    /// Wrap the service as a job handler.
    #[must_use]
    pub fn new(service: Arc<ProposalService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for GenerateProposalHandler {
    fn kind(&self) -> &'static str {
        "generate_proposal"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        let JobKind::GenerateProposal {
            lead_id,
            tenant,
            proposal_type,
            analysis_id,
        } = job
        else {
            return Err(CoreError::PermanentFailure(format!(
                "generate_proposal handler received {} job",
                job.kind()
            )));
        };
        self.service
            .generate(lead_id, &tenant, &proposal_type, analysis_id, ctx)
            .await?;
        Ok(())
    }
}

/// Handler for `expire_proposals` jobs.
pub struct ExpireProposalsHandler {
    service: Arc<ProposalService>,
}

impl ExpireProposalsHandler {
    /// Wrap the service as a job handler.
    #[must_use]
    pub fn new(service: Arc<ProposalService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for ExpireProposalsHandler {
    fn kind(&self) -> &'static str {
        "expire_proposals"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        if !matches!(job, JobKind::ExpireProposals) {
            return Err(CoreError::PermanentFailure(format!(
                "expire_proposals handler received {} job",
                job.kind()
            )));
        }
        ctx.checkpoint()?;
        let expired = self.service.expire_due().await?;
        if expired > 0 {
            warn!(expired, "expired overdue proposals");
        }
        Ok(())
    }
}
