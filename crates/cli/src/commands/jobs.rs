use std::sync::Arc;

use clap::Args;

use leadflow_core::types::{AnalysisId, LeadId, ProposalId};
use leadflow_core::{JobContext, JobKind, TenantId};
use leadflow_dispatcher::{JobHandler as _, WorkerConfig, WorkerPool};
use leadflow_server::{AppState, BootstrapOptions, ServerConfig, bootstrap};
use leadflow_transport::{JobHeaders, enqueue_job};

/// Enqueue the job and drain the queues (`--async`), or run its handler in
/// the foreground.
async fn submit(config: &ServerConfig, kind: JobKind, dispatch: bool) -> anyhow::Result<()> {
    let state: AppState = bootstrap(config, BootstrapOptions::default());

    if dispatch {
        let job_id = enqueue_job(&*state.transport, &kind, JobHeaders::new()).await?;
        println!("queued job {job_id} ({})", kind.kind());
        let pool = WorkerPool::new(
            Arc::clone(&state.transport),
            Arc::clone(&state.registry),
            WorkerConfig::default(),
        );
        let processed = pool.drain().await?;
        println!("processed {processed} job(s)");
        return Ok(());
    }

    let handler = state
        .registry
        .get(kind.kind())
        .ok_or_else(|| anyhow::anyhow!("no handler registered for {}", kind.kind()))?;
    handler.handle(kind, &JobContext::unbounded()).await?;
    println!("done");
    Ok(())
}

#[derive(Args, Debug)]
pub struct AnalyzeLeadArgs {
    /// Lead id to analyze.
    pub lead_id: LeadId,
    /// Re-run even when an analysis already exists.
    #[arg(long)]
    pub reanalyze: bool,
    /// Industry override.
    #[arg(long)]
    pub industry: Option<String>,
    /// Discovery profile override.
    #[arg(long)]
    pub profile: Option<String>,
    /// Dispatch through the queue instead of running inline.
    #[arg(long = "async")]
    pub dispatch: bool,
}

pub async fn analyze_lead(config: &ServerConfig, args: AnalyzeLeadArgs) -> anyhow::Result<()> {
    submit(
        config,
        JobKind::AnalyzeLead {
            lead_id: args.lead_id,
            reanalyze: args.reanalyze,
            industry: args.industry,
            profile: args.profile,
        },
        args.dispatch,
    )
    .await
}

#[derive(Args, Debug)]
pub struct DiscoverLeadsArgs {
    /// Lead source name.
    pub source: String,
    /// Acting tenant's user code.
    #[arg(long = "user-code")]
    pub user_code: String,
    /// Search queries.
    #[arg(long = "query", required = true)]
    pub queries: Vec<String>,
    /// Maximum leads to create.
    #[arg(long, default_value_t = 25)]
    pub limit: u32,
    /// Discovery profile name.
    #[arg(long)]
    pub profile: Option<String>,
    /// Dispatch through the queue instead of running inline.
    #[arg(long = "async")]
    pub dispatch: bool,
}

pub async fn discover_leads(config: &ServerConfig, args: DiscoverLeadsArgs) -> anyhow::Result<()> {
    submit(
        config,
        JobKind::DiscoverLeads {
            source: args.source,
            queries: args.queries,
            tenant: TenantId::from(args.user_code.as_str()),
            limit: args.limit,
            profile: args.profile,
        },
        args.dispatch,
    )
    .await
}

#[derive(Args, Debug)]
pub struct GenerateProposalArgs {
    /// Lead id.
    pub lead_id: LeadId,
    /// Acting tenant's user code.
    #[arg(long = "user-code")]
    pub user_code: String,
    /// Proposal type.
    #[arg(long = "type", default_value = "website_audit")]
    pub proposal_type: String,
    /// Source analysis; defaults to the lead's newest.
    #[arg(long)]
    pub analysis_id: Option<AnalysisId>,
    /// Dispatch through the queue instead of running inline.
    #[arg(long = "async")]
    pub dispatch: bool,
}

pub async fn generate_proposal(
    config: &ServerConfig,
    args: GenerateProposalArgs,
) -> anyhow::Result<()> {
    submit(
        config,
        JobKind::GenerateProposal {
            lead_id: args.lead_id,
            tenant: TenantId::from(args.user_code.as_str()),
            proposal_type: args.proposal_type,
            analysis_id: args.analysis_id,
        },
        args.dispatch,
    )
    .await
}

#[derive(Args, Debug)]
pub struct GenerateOfferArgs {
    /// Lead id.
    pub lead_id: LeadId,
    /// Acting tenant's user code.
    #[arg(long = "user-code")]
    pub user_code: String,
    /// Recipient email address.
    #[arg(long)]
    pub recipient: String,
    /// Proposal the offer is composed from.
    #[arg(long)]
    pub proposal_id: Option<ProposalId>,
    /// Dispatch through the queue instead of running inline.
    #[arg(long = "async")]
    pub dispatch: bool,
}

pub async fn generate_offer(config: &ServerConfig, args: GenerateOfferArgs) -> anyhow::Result<()> {
    submit(
        config,
        JobKind::GenerateOffer {
            lead_id: args.lead_id,
            tenant: TenantId::from(args.user_code.as_str()),
            proposal_id: args.proposal_id,
            recipient: args.recipient,
        },
        args.dispatch,
    )
    .await
}

#[derive(Args, Debug)]
pub struct SyncCompanyArgs {
    /// Registration numbers to sync.
    #[arg(required = true)]
    pub icos: Vec<String>,
    /// Dispatch through the queue instead of running inline.
    #[arg(long = "async")]
    pub dispatch: bool,
}

pub async fn sync_company(config: &ServerConfig, args: SyncCompanyArgs) -> anyhow::Result<()> {
    submit(
        config,
        JobKind::SyncCompanyByIco { icos: args.icos },
        args.dispatch,
    )
    .await
}
