use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use leadflow_core::types::{AnalysisId, LeadId, ProposalId};
use leadflow_core::{CoreError, JobContext, JobKind, QueueName, TenantId};
use leadflow_dispatcher::JobHandler as _;
use leadflow_transport::{JobHeaders, JobTransport as _, enqueue_job};

use crate::error::ApiError;
use crate::state::AppState;

/// Outcome of a job-submission endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum JobSubmission {
    /// The job was enqueued for the worker pool.
    Queued { job_id: i64 },
    /// The job ran in the foreground.
    Completed,
}

/// Either enqueue the job or run its registered handler inline.
async fn submit(
    state: &AppState,
    kind: JobKind,
    run_async: bool,
) -> Result<JobSubmission, ApiError> {
    if run_async {
        let job_id = enqueue_job(&*state.transport, &kind, JobHeaders::new())
            .await
            .map_err(|e| ApiError(CoreError::UpstreamUnavailable(e.to_string())))?;
        return Ok(JobSubmission::Queued { job_id });
    }

    let handler = state
        .registry
        .get(kind.kind())
        .ok_or_else(|| {
            ApiError(CoreError::PermanentFailure(format!(
                "no handler registered for {}",
                kind.kind()
            )))
        })?;
    handler
        .handle(kind, &JobContext::unbounded())
        .await
        .map_err(ApiError)?;
    Ok(JobSubmission::Completed)
}

fn default_async() -> bool {
    true
}

/// `POST /v1/jobs/analyze-lead`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeLeadRequest {
    pub lead_id: LeadId,
    #[serde(default)]
    pub reanalyze: bool,
    #[serde(default)]
    pub industry: Option<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(rename = "async", default = "default_async")]
    pub run_async: bool,
}

pub async fn analyze_lead(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeLeadRequest>,
) -> Result<Json<JobSubmission>, ApiError> {
    let kind = JobKind::AnalyzeLead {
        lead_id: request.lead_id,
        reanalyze: request.reanalyze,
        industry: request.industry,
        profile: request.profile,
    };
    Ok(Json(submit(&state, kind, request.run_async).await?))
}

/// `POST /v1/jobs/discover-leads`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverLeadsRequest {
    pub source: String,
    pub queries: Vec<String>,
    pub user_code: String,
    #[serde(default = "default_discovery_limit")]
    pub limit: u32,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(rename = "async", default = "default_async")]
    pub run_async: bool,
}

fn default_discovery_limit() -> u32 {
    25
}

pub async fn discover_leads(
    State(state): State<AppState>,
    Json(request): Json<DiscoverLeadsRequest>,
) -> Result<Json<JobSubmission>, ApiError> {
    let kind = JobKind::DiscoverLeads {
        source: request.source,
        queries: request.queries,
        tenant: TenantId::from(request.user_code.as_str()),
        limit: request.limit,
        profile: request.profile,
    };
    Ok(Json(submit(&state, kind, request.run_async).await?))
}

/// `POST /v1/jobs/generate-proposal`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateProposalRequest {
    pub lead_id: LeadId,
    pub user_code: String,
    #[serde(rename = "type")]
    pub proposal_type: String,
    #[serde(default)]
    pub analysis_id: Option<AnalysisId>,
    #[serde(rename = "async", default = "default_async")]
    pub run_async: bool,
}

pub async fn generate_proposal(
    State(state): State<AppState>,
    Json(request): Json<GenerateProposalRequest>,
) -> Result<Json<JobSubmission>, ApiError> {
    let kind = JobKind::GenerateProposal {
        lead_id: request.lead_id,
        tenant: TenantId::from(request.user_code.as_str()),
        proposal_type: request.proposal_type,
        analysis_id: request.analysis_id,
    };
    Ok(Json(submit(&state, kind, request.run_async).await?))
}

/// `POST /v1/jobs/generate-offer`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOfferRequest {
    pub lead_id: LeadId,
    pub user_code: String,
    #[serde(default)]
    pub proposal_id: Option<ProposalId>,
    pub recipient: String,
    #[serde(rename = "async", default = "default_async")]
    pub run_async: bool,
}

pub async fn generate_offer(
    State(state): State<AppState>,
    Json(request): Json<GenerateOfferRequest>,
) -> Result<Json<JobSubmission>, ApiError> {
    let kind = JobKind::GenerateOffer {
        lead_id: request.lead_id,
        tenant: TenantId::from(request.user_code.as_str()),
        proposal_id: request.proposal_id,
        recipient: request.recipient,
    };
    Ok(Json(submit(&state, kind, request.run_async).await?))
}

/// `POST /v1/jobs/sync-company`
#[derive(Debug, Deserialize)]
pub struct SyncCompanyRequest {
    pub icos: Vec<String>,
    #[serde(rename = "async", default = "default_async")]
    pub run_async: bool,
}

pub async fn sync_company(
    State(state): State<AppState>,
    Json(request): Json<SyncCompanyRequest>,
) -> Result<Json<JobSubmission>, ApiError> {
    let kind = JobKind::SyncCompanyByIco {
        icos: request.icos,
    };
    Ok(Json(submit(&state, kind, request.run_async).await?))
}

/// One failed row as shown to operators.
#[derive(Debug, Serialize)]
pub struct FailedJob {
    pub id: i64,
    pub body: String,
    pub retry_count: u32,
    pub original_queue: Option<QueueName>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Failed-queue listing query.
#[derive(Debug, Default, Deserialize)]
pub struct FailedQuery {
    #[serde(default)]
    pub limit: Option<usize>,
}

/// `GET /v1/jobs/failed?limit=`
pub async fn list_failed(
    State(state): State<AppState>,
    Query(query): Query<FailedQuery>,
) -> Result<Json<Vec<FailedJob>>, ApiError> {
    let rows = state
        .transport
        .list(QueueName::Failed, query.limit.unwrap_or(50))
        .await
        .map_err(|e| ApiError(CoreError::UpstreamUnavailable(e.to_string())))?;
    Ok(Json(
        rows.into_iter()
            .map(|row| FailedJob {
                id: row.id,
                body: row.body,
                retry_count: row.headers.retry_count,
                original_queue: row.headers.original_queue,
                created_at: row.created_at,
            })
            .collect(),
    ))
}

/// `POST /v1/jobs/failed/{id}/redrive` -- move a failed row back to its
/// original queue.
pub async fn redrive_failed(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .transport
        .redrive(id, QueueName::Normal)
        .await
        .map_err(|e| match e {
            leadflow_transport::TransportError::NotFound(id) => {
                ApiError(CoreError::not_found("job", id))
            }
            other => ApiError(CoreError::UpstreamUnavailable(other.to_string())),
        })?;
    Ok(Json(serde_json::json!({ "redriven": id })))
}
