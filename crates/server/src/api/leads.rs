use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};

use leadflow_core::types::LeadId;
use leadflow_core::{
    Analysis, Benchmark, CoreError, Lead, PercentileRank, PeriodType, Snapshot, percentile_rank,
};

use leadflow_state::{
    AnalysisStore as _, BenchmarkStore as _, LeadStore as _, SnapshotStore as _,
};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PAGE: usize = 20;
const MAX_PAGE: usize = 100;

fn store_err(e: leadflow_state::StateError) -> ApiError {
    ApiError(CoreError::UpstreamUnavailable(e.to_string()))
}

async fn load_lead(state: &AppState, id: LeadId) -> Result<Lead, ApiError> {
    state
        .store
        .get_lead(&id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| ApiError(CoreError::not_found("lead", id)))
}

/// Pagination query.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
}

/// Analyses page payload.
#[derive(Debug, Serialize)]
pub struct AnalysesResponse {
    pub analyses: Vec<Analysis>,
    pub limit: usize,
    pub offset: usize,
}

/// `GET /v1/leads/{id}/analyses?limit=&offset=` -- newest first, `limit`
/// clamped to `[1, 100]` with a default of 20.
pub async fn analyses(
    State(state): State<AppState>,
    Path(id): Path<LeadId>,
    Query(page): Query<PageQuery>,
) -> Result<Json<AnalysesResponse>, ApiError> {
    load_lead(&state, id).await?;
    let limit = page.limit.unwrap_or(DEFAULT_PAGE).clamp(1, MAX_PAGE);
    let offset = page.offset.unwrap_or(0);
    let analyses = state
        .store
        .list_analyses(&id, limit, offset)
        .await
        .map_err(store_err)?;
    Ok(Json(AnalysesResponse {
        analyses,
        limit,
        offset,
    }))
}

/// Trend query.
#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    #[serde(default)]
    pub period: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Trend payload.
#[derive(Debug, Serialize)]
pub struct TrendResponse {
    pub period: PeriodType,
    pub snapshots: Vec<Snapshot>,
}

/// `GET /v1/leads/{id}/trend?period=day|week|month&limit=`
pub async fn trend(
    State(state): State<AppState>,
    Path(id): Path<LeadId>,
    Query(query): Query<TrendQuery>,
) -> Result<Json<TrendResponse>, ApiError> {
    let lead = load_lead(&state, id).await?;
    let period = match query.period.as_deref() {
        Some(raw) => raw.parse::<PeriodType>().map_err(ApiError)?,
        None => lead
            .snapshot_period
            .unwrap_or_else(|| PeriodType::industry_default(lead.industry.as_deref())),
    };
    let limit = query.limit.unwrap_or(12).clamp(1, MAX_PAGE);
    let snapshots = state
        .store
        .list_snapshots(&id, period, limit)
        .await
        .map_err(store_err)?;
    Ok(Json(TrendResponse { period, snapshots }))
}

/// Benchmark payload.
#[derive(Debug, Serialize)]
pub struct BenchmarkResponse {
    pub lead: Lead,
    pub analysis: Analysis,
    pub benchmark: Option<Benchmark>,
    pub ranking: PercentileRank,
}

/// `GET /v1/leads/{id}/benchmark` -- 404 without an analysis, 400 without
/// an industry.
pub async fn benchmark(
    State(state): State<AppState>,
    Path(id): Path<LeadId>,
) -> Result<Json<BenchmarkResponse>, ApiError> {
    let lead = load_lead(&state, id).await?;
    let analysis = state
        .store
        .latest_analysis(&id)
        .await
        .map_err(store_err)?
        .ok_or_else(|| ApiError(CoreError::not_found("analysis", id)))?;
    let industry = lead
        .industry
        .clone()
        .ok_or_else(|| ApiError(CoreError::InvalidInput("lead has no industry".into())))?;

    let benchmark = state
        .store
        .latest_benchmark(&lead.tenant, &industry)
        .await
        .map_err(store_err)?;
    let ranking = benchmark
        .as_ref()
        .map_or(PercentileRank::Unknown, |benchmark| {
            percentile_rank(analysis.total_score, benchmark)
        });
    Ok(Json(BenchmarkResponse {
        lead,
        analysis,
        benchmark,
        ranking,
    }))
}
