use axum::Json;
use axum::extract::{Query, State};
use serde::{Deserialize, Serialize};

use leadflow_core::types::LeadId;
use leadflow_core::{Proposal, TenantId};

use crate::error::ApiError;
use crate::state::AppState;

const DEFAULT_PROPOSAL_TYPE: &str = "website_audit";

/// Recyclability query.
#[derive(Debug, Deserialize)]
pub struct RecyclableQuery {
    pub industry: String,
    #[serde(rename = "type", default)]
    pub proposal_type: Option<String>,
}

/// Recyclability payload.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecyclableResponse {
    pub industry: String,
    #[serde(rename = "type")]
    pub proposal_type: String,
    pub recyclable_available: bool,
}

/// `GET /v1/proposals/recyclable?industry=&type=`
pub async fn recyclable(
    State(state): State<AppState>,
    Query(query): Query<RecyclableQuery>,
) -> Result<Json<RecyclableResponse>, ApiError> {
    let proposal_type = query
        .proposal_type
        .unwrap_or_else(|| DEFAULT_PROPOSAL_TYPE.to_owned());
    let available = state
        .proposals
        .recyclable_available(&query.industry, &proposal_type)
        .await
        .map_err(ApiError)?;
    Ok(Json(RecyclableResponse {
        industry: query.industry,
        proposal_type,
        recyclable_available: available,
    }))
}

/// Recycle request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecycleRequest {
    pub user_code: String,
    #[serde(default)]
    pub lead_id: Option<LeadId>,
    #[serde(rename = "type", default)]
    pub proposal_type: Option<String>,
}

/// `POST /v1/proposals/recycle` -- 409 when no candidate matches.
pub async fn recycle(
    State(state): State<AppState>,
    Json(request): Json<RecycleRequest>,
) -> Result<Json<Proposal>, ApiError> {
    let proposal_type = request
        .proposal_type
        .unwrap_or_else(|| DEFAULT_PROPOSAL_TYPE.to_owned());
    let proposal = state
        .proposals
        .recycle(
            &TenantId::from(request.user_code.as_str()),
            request.lead_id,
            &proposal_type,
        )
        .await
        .map_err(ApiError)?;
    Ok(Json(proposal))
}
