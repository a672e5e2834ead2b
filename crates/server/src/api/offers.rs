use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::warn;

use leadflow_core::types::OfferId;
use leadflow_core::{
    CoreError, JobKind, Offer, OfferTransition, TenantId, TransitionResult,
};
use leadflow_gate::RateLimitDecision;
use leadflow_state::{CasOutcome, OfferStore as _, TenantStore as _};
use leadflow_transport::{JobHeaders, enqueue_job};

use crate::error::ApiError;
use crate::state::AppState;

const CAS_ATTEMPTS: usize = 3;

/// Common query carrying the acting tenant.
#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    /// Acting tenant's user code.
    #[serde(rename = "userCode")]
    pub user_code: String,
}

/// Load an offer, checking tenant ownership. A foreign tenant sees 404.
async fn load_owned(
    state: &AppState,
    id: OfferId,
    user_code: &str,
) -> Result<Offer, ApiError> {
    let offer = state
        .store
        .get_offer(&id)
        .await
        .map_err(|e| ApiError(CoreError::UpstreamUnavailable(e.to_string())))?
        .filter(|offer| offer.tenant == TenantId::from(user_code))
        .ok_or_else(|| ApiError(CoreError::not_found("offer", id)))?;
    Ok(offer)
}

/// Apply a transition through the offer CAS, retrying on version races.
async fn apply_transition(
    state: &AppState,
    id: OfferId,
    user_code: &str,
    transition: OfferTransition,
) -> Result<Offer, ApiError> {
    for _ in 0..CAS_ATTEMPTS {
        let mut offer = load_owned(state, id, user_code).await?;
        match offer.apply(transition, Utc::now()) {
            TransitionResult::Applied | TransitionResult::Unchanged => {}
            TransitionResult::Invalid => {
                return Err(ApiError(CoreError::InvalidTransition {
                    from: offer.status.to_string(),
                    transition: transition.to_string(),
                }));
            }
        }
        match state
            .store
            .update_offer(offer.clone())
            .await
            .map_err(|e| ApiError(CoreError::UpstreamUnavailable(e.to_string())))?
        {
            CasOutcome::Ok => {
                offer.version += 1;
                return Ok(offer);
            }
            CasOutcome::Conflict => {}
        }
    }
    Err(ApiError(CoreError::UpstreamUnavailable(
        "offer update kept conflicting".into(),
    )))
}

/// `POST /v1/offers/{id}/submit`
pub async fn submit(
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Offer>, ApiError> {
    let offer = apply_transition(&state, id, &query.user_code, OfferTransition::Submit).await?;
    Ok(Json(offer))
}

/// `POST /v1/offers/{id}/approve` -- approves and queues the send.
pub async fn approve(
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Offer>, ApiError> {
    let offer = apply_transition(&state, id, &query.user_code, OfferTransition::Approve).await?;
    if let Err(e) = enqueue_job(
        &*state.transport,
        &JobKind::SendEmail { offer_id: offer.id },
        JobHeaders::new(),
    )
    .await
    {
        warn!(offer = %offer.id, error = %e, "failed to enqueue send after approval");
    }
    Ok(Json(offer))
}

/// `POST /v1/offers/{id}/reject`
pub async fn reject(
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Offer>, ApiError> {
    let offer = apply_transition(&state, id, &query.user_code, OfferTransition::Reject).await?;
    Ok(Json(offer))
}

/// `POST /v1/offers/{id}/responded`
pub async fn responded(
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Offer>, ApiError> {
    let offer = apply_transition(&state, id, &query.user_code, OfferTransition::Respond).await?;
    Ok(Json(offer))
}

/// `POST /v1/offers/{id}/converted`
pub async fn converted(
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<Offer>, ApiError> {
    let offer = apply_transition(&state, id, &query.user_code, OfferTransition::Convert).await?;
    Ok(Json(offer))
}

/// Rendered offer preview.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub subject: String,
    pub body: String,
    pub plain_text_body: String,
    pub recipient: String,
    pub tracking_token: String,
}

/// `GET /v1/offers/{id}/preview`
pub async fn preview(
    State(state): State<AppState>,
    Path(id): Path<OfferId>,
    Query(query): Query<TenantQuery>,
) -> Result<Json<PreviewResponse>, ApiError> {
    let offer = load_owned(&state, id, &query.user_code).await?;
    Ok(Json(PreviewResponse {
        subject: offer.subject,
        body: offer.body,
        plain_text_body: offer.plain_text_body,
        recipient: offer.recipient,
        tracking_token: offer.tracking_token.as_str().to_owned(),
    }))
}

/// Query for the rate-limit inspection endpoint.
#[derive(Debug, Deserialize)]
pub struct RateLimitQuery {
    #[serde(rename = "userCode")]
    pub user_code: String,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Rate-limit inspection payload.
#[derive(Debug, Serialize)]
pub struct RateLimitResponse {
    pub user: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(flatten)]
    pub decision: RateLimitDecision,
}

/// `GET /v1/offers/rate-limits?userCode=&domain=`
pub async fn rate_limits(
    State(state): State<AppState>,
    Query(query): Query<RateLimitQuery>,
) -> Result<Json<RateLimitResponse>, ApiError> {
    let tenant_id = TenantId::from(query.user_code.as_str());
    let tenant = state
        .store
        .get_tenant(&tenant_id)
        .await
        .map_err(|e| ApiError(CoreError::UpstreamUnavailable(e.to_string())))?
        .ok_or_else(|| ApiError(CoreError::not_found("tenant", &tenant_id)))?;

    let domain = query.domain.clone().map(|d| d.to_ascii_lowercase());
    let decision = state
        .ratelimit
        .evaluate(&tenant, domain.as_deref())
        .await
        .map_err(ApiError)?;
    Ok(Json(RateLimitResponse {
        user: query.user_code,
        domain,
        decision,
    }))
}
