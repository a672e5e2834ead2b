use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{Html, IntoResponse, Response};
use serde::Deserialize;

use leadflow_core::CoreError;
use leadflow_tracking::{IngestOutcome, TRANSPARENT_GIF};

use crate::error::ApiError;
use crate::state::AppState;

/// `GET /api/track/open/{token}` -- the 1x1 pixel.
///
/// Always 200 with the GIF, even for unknown or malformed tokens: the
/// pixel must not leak whether an offer exists.
pub async fn open(State(state): State<AppState>, Path(token): Path<String>) -> Response {
    state.tracking.record_open(&token).await;
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "image/gif"),
            (header::CACHE_CONTROL, "no-cache, no-store"),
        ],
        TRANSPARENT_GIF,
    )
        .into_response()
}

/// Click query.
#[derive(Debug, Deserialize)]
pub struct ClickQuery {
    #[serde(default)]
    pub url: Option<String>,
}

/// `GET /api/track/click/{token}?url=` -- validate and redirect.
///
/// Only `http` and `https` targets are accepted; anything else is a 400.
/// An unknown token still redirects (no existence leak).
pub async fn click(
    State(state): State<AppState>,
    Path(token): Path<String>,
    Query(query): Query<ClickQuery>,
) -> Result<Response, ApiError> {
    let url = query
        .url
        .ok_or_else(|| ApiError(CoreError::InvalidInput("missing url parameter".into())))?;
    let outcome = state
        .tracking
        .record_click(&token, &url)
        .await
        .map_err(ApiError)?;
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, outcome.redirect_to)],
    )
        .into_response())
}

/// `POST /api/track/events` -- provider callback intake.
///
/// Unknown notification types come back as `ignored`; unknown message ids
/// are accepted and dropped by the worker. Both are 200s so the provider
/// stops retrying.
pub async fn events(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<IngestOutcome>, ApiError> {
    let outcome = state.ingestor.ingest(&body).await.map_err(ApiError)?;
    Ok(Json(outcome))
}

/// `GET /unsubscribe/{token}` -- confirmation form.
pub async fn unsubscribe_form(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Html<String>, ApiError> {
    let offer = state
        .tracking
        .offer_for_token(&token)
        .await
        .map_err(ApiError)?
        .ok_or_else(|| ApiError(CoreError::not_found("offer", token.as_str())))?;
    Ok(Html(format!(
        "<html><body>\
         <h1>Unsubscribe</h1>\
         <p>Stop receiving emails at {recipient}?</p>\
         <form method=\"post\" action=\"/unsubscribe/{token}\">\
         <button type=\"submit\">Unsubscribe</button>\
         </form>\
         </body></html>",
        recipient = offer.recipient,
    )))
}

/// `POST /unsubscribe/{token}` -- process the unsubscribe.
pub async fn unsubscribe_submit(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Html<String>, ApiError> {
    let offer = state.tracking.unsubscribe(&token).await.map_err(ApiError)?;
    Ok(Html(format!(
        "<html><body>\
         <h1>Unsubscribed</h1>\
         <p>{recipient} will not receive further emails.</p>\
         </body></html>",
        recipient = offer.recipient,
    )))
}
