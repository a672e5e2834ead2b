use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use leadflow_core::CoreError;

/// API-boundary error: wraps the platform error kinds and renders the JSON
/// envelope `{error, hint?}` with the matching status code.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct ApiError(#[from] pub CoreError);

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            CoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CoreError::InvalidTransition { .. } | CoreError::Suppressed { .. } => {
                StatusCode::CONFLICT
            }
            CoreError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoreError::UpstreamUnavailable(_) | CoreError::Cancelled(_) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            CoreError::PermanentFailure(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match &self.0 {
            CoreError::RateLimited { .. } => Some("retry after the sending window resets"),
            CoreError::InvalidTransition { .. } => {
                Some("reload the offer to see its current status")
            }
            _ => None,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.hint() {
            Some(hint) => serde_json::json!({ "error": self.0.to_string(), "hint": hint }),
            None => serde_json::json!({ "error": self.0.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
