use axum::Json;
use axum::extract::State;

use leadflow_core::IssueDefinition;

use crate::state::AppState;

/// `GET /v1/issues` -- the issue-code registry, code order.
pub async fn list(State(state): State<AppState>) -> Json<Vec<IssueDefinition>> {
    Json(state.issue_registry.iter().cloned().collect())
}
