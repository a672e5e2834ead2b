//! HTTP surface: operator API under `/v1`, tracking endpoints under the
//! bit-stable public paths.

pub mod health;
pub mod issues;
pub mod jobs;
pub mod leads;
pub mod offers;
pub mod proposals;
pub mod track;

use axum::Router;
use axum::routing::{get, post};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        // Offers
        .route("/v1/offers/{id}/submit", post(offers::submit))
        .route("/v1/offers/{id}/approve", post(offers::approve))
        .route("/v1/offers/{id}/reject", post(offers::reject))
        .route("/v1/offers/{id}/responded", post(offers::responded))
        .route("/v1/offers/{id}/converted", post(offers::converted))
        .route("/v1/offers/{id}/preview", get(offers::preview))
        .route("/v1/offers/rate-limits", get(offers::rate_limits))
        // Leads
        .route("/v1/leads/{id}/analyses", get(leads::analyses))
        .route("/v1/leads/{id}/trend", get(leads::trend))
        .route("/v1/leads/{id}/benchmark", get(leads::benchmark))
        // Proposals
        .route("/v1/proposals/recyclable", get(proposals::recyclable))
        .route("/v1/proposals/recycle", post(proposals::recycle))
        // Issue registry
        .route("/v1/issues", get(issues::list))
        // Jobs
        .route("/v1/jobs/analyze-lead", post(jobs::analyze_lead))
        .route("/v1/jobs/discover-leads", post(jobs::discover_leads))
        .route("/v1/jobs/generate-proposal", post(jobs::generate_proposal))
        .route("/v1/jobs/generate-offer", post(jobs::generate_offer))
        .route("/v1/jobs/sync-company", post(jobs::sync_company))
        .route("/v1/jobs/failed", get(jobs::list_failed))
        .route("/v1/jobs/failed/{id}/redrive", post(jobs::redrive_failed))
        // Tracking surfaces (bit-stable paths)
        .route("/api/track/open/{token}", get(track::open))
        .route("/api/track/click/{token}", get(track::click))
        .route("/api/track/events", post(track::events))
        .route(
            "/unsubscribe/{token}",
            get(track::unsubscribe_form).post(track::unsubscribe_submit),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
