//! In-process API tests driving the full router over the memory backends.

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use chrono::Utc;
use tower::ServiceExt;

use leadflow_core::{
    Lead, Offer, OfferStatus, OfferTransition, ProposalStatus, QueueName, RateLimitSettings,
    Tenant, TenantId,
};
use leadflow_server::{AppState, BootstrapOptions, ServerConfig, api, bootstrap};
use leadflow_state::{
    AnalysisStore, LeadStore, OfferStore, ProposalStore, SuppressionStore, TenantStore,
};
use leadflow_transport::JobTransport;

fn test_state() -> AppState {
    bootstrap(&ServerConfig::default(), BootstrapOptions::default())
}

fn app(state: &AppState) -> Router {
    api::router(Arc::clone(state))
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn seed_tenant(state: &AppState, code: &str) {
    state
        .store
        .put_tenant(Tenant::new(code, code).with_industry("eshop"))
        .await
        .unwrap();
}

async fn seed_lead(state: &AppState, code: &str, url: &str) -> Lead {
    let lead = Lead::from_url(code, url).unwrap().with_industry("eshop");
    state.store.insert_lead(lead.clone()).await.unwrap();
    lead
}

async fn seed_offer(state: &AppState, code: &str, status: OfferStatus) -> Offer {
    let lead = seed_lead(state, code, &format!("https://{}.test/", uuid_fragment())).await;
    let mut offer = Offer::new(code, lead.id, "owner@shop.example", "Audit", "<p>b</p>", "b");
    let now = Utc::now();
    let ladder: &[OfferTransition] = match status {
        OfferStatus::Draft => &[],
        OfferStatus::PendingApproval => &[OfferTransition::Submit],
        OfferStatus::Approved => &[OfferTransition::Submit, OfferTransition::Approve],
        _ => &[
            OfferTransition::Submit,
            OfferTransition::Approve,
            OfferTransition::Send,
        ],
    };
    for transition in ladder {
        offer.apply(*transition, now);
    }
    state.store.insert_offer(offer.clone()).await.unwrap();
    offer
}

fn uuid_fragment() -> String {
    leadflow_core::types::LeadId::new()
        .to_string()
        .split('-')
        .next()
        .unwrap()
        .to_owned()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap()
}

#[tokio::test]
async fn open_pixel_with_unknown_token_returns_gif() {
    let state = test_state();
    let response = app(&state)
        .oneshot(get("/api/track/open/nonexistent"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CONTENT_TYPE).unwrap(),
        "image/gif"
    );
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-cache, no-store"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..6], b"GIF89a");
}

#[tokio::test]
async fn click_with_javascript_url_is_rejected() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let offer = seed_offer(&state, "acme", OfferStatus::Sent).await;

    let uri = format!(
        "/api/track/click/{}?url=javascript:alert(1)",
        offer.tracking_token
    );
    let response = app(&state).oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // No state was mutated by the rejected click.
    let stored = state.store.get_offer(&offer.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OfferStatus::Sent);
    assert!(stored.clicked_at.is_none());
}

#[tokio::test]
async fn click_with_valid_url_redirects_and_records() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let offer = seed_offer(&state, "acme", OfferStatus::Sent).await;

    let uri = format!(
        "/api/track/click/{}?url=https://shop.example/page",
        offer.tracking_token
    );
    let response = app(&state).oneshot(get(&uri)).await.unwrap();
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "https://shop.example/page"
    );

    let stored = state.store.get_offer(&offer.id).await.unwrap().unwrap();
    assert_eq!(stored.status, OfferStatus::Clicked);
}

#[tokio::test]
async fn offer_transitions_happy_path_and_conflict() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let offer = seed_offer(&state, "acme", OfferStatus::Draft).await;

    let response = app(&state)
        .oneshot(post_empty(&format!(
            "/v1/offers/{}/submit?userCode=acme",
            offer.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "pending_approval");

    let response = app(&state)
        .oneshot(post_empty(&format!(
            "/v1/offers/{}/approve?userCode=acme",
            offer.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // Approval queues the send on the high-priority lane.
    assert_eq!(state.transport.len(QueueName::High).await.unwrap(), 1);

    // Converting an approved offer is not a listed transition.
    let response = app(&state)
        .oneshot(post_empty(&format!(
            "/v1/offers/{}/converted?userCode=acme",
            offer.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("invalid transition"));
    assert!(body["hint"].is_string());
}

#[tokio::test]
async fn foreign_tenant_sees_not_found() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let offer = seed_offer(&state, "acme", OfferStatus::Draft).await;

    let response = app(&state)
        .oneshot(post_empty(&format!(
            "/v1/offers/{}/submit?userCode=globex",
            offer.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn offer_preview_shape() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let offer = seed_offer(&state, "acme", OfferStatus::Draft).await;

    let response = app(&state)
        .oneshot(get(&format!(
            "/v1/offers/{}/preview?userCode=acme",
            offer.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["subject"], "Audit");
    assert_eq!(body["recipient"], "owner@shop.example");
    assert!(body["plainTextBody"].is_string());
    assert_eq!(
        body["trackingToken"].as_str().unwrap(),
        offer.tracking_token.as_str()
    );
}

#[tokio::test]
async fn rate_limit_inspection() {
    let state = test_state();
    state
        .store
        .put_tenant(Tenant::new("acme", "Acme").with_rate_limits(RateLimitSettings {
            daily_max: Some(10),
            ..RateLimitSettings::default()
        }))
        .await
        .unwrap();

    let response = app(&state)
        .oneshot(get("/v1/offers/rate-limits?userCode=acme&domain=Shop.Example"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["user"], "acme");
    assert_eq!(body["domain"], "shop.example");
    assert_eq!(body["allowed"], true);
    assert_eq!(body["limits"]["daily_max"], 10);
    assert_eq!(body["usage"]["daily"], 0);
    assert_eq!(body["remaining"]["daily"], 10);
}

#[tokio::test]
async fn analyses_limit_is_clamped() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let lead = seed_lead(&state, "acme", "https://clamp.test/").await;

    let response = app(&state)
        .oneshot(get(&format!(
            "/v1/leads/{}/analyses?limit=1000&offset=0",
            lead.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["limit"], 100);

    let response = app(&state)
        .oneshot(get(&format!("/v1/leads/{}/analyses?limit=0", lead.id)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["limit"], 1);

    let response = app(&state)
        .oneshot(get(&format!("/v1/leads/{}/analyses", lead.id)))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["limit"], 20);
}

#[tokio::test]
async fn benchmark_endpoint_error_shapes() {
    let state = test_state();
    seed_tenant(&state, "acme").await;

    // No analysis yet: 404.
    let lead = seed_lead(&state, "acme", "https://bench.test/").await;
    let response = app(&state)
        .oneshot(get(&format!("/v1/leads/{}/benchmark", lead.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Analysis but no industry: 400.
    let mut bare = Lead::from_url("acme", "https://noindustry.test/").unwrap();
    bare.industry = None;
    state.store.insert_lead(bare.clone()).await.unwrap();
    let analysis = leadflow_core::Analysis::begin(bare.id, TenantId::from("acme"), None, None);
    state.store.begin_analysis(analysis).await.unwrap();

    let response = app(&state)
        .oneshot(get(&format!("/v1/leads/{}/benchmark", bare.id)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn recyclable_lookup_and_recycle_conflict() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let lead = seed_lead(&state, "acme", "https://recycle.test/").await;

    let response = app(&state)
        .oneshot(get("/v1/proposals/recyclable?industry=eshop&type=website_audit"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["recyclableAvailable"], false);

    // No candidate: recycle is a 409.
    let response = app(&state)
        .oneshot(post_json(
            "/v1/proposals/recycle",
            &serde_json::json!({"userCode": "acme", "leadId": lead.id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    // Seed a recyclable proposal; the lookup flips and recycle succeeds.
    let mut proposal =
        leadflow_core::Proposal::new("someone-else", lead.id, "website_audit", "content");
    proposal.ai_generated = true;
    proposal.recyclable = true;
    proposal.industry = Some("eshop".into());
    proposal.status = ProposalStatus::Sent;
    state.store.insert_proposal(proposal).await.unwrap();

    let response = app(&state)
        .oneshot(get("/v1/proposals/recyclable?industry=eshop&type=website_audit"))
        .await
        .unwrap();
    let body = body_json(response).await;
    assert_eq!(body["recyclableAvailable"], true);

    let response = app(&state)
        .oneshot(post_json(
            "/v1/proposals/recycle",
            &serde_json::json!({"userCode": "acme", "leadId": lead.id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "draft");
    assert_eq!(body["tenant"], "acme");
}

#[tokio::test]
async fn unsubscribe_flow() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let offer = seed_offer(&state, "acme", OfferStatus::Sent).await;

    let response = app(&state)
        .oneshot(get(&format!("/unsubscribe/{}", offer.tracking_token)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app(&state)
        .oneshot(post_empty(&format!(
            "/unsubscribe/{}",
            offer.tracking_token
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    assert!(
        state
            .store
            .is_blocked("owner@shop.example", Some(&TenantId::from("acme")))
            .await
            .unwrap()
    );

    // Unknown token is a 404 on the user-facing page.
    let response = app(&state)
        .oneshot(get(&format!("/unsubscribe/{}", "a".repeat(64))))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn webhook_bounce_is_queued() {
    let state = test_state();
    let body = serde_json::json!({
        "notificationType": "Bounce",
        "bounce": {"bounceType": "Permanent"},
        "mail": {"messageId": "M1"}
    });
    let response = app(&state)
        .oneshot(post_json("/api/track/events", &body))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "queued");
    assert_eq!(state.transport.len(QueueName::High).await.unwrap(), 1);
}

#[tokio::test]
async fn webhook_unknown_type_is_ignored() {
    let state = test_state();
    let response = app(&state)
        .oneshot(post_json(
            "/api/track/events",
            &serde_json::json!({"notificationType": "Rendering"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ignored");
}

#[tokio::test]
async fn analyze_lead_job_endpoint_queues() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let lead = seed_lead(&state, "acme", "https://queueme.test/").await;

    let response = app(&state)
        .oneshot(post_json(
            "/v1/jobs/analyze-lead",
            &serde_json::json!({"leadId": lead.id}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["mode"], "queued");
    assert_eq!(state.transport.len(QueueName::Normal).await.unwrap(), 1);
}

#[tokio::test]
async fn analyze_lead_foreground_runs_inline() {
    let state = test_state();
    seed_tenant(&state, "acme").await;
    let lead = seed_lead(&state, "acme", "https://inline.test/").await;

    let response = app(&state)
        .oneshot(post_json(
            "/v1/jobs/analyze-lead",
            &serde_json::json!({"leadId": lead.id, "async": false}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["mode"], "completed");

    let stored = state.store.get_lead(&lead.id).await.unwrap().unwrap();
    assert_eq!(stored.analysis_count, 1);
}

#[tokio::test]
async fn failed_queue_listing_and_redrive() {
    let state = test_state();
    let id = state
        .transport
        .enqueue(
            QueueName::Normal,
            "{}".into(),
            leadflow_transport::JobHeaders::new(),
            Utc::now(),
        )
        .await
        .unwrap();
    state
        .transport
        .claim(QueueName::Normal, Utc::now())
        .await
        .unwrap()
        .unwrap();
    state
        .transport
        .fail(id, leadflow_transport::JobHeaders::new())
        .await
        .unwrap();

    let response = app(&state).oneshot(get("/v1/jobs/failed")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
    assert_eq!(body[0]["original_queue"], "normal");

    let response = app(&state)
        .oneshot(post_empty(&format!("/v1/jobs/failed/{id}/redrive")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(state.transport.len(QueueName::Failed).await.unwrap(), 0);
    assert_eq!(state.transport.len(QueueName::Normal).await.unwrap(), 1);
}
