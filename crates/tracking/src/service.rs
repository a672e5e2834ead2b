use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use leadflow_core::{
    CoreError, Offer, OfferTransition, SuppressionReason, TrackingEventKind, TrackingEventRecord,
    TrackingToken, TransitionResult,
};
use leadflow_gate::SuppressionService;
use leadflow_state::{
    AppendOutcome, CasOutcome, EmailLogStore as _, OfferStore as _, Store,
};

/// A 1x1 transparent GIF, served for every pixel fetch.
pub const TRANSPARENT_GIF: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];

const CAS_ATTEMPTS: usize = 3;

/// Result of a click-tracking request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOutcome {
    /// The validated redirect target.
    pub redirect_to: String,
}

/// Mutations behind the tracking surfaces.
///
/// Every entry point is forgiving: unknown tokens and unknown message ids
/// never error (no existence leak, graceful webhook), and repeated events
/// keep first-observation timestamps.
pub struct TrackingService {
    store: Arc<dyn Store>,
    suppression: Arc<SuppressionService>,
}

impl TrackingService {
    /// Wire the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, suppression: Arc<SuppressionService>) -> Self {
        Self { store, suppression }
    }

    /// Record a pixel fetch. Never fails: the caller always serves the GIF.
    pub async fn record_open(&self, raw_token: &str) {
        let Ok(token) = TrackingToken::parse(raw_token) else {
            debug!("open pixel with malformed token");
            return;
        };
        if let Err(e) = self.advance_by_token(&token, OfferTransition::Open).await {
            warn!(error = %e, "failed to record open");
        }
    }

    /// Validate a click and record it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for a missing or non-http(s)
    /// target URL. An unknown token is not an error: the redirect still
    /// happens, nothing is recorded.
    pub async fn record_click(
        &self,
        raw_token: &str,
        target_url: &str,
    ) -> Result<ClickOutcome, CoreError> {
        let parsed = url::Url::parse(target_url)
            .map_err(|e| CoreError::InvalidInput(format!("invalid redirect url: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(CoreError::InvalidInput(format!(
                "refusing redirect to {:?} url",
                parsed.scheme()
            )));
        }

        if let Ok(token) = TrackingToken::parse(raw_token)
            && let Err(e) = self.advance_by_token(&token, OfferTransition::Click).await
        {
            warn!(error = %e, "failed to record click");
        }
        Ok(ClickOutcome {
            redirect_to: target_url.to_owned(),
        })
    }

    /// The offer behind an unsubscribe token, for rendering the form.
    pub async fn offer_for_token(&self, raw_token: &str) -> Result<Option<Offer>, CoreError> {
        let Ok(token) = TrackingToken::parse(raw_token) else {
            return Ok(None);
        };
        self.store
            .find_offer_by_token(&token)
            .await
            .map_err(store_err)
    }

    /// Process an unsubscribe confirmation: a per-tenant suppression entry
    /// for the offer's tenant and recipient. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NotFound`] for an unknown token -- the form is
    /// a user-facing page, not a tracking beacon.
    pub async fn unsubscribe(&self, raw_token: &str) -> Result<Offer, CoreError> {
        let offer = self
            .offer_for_token(raw_token)
            .await?
            .ok_or_else(|| CoreError::not_found("offer", raw_token))?;
        self.suppression
            .record(
                &offer.recipient,
                SuppressionReason::Unsubscribe,
                Some(offer.tenant.clone()),
            )
            .await?;
        info!(offer = %offer.id, recipient = %offer.recipient, "unsubscribe processed");
        Ok(offer)
    }

    /// Apply a provider event routed by message id.
    ///
    /// Unknown message ids and duplicate `(message_id, kind)` deliveries
    /// are tolerated no-ops.
    pub async fn apply_event(
        &self,
        message_id: &str,
        kind: TrackingEventKind,
        payload: &serde_json::Value,
    ) -> Result<(), CoreError> {
        let Some(log) = self
            .store
            .find_by_message_id(message_id)
            .await
            .map_err(store_err)?
        else {
            info!(message_id, "tracking event for unknown message id; ignoring");
            return Ok(());
        };

        let appended = self
            .store
            .append_event(
                message_id,
                TrackingEventRecord {
                    kind,
                    at: Utc::now(),
                    payload: payload.clone(),
                },
            )
            .await
            .map_err(store_err)?;
        if appended == AppendOutcome::Duplicate {
            debug!(message_id, event = ?kind, "duplicate tracking event; ignoring");
            return Ok(());
        }

        match kind {
            TrackingEventKind::Delivery => {}
            TrackingEventKind::Open => {
                self.advance_offer(log.offer, OfferTransition::Open).await?;
            }
            TrackingEventKind::Click => {
                self.advance_offer(log.offer, OfferTransition::Click).await?;
            }
            TrackingEventKind::Bounce => {
                let permanent = payload
                    .pointer("/bounce/bounceType")
                    .and_then(serde_json::Value::as_str)
                    == Some("Permanent");
                let (reason, scope) = if permanent {
                    (SuppressionReason::HardBounce, None)
                } else {
                    (SuppressionReason::SoftBounce, Some(log.tenant.clone()))
                };
                self.suppression
                    .record(&log.recipient, reason, scope)
                    .await?;
                self.mark_bounced(log.offer).await?;
            }
            TrackingEventKind::Complaint => {
                self.suppression
                    .record(&log.recipient, SuppressionReason::Complaint, None)
                    .await?;
                self.mark_bounced(log.offer).await?;
            }
        }
        Ok(())
    }

    async fn advance_by_token(
        &self,
        token: &TrackingToken,
        transition: OfferTransition,
    ) -> Result<(), CoreError> {
        let Some(offer) = self
            .store
            .find_offer_by_token(token)
            .await
            .map_err(store_err)?
        else {
            debug!("tracking hit for unknown token");
            return Ok(());
        };
        self.advance_offer(offer.id, transition).await
    }

    /// CAS loop advancing an offer along the engagement ladder. A
    /// transition the state machine refuses (offer not sent yet, offer
    /// rejected) is dropped silently -- tracking must never error a beacon.
    async fn advance_offer(
        &self,
        offer_id: leadflow_core::types::OfferId,
        transition: OfferTransition,
    ) -> Result<(), CoreError> {
        for _ in 0..CAS_ATTEMPTS {
            let Some(mut offer) = self.store.get_offer(&offer_id).await.map_err(store_err)?
            else {
                return Ok(());
            };
            match offer.apply(transition, Utc::now()) {
                TransitionResult::Invalid => {
                    debug!(
                        offer = %offer_id,
                        status = %offer.status,
                        transition = %transition,
                        "tracking transition not applicable"
                    );
                    return Ok(());
                }
                TransitionResult::Applied | TransitionResult::Unchanged => {}
            }
            match self.store.update_offer(offer).await.map_err(store_err)? {
                CasOutcome::Ok => return Ok(()),
                CasOutcome::Conflict => {}
            }
        }
        warn!(offer = %offer_id, "offer update kept conflicting; giving up");
        Ok(())
    }

    async fn mark_bounced(
        &self,
        offer_id: leadflow_core::types::OfferId,
    ) -> Result<(), CoreError> {
        for _ in 0..CAS_ATTEMPTS {
            let Some(mut offer) = self.store.get_offer(&offer_id).await.map_err(store_err)?
            else {
                return Ok(());
            };
            if offer.bounced_at.is_some() {
                return Ok(());
            }
            offer.bounced_at = Some(Utc::now());
            match self.store.update_offer(offer).await.map_err(store_err)? {
                CasOutcome::Ok => return Ok(()),
                CasOutcome::Conflict => {}
            }
        }
        Ok(())
    }
}

fn store_err(e: leadflow_state::StateError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}

#[cfg(test)]
mod tests {
    use leadflow_core::types::LeadId;
    use leadflow_core::{EmailLogEntry, OfferStatus, TenantId};
    use leadflow_state::{EmailLogStore, OfferStore, SuppressionStore};
    use leadflow_state_memory::MemoryStore;

    use super::*;

    struct Fixture {
        store: Arc<MemoryStore>,
        service: TrackingService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let service = TrackingService::new(
            Arc::clone(&store) as _,
            Arc::new(SuppressionService::new(Arc::clone(&store) as _)),
        );
        Fixture { store, service }
    }

    async fn sent_offer(store: &MemoryStore) -> Offer {
        let mut offer = Offer::new("acme", LeadId::new(), "x@y.com", "s", "b", "b");
        let now = Utc::now();
        offer.apply(OfferTransition::Submit, now);
        offer.apply(OfferTransition::Approve, now);
        offer.apply(OfferTransition::Send, now);
        offer.message_id = Some("M1".into());
        store.insert_offer(offer.clone()).await.unwrap();
        store
            .record_send(EmailLogEntry::new(
                "M1",
                offer.id,
                TenantId::from("acme"),
                "x@y.com",
            ))
            .await
            .unwrap();
        offer
    }

    #[test]
    fn gif_is_a_gif89a() {
        assert_eq!(&TRANSPARENT_GIF[..6], b"GIF89a");
    }

    #[tokio::test]
    async fn open_advances_sent_offer() {
        let f = fixture();
        let offer = sent_offer(&f.store).await;

        f.service.record_open(offer.tracking_token.as_str()).await;

        let stored = f.store.get_offer(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Opened);
        assert!(stored.opened_at.is_some());
    }

    #[tokio::test]
    async fn open_with_unknown_token_mutates_nothing() {
        let f = fixture();
        let offer = sent_offer(&f.store).await;

        f.service.record_open("nonexistent").await;
        f.service.record_open(&"0".repeat(64)).await;

        let stored = f.store.get_offer(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Sent);
    }

    #[tokio::test]
    async fn open_before_send_is_dropped() {
        let f = fixture();
        let offer = Offer::new("acme", LeadId::new(), "a@b.c", "s", "b", "b");
        f.store.insert_offer(offer.clone()).await.unwrap();

        f.service.record_open(offer.tracking_token.as_str()).await;
        let stored = f.store.get_offer(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Draft);
        assert!(stored.opened_at.is_none());
    }

    #[tokio::test]
    async fn click_validates_scheme() {
        let f = fixture();
        let offer = sent_offer(&f.store).await;

        let err = f
            .service
            .record_click(offer.tracking_token.as_str(), "javascript:alert(1)")
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
        // No state mutated by the rejected click.
        let stored = f.store.get_offer(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Sent);

        assert!(
            f.service
                .record_click(offer.tracking_token.as_str(), "ftp://files.test/x")
                .await
                .is_err()
        );
        assert!(
            f.service
                .record_click(offer.tracking_token.as_str(), "data:text/html,hi")
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn click_advances_and_implies_open() {
        let f = fixture();
        let offer = sent_offer(&f.store).await;

        let outcome = f
            .service
            .record_click(offer.tracking_token.as_str(), "https://shop.example/page")
            .await
            .unwrap();
        assert_eq!(outcome.redirect_to, "https://shop.example/page");

        let stored = f.store.get_offer(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Clicked);
        assert!(stored.opened_at.is_some());
        assert!(stored.clicked_at.is_some());
    }

    #[tokio::test]
    async fn click_with_unknown_token_still_redirects() {
        let f = fixture();
        let outcome = f
            .service
            .record_click("nonexistent", "https://shop.example/")
            .await
            .unwrap();
        assert_eq!(outcome.redirect_to, "https://shop.example/");
    }

    #[tokio::test]
    async fn unsubscribe_records_tenant_entry() {
        let f = fixture();
        let offer = sent_offer(&f.store).await;

        f.service
            .unsubscribe(offer.tracking_token.as_str())
            .await
            .unwrap();
        assert!(
            f.store
                .is_blocked("x@y.com", Some(&TenantId::from("acme")))
                .await
                .unwrap()
        );
        assert!(!f.store.is_blocked("x@y.com", None).await.unwrap());

        // Idempotent.
        f.service
            .unsubscribe(offer.tracking_token.as_str())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_with_unknown_token_is_not_found() {
        let f = fixture();
        let err = f.service.unsubscribe(&"a".repeat(64)).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn permanent_bounce_suppresses_globally() {
        let f = fixture();
        let offer = sent_offer(&f.store).await;

        let payload = serde_json::json!({
            "notificationType": "Bounce",
            "bounce": {"bounceType": "Permanent"},
            "mail": {"messageId": "M1"}
        });
        f.service
            .apply_event("M1", TrackingEventKind::Bounce, &payload)
            .await
            .unwrap();

        assert!(f.store.is_blocked("x@y.com", None).await.unwrap());
        let stored = f.store.get_offer(&offer.id).await.unwrap().unwrap();
        assert!(stored.bounced_at.is_some());
    }

    #[tokio::test]
    async fn transient_bounce_suppresses_per_tenant() {
        let f = fixture();
        sent_offer(&f.store).await;

        let payload = serde_json::json!({
            "bounce": {"bounceType": "Transient"}
        });
        f.service
            .apply_event("M1", TrackingEventKind::Bounce, &payload)
            .await
            .unwrap();

        assert!(!f.store.is_blocked("x@y.com", None).await.unwrap());
        assert!(
            f.store
                .is_blocked("x@y.com", Some(&TenantId::from("acme")))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn complaint_suppresses_globally() {
        let f = fixture();
        sent_offer(&f.store).await;

        f.service
            .apply_event("M1", TrackingEventKind::Complaint, &serde_json::json!({}))
            .await
            .unwrap();
        assert!(f.store.is_blocked("x@y.com", None).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_message_id_is_graceful() {
        let f = fixture();
        f.service
            .apply_event("M-unknown", TrackingEventKind::Open, &serde_json::json!({}))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn duplicate_event_is_dropped() {
        let f = fixture();
        let offer = sent_offer(&f.store).await;

        let open = serde_json::json!({"notificationType": "Open"});
        f.service
            .apply_event("M1", TrackingEventKind::Open, &open)
            .await
            .unwrap();
        let first_opened_at = f
            .store
            .get_offer(&offer.id)
            .await
            .unwrap()
            .unwrap()
            .opened_at;

        f.service
            .apply_event("M1", TrackingEventKind::Open, &open)
            .await
            .unwrap();
        let stored = f.store.get_offer(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.opened_at, first_opened_at);
        // Only one event recorded.
        let log = f.store.find_by_message_id("M1").await.unwrap().unwrap();
        assert_eq!(log.events.len(), 1);
    }

    #[tokio::test]
    async fn provider_open_event_advances_offer() {
        let f = fixture();
        let offer = sent_offer(&f.store).await;

        f.service
            .apply_event("M1", TrackingEventKind::Open, &serde_json::json!({}))
            .await
            .unwrap();
        let stored = f.store.get_offer(&offer.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OfferStatus::Opened);
    }
}
