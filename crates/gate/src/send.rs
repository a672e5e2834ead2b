use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{info, warn};

use leadflow_core::types::OfferId;
use leadflow_core::{
    CoreError, EmailLogEntry, JobContext, JobKind, Offer, OfferStatus, OfferTransition,
    TransitionResult,
};
use leadflow_dispatcher::JobHandler;
use leadflow_email::{MailTransport, OutboundEmail};
use leadflow_state::{CasOutcome, EmailLogStore as _, OfferStore as _, Store, TenantStore as _};

use crate::ratelimit::{RateLimiter, recipient_domain};
use crate::suppression::SuppressionService;

const CAS_ATTEMPTS: usize = 3;

/// The offer send protocol.
///
/// Gating order is fixed: status check, suppression membership, rate-limit
/// evaluation, transmission, then the committed `sent` transition. The
/// transmit happens after gating but before the commit, so a crash between
/// the two yields at-least-once delivery -- providers dedupe on their own
/// message id and the tracking ingestor tolerates duplicates.
pub struct SendGate {
    store: Arc<dyn Store>,
    suppression: Arc<SuppressionService>,
    ratelimit: Arc<RateLimiter>,
    mail: Arc<dyn MailTransport>,
}

impl SendGate {
    /// Wire the gate.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        suppression: Arc<SuppressionService>,
        ratelimit: Arc<RateLimiter>,
        mail: Arc<dyn MailTransport>,
    ) -> Self {
        Self {
            store,
            suppression,
            ratelimit,
            mail,
        }
    }

    /// Execute the send protocol for one offer.
    ///
    /// Returns `Ok(())` for the tolerated no-ops (missing offer, status not
    /// sendable, suppressed recipient); rate-limit denial and transport
    /// failures surface as retryable errors for the queue's backoff.
    pub async fn send(&self, offer_id: OfferId, ctx: &JobContext) -> Result<(), CoreError> {
        let Some(offer) = self
            .store
            .get_offer(&offer_id)
            .await
            .map_err(store_err)?
        else {
            warn!(offer = %offer_id, "send requested for unknown offer; skipping");
            return Ok(());
        };

        if offer.status != OfferStatus::Approved {
            warn!(
                offer = %offer_id,
                status = %offer.status,
                "offer is not sendable; skipping"
            );
            return Ok(());
        }
        ctx.checkpoint()?;

        // Suppression gate. The rejected transition commits through the same
        // CAS the sent transition uses, so the membership check and the
        // state mutation act as one unit per offer row.
        if self
            .suppression
            .is_blocked(&offer.recipient, Some(&offer.tenant))
            .await?
        {
            warn!(offer = %offer_id, recipient = %offer.recipient, "recipient suppressed; rejecting offer");
            self.commit_transition(offer, OfferTransition::Reject, |offer| {
                offer.reject_reason = Some("suppressed".into());
            })
            .await?;
            return Ok(());
        }

        let tenant = self
            .store
            .get_tenant(&offer.tenant)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("tenant", &offer.tenant))?;

        let domain = recipient_domain(&offer.recipient);
        let decision = self
            .ratelimit
            .evaluate(&tenant, domain.as_deref())
            .await?;
        if !decision.allowed {
            return Err(CoreError::RateLimited {
                reason: decision
                    .reason
                    .unwrap_or_else(|| "sending budget exhausted".into()),
            });
        }
        ctx.checkpoint()?;

        let receipt = self
            .mail
            .send(&OutboundEmail {
                to: offer.recipient.clone(),
                subject: offer.subject.clone(),
                html_body: offer.body.clone(),
                text_body: offer.plain_text_body.clone(),
            })
            .await
            .map_err(|e| {
                if e.is_retryable() {
                    CoreError::UpstreamUnavailable(e.to_string())
                } else {
                    CoreError::PermanentFailure(e.to_string())
                }
            })?;

        let message_id = receipt.message_id.clone();
        let committed = self
            .commit_transition(offer, OfferTransition::Send, |offer| {
                offer.message_id = Some(message_id.clone());
            })
            .await?;

        self.store
            .record_send(EmailLogEntry::new(
                receipt.message_id.clone(),
                committed.id,
                committed.tenant.clone(),
                committed.recipient.clone(),
            ))
            .await
            .map_err(store_err)?;

        info!(
            offer = %committed.id,
            recipient = %committed.recipient,
            message_id = %receipt.message_id,
            "offer sent"
        );
        Ok(())
    }

    /// Apply a transition through the offer CAS, retrying on version races.
    async fn commit_transition(
        &self,
        mut offer: Offer,
        transition: OfferTransition,
        prepare: impl Fn(&mut Offer),
    ) -> Result<Offer, CoreError> {
        for _ in 0..CAS_ATTEMPTS {
            match offer.apply(transition, Utc::now()) {
                TransitionResult::Applied | TransitionResult::Unchanged => {}
                TransitionResult::Invalid => {
                    return Err(CoreError::InvalidTransition {
                        from: offer.status.to_string(),
                        transition: transition.to_string(),
                    });
                }
            }
            prepare(&mut offer);
            match self
                .store
                .update_offer(offer.clone())
                .await
                .map_err(store_err)?
            {
                CasOutcome::Ok => {
                    offer.version += 1;
                    return Ok(offer);
                }
                CasOutcome::Conflict => {
                    offer = self
                        .store
                        .get_offer(&offer.id)
                        .await
                        .map_err(store_err)?
                        .ok_or_else(|| CoreError::not_found("offer", offer.id))?;
                }
            }
        }
        Err(CoreError::UpstreamUnavailable(
            "offer update kept conflicting".into(),
        ))
    }
}

fn store_err(e: leadflow_state::StateError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}

/// Handler for `send_email` jobs.
pub struct SendEmailHandler {
    gate: Arc<SendGate>,
}

impl SendEmailHandler {
    /// Wrap the gate as a job handler.
    #[must_use]
    pub fn new(gate: Arc<SendGate>) -> Self {
        Self { gate }
    }
}

#[async_trait]
impl JobHandler for SendEmailHandler {
    fn kind(&self) -> &'static str {
        "send_email"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        match job {
            JobKind::SendEmail { offer_id } => self.gate.send(offer_id, ctx).await,
            other => Err(CoreError::PermanentFailure(format!(
                "send_email handler received {} job",
                other.kind()
            ))),
        }
    }
}
