use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::info;

use leadflow_core::types::{LeadId, ProposalId};
use leadflow_core::{
    CoreError, JobContext, JobKind, Lead, Offer, OfferTransition, Proposal, TenantId,
};
use leadflow_dispatcher::JobHandler;
use leadflow_state::{LeadStore as _, OfferStore as _, ProposalStore as _, Store};

/// Composition settings for outbound offers.
#[derive(Debug, Clone)]
pub struct OfferConfig {
    /// Public base URL of the tracking endpoints, e.g.
    /// `https://app.example.com`.
    pub tracking_base_url: String,
    /// Sender display name used in the sign-off.
    pub sender_name: String,
}

impl Default for OfferConfig {
    fn default() -> Self {
        Self {
            tracking_base_url: "http://localhost:8080".into(),
            sender_name: "The Leadflow team".into(),
        }
    }
}

/// Composes offer emails from proposals, wiring in the tracking markup.
pub struct OfferComposer {
    store: Arc<dyn Store>,
    config: OfferConfig,
}

impl OfferComposer {
    /// Wire the composer.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: OfferConfig) -> Self {
        Self { store, config }
    }

    /// Compose an offer for a lead and recipient.
    ///
    /// Idempotent per `(lead, recipient)`: an existing offer for the pair
    /// is returned untouched. The new offer is submitted for approval
    /// immediately; sending stays behind the approval step and the send
    /// gate.
    pub async fn generate(
        &self,
        lead_id: LeadId,
        tenant_id: &TenantId,
        proposal_id: Option<ProposalId>,
        recipient: &str,
        ctx: &JobContext,
    ) -> Result<Offer, CoreError> {
        let lead = self
            .store
            .get_lead(&lead_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("lead", lead_id))?;
        if &lead.tenant != tenant_id {
            return Err(CoreError::InvalidInput(format!(
                "lead {lead_id} is not owned by tenant {tenant_id}"
            )));
        }
        if !recipient.contains('@') {
            return Err(CoreError::InvalidInput(format!(
                "malformed recipient address {recipient:?}"
            )));
        }

        if let Some(existing) = self
            .store
            .list_offers(tenant_id)
            .await
            .map_err(store_err)?
            .into_iter()
            .find(|offer| offer.lead == lead_id && offer.recipient == recipient)
        {
            info!(
                lead = %lead_id,
                offer = %existing.id,
                "offer for this recipient already exists; skipping"
            );
            return Ok(existing);
        }
        ctx.checkpoint()?;

        let proposal = match proposal_id {
            Some(id) => self.store.get_proposal(&id).await.map_err(store_err)?,
            None => None,
        };

        let subject = format!("How {} can win more customers online", lead.domain);
        let mut offer = Offer::new(
            tenant_id.clone(),
            lead_id,
            recipient,
            subject,
            String::new(),
            String::new(),
        );
        offer.body = self.html_body(&lead, proposal.as_ref(), &offer);
        offer.plain_text_body = self.text_body(&lead, proposal.as_ref(), &offer);
        if let Some(proposal) = &proposal {
            offer.proposal = Some(proposal.id);
        }
        offer.apply(OfferTransition::Submit, Utc::now());

        self.store
            .insert_offer(offer.clone())
            .await
            .map_err(store_err)?;
        info!(lead = %lead_id, offer = %offer.id, recipient, "offer composed");
        Ok(offer)
    }

    fn html_body(&self, lead: &Lead, proposal: Option<&Proposal>, offer: &Offer) -> String {
        let token = offer.tracking_token.as_str();
        let base = &self.config.tracking_base_url;
        let target = urlencode(&lead.url);
        let summary = proposal.map_or_else(
            || format!("<p>We took a look at {} and found room to grow.</p>", lead.domain),
            |p| format!("<pre>{}</pre>", p.content),
        );
        format!(
            "<html><body>\
             {summary}\
             <p><a href=\"{base}/api/track/click/{token}?url={target}\">See the full report</a></p>\
             <p>{sender}</p>\
             <img src=\"{base}/api/track/open/{token}\" width=\"1\" height=\"1\" alt=\"\">\
             <p><a href=\"{base}/unsubscribe/{token}\">Unsubscribe</a></p>\
             </body></html>",
            sender = self.config.sender_name,
        )
    }

    fn text_body(&self, lead: &Lead, proposal: Option<&Proposal>, offer: &Offer) -> String {
        let token = offer.tracking_token.as_str();
        let base = &self.config.tracking_base_url;
        let summary = proposal.map_or_else(
            || format!("We took a look at {} and found room to grow.", lead.domain),
            |p| p.content.clone(),
        );
        format!(
            "{summary}\n\nFull report: {url}\n\n{sender}\n\nUnsubscribe: {base}/unsubscribe/{token}\n",
            url = lead.url,
            sender = self.config.sender_name,
        )
    }
}

/// Everything outside the RFC 3986 unreserved set, for embedding a URL in
/// a query parameter.
const QUERY_TARGET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn urlencode(raw: &str) -> String {
    utf8_percent_encode(raw, QUERY_TARGET).to_string()
}

fn store_err(e: leadflow_state::StateError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}

/// Handler for `generate_offer` jobs.
pub struct GenerateOfferHandler {
    composer: Arc<OfferComposer>,
}

impl GenerateOfferHandler {
    /// Wrap the composer as a job handler.
    #[must_use]
    pub fn new(composer: Arc<OfferComposer>) -> Self {
        Self { composer }
    }
}

#[async_trait]
impl JobHandler for GenerateOfferHandler {
    fn kind(&self) -> &'static str {
        "generate_offer"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        let JobKind::GenerateOffer {
            lead_id,
            tenant,
            proposal_id,
            recipient,
        } = job
        else {
            return Err(CoreError::PermanentFailure(format!(
                "generate_offer handler received {} job",
                job.kind()
            )));
        };
        self.composer
            .generate(lead_id, &tenant, proposal_id, &recipient, ctx)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::{OfferStatus, Tenant};
    use leadflow_state::{LeadStore, TenantStore};
    use leadflow_state_memory::MemoryStore;

    use super::*;

    async fn fixture() -> (Arc<MemoryStore>, OfferComposer, Lead) {
        let store = Arc::new(MemoryStore::new());
        store.put_tenant(Tenant::new("acme", "Acme")).await.unwrap();
        let lead = Lead::from_url("acme", "https://shop.example/products?size=42").unwrap();
        store.insert_lead(lead.clone()).await.unwrap();
        let composer = OfferComposer::new(Arc::clone(&store) as _, OfferConfig::default());
        (store, composer, lead)
    }

    #[tokio::test]
    async fn composed_offer_carries_tracking_markup() {
        let (_store, composer, lead) = fixture().await;
        let offer = composer
            .generate(
                lead.id,
                &TenantId::from("acme"),
                None,
                "owner@shop.example",
                &JobContext::unbounded(),
            )
            .await
            .unwrap();

        assert_eq!(offer.status, OfferStatus::PendingApproval);
        let token = offer.tracking_token.as_str();
        assert!(offer.body.contains(&format!("/api/track/open/{token}")));
        assert!(offer.body.contains(&format!("/api/track/click/{token}?url=")));
        assert!(offer.body.contains(&format!("/unsubscribe/{token}")));
        assert!(offer.plain_text_body.contains("https://shop.example/products?size=42"));
    }

    #[tokio::test]
    async fn generation_is_idempotent_per_lead_and_recipient() {
        let (_store, composer, lead) = fixture().await;
        let first = composer
            .generate(
                lead.id,
                &TenantId::from("acme"),
                None,
                "owner@shop.example",
                &JobContext::unbounded(),
            )
            .await
            .unwrap();
        let second = composer
            .generate(
                lead.id,
                &TenantId::from("acme"),
                None,
                "owner@shop.example",
                &JobContext::unbounded(),
            )
            .await
            .unwrap();
        assert_eq!(first.id, second.id);

        // A different recipient composes a new offer.
        let third = composer
            .generate(
                lead.id,
                &TenantId::from("acme"),
                None,
                "cto@shop.example",
                &JobContext::unbounded(),
            )
            .await
            .unwrap();
        assert_ne!(first.id, third.id);
    }

    #[tokio::test]
    async fn malformed_recipient_is_invalid_input() {
        let (_store, composer, lead) = fixture().await;
        let err = composer
            .generate(
                lead.id,
                &TenantId::from("acme"),
                None,
                "not-an-address",
                &JobContext::unbounded(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidInput(_)));
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(
            urlencode("https://a.test/x?y=1&z=2"),
            "https%3A%2F%2Fa.test%2Fx%3Fy%3D1%26z%3D2"
        );
        assert_eq!(urlencode("plain-text_1.2~"), "plain-text_1.2~");
    }
}
