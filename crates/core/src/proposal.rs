use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{AnalysisId, LeadId, ProposalId, TenantId};

/// Lifecycle status of a proposal document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Draft,
    Ready,
    Sent,
    Expired,
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Draft => "draft",
            Self::Ready => "ready",
            Self::Sent => "sent",
            Self::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// A structured recommendation document produced from an analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Unique proposal identifier.
    pub id: ProposalId,

    /// Owning tenant.
    pub tenant: TenantId,

    /// The lead this proposal addresses.
    pub lead: LeadId,

    /// The analysis it was generated from, if any.
    #[serde(default)]
    pub analysis: Option<AnalysisId>,

    /// Proposal kind (e.g. `website_audit`, `eshop_upgrade`).
    pub proposal_type: String,

    /// Industry snapshot at generation time; drives recyclability matching.
    #[serde(default)]
    pub industry: Option<String>,

    /// Rendered document content.
    pub content: String,

    /// Lifecycle status.
    pub status: ProposalStatus,

    /// Whether the content was machine-generated.
    #[serde(default)]
    pub ai_generated: bool,

    /// Whether a human edited the content after generation.
    #[serde(default)]
    pub customized: bool,

    /// Whether the tenant allows this proposal to be recycled.
    #[serde(default)]
    pub recyclable: bool,

    /// When the proposal stops being usable.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// When the proposal was created.
    pub created_at: DateTime<Utc>,
}

impl Proposal {
    /// Create a draft proposal.
    #[must_use]
    pub fn new(
        tenant: impl Into<TenantId>,
        lead: LeadId,
        proposal_type: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: ProposalId::new(),
            tenant: tenant.into(),
            lead,
            analysis: None,
            proposal_type: proposal_type.into(),
            industry: None,
            content: content.into(),
            status: ProposalStatus::Draft,
            ai_generated: false,
            customized: false,
            recyclable: false,
            expires_at: None,
            created_at: Utc::now(),
        }
    }

    /// Whether this proposal can be moved to another tenant.
    ///
    /// Only AI-generated, non-customized, recyclable proposals that have
    /// left draft qualify.
    #[must_use]
    pub fn is_recycle_candidate(&self) -> bool {
        self.ai_generated
            && !self.customized
            && self.recyclable
            && self.status != ProposalStatus::Draft
    }

    /// Move the proposal to a new tenant and lead, resetting it to draft.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidTransition`] when the proposal is not a
    /// recycle candidate.
    pub fn recycle_to(&mut self, tenant: TenantId, lead: LeadId) -> Result<(), CoreError> {
        if !self.is_recycle_candidate() {
            return Err(CoreError::InvalidTransition {
                from: self.status.to_string(),
                transition: "recycle".into(),
            });
        }
        self.tenant = tenant;
        self.lead = lead;
        self.status = ProposalStatus::Draft;
        self.expires_at = None;
        Ok(())
    }

    /// Whether the proposal is past its expiry.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}
