use serde::{Deserialize, Serialize};

use crate::types::{AnalysisId, LeadId, OfferId, ProposalId, TenantId};

/// Priority lane in the job transport.
///
/// `failed` holds exhausted jobs and is never consumed automatically;
/// operators re-drive it by moving rows back to their original queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueName {
    High,
    Normal,
    Low,
    Failed,
}

impl QueueName {
    /// Stable string form used as the transport's `queue_name` column.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueName {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            "failed" => Ok(Self::Failed),
            other => Err(crate::error::CoreError::InvalidInput(format!(
                "unknown queue {other:?}"
            ))),
        }
    }
}

/// Provider tracking event categories routed through the high queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingEventKind {
    Delivery,
    Open,
    Click,
    Bounce,
    Complaint,
}

/// What `cleanup_old_data` should prune.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTarget {
    Analyses,
    TrackingEvents,
    All,
}

/// A durable unit of asynchronous work.
///
/// Serialized as the internally-tagged JSON body of a transport row; the
/// tag doubles as the handler registry key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobKind {
    /// Transmit an approved offer. Idempotent per offer: only one `sent`
    /// transition is possible.
    SendEmail { offer_id: OfferId },

    /// Apply a provider callback to the offer behind `message_id`.
    ProcessTrackingEvent {
        message_id: String,
        event: TrackingEventKind,
        #[serde(default)]
        payload: serde_json::Value,
    },

    /// Run the analysis pipeline over a lead.
    AnalyzeLead {
        lead_id: LeadId,
        #[serde(default)]
        reanalyze: bool,
        #[serde(default)]
        industry: Option<String>,
        #[serde(default)]
        profile: Option<String>,
    },

    /// Generate a proposal document from the lead's newest (or a named)
    /// analysis.
    GenerateProposal {
        lead_id: LeadId,
        tenant: TenantId,
        proposal_type: String,
        #[serde(default)]
        analysis_id: Option<AnalysisId>,
    },

    /// Compose an offer email from a proposal.
    GenerateOffer {
        lead_id: LeadId,
        tenant: TenantId,
        #[serde(default)]
        proposal_id: Option<ProposalId>,
        recipient: String,
    },

    /// Refresh company records from the registry lookup, one per ICO.
    SyncCompanyByIco { icos: Vec<String> },

    /// Search a source and create deduplicated leads.
    DiscoverLeads {
        source: String,
        queries: Vec<String>,
        tenant: TenantId,
        limit: u32,
        #[serde(default)]
        profile: Option<String>,
    },

    /// Capture a screenshot of the lead's site.
    TakeScreenshot { lead_id: LeadId },

    /// Recompute benchmarks, optionally restricted to one industry.
    CalculateBenchmarks {
        #[serde(default)]
        industry: Option<String>,
    },

    /// Expand every tenant's scheduled discovery profiles into
    /// `discover_leads` jobs.
    BatchDiscovery,

    /// Expire proposals past their deadline.
    ExpireProposals,

    /// Flag leads whose sites fail the TLS probe.
    CheckSsl,

    /// Prune old data.
    CleanupOldData { target: CleanupTarget },
}

impl JobKind {
    /// The registry key identifying the handler for this job.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::SendEmail { .. } => "send_email",
            Self::ProcessTrackingEvent { .. } => "process_tracking_event",
            Self::AnalyzeLead { .. } => "analyze_lead",
            Self::GenerateProposal { .. } => "generate_proposal",
            Self::GenerateOffer { .. } => "generate_offer",
            Self::SyncCompanyByIco { .. } => "sync_company_by_ico",
            Self::DiscoverLeads { .. } => "discover_leads",
            Self::TakeScreenshot { .. } => "take_screenshot",
            Self::CalculateBenchmarks { .. } => "calculate_benchmarks",
            Self::BatchDiscovery => "batch_discovery",
            Self::ExpireProposals => "expire_proposals",
            Self::CheckSsl => "check_ssl",
            Self::CleanupOldData { .. } => "cleanup_old_data",
        }
    }

    /// The queue this job kind is dispatched on.
    #[must_use]
    pub fn default_queue(&self) -> QueueName {
        match self {
            Self::SendEmail { .. } | Self::ProcessTrackingEvent { .. } => QueueName::High,
            Self::AnalyzeLead { .. }
            | Self::GenerateProposal { .. }
            | Self::GenerateOffer { .. }
            | Self::SyncCompanyByIco { .. } => QueueName::Normal,
            Self::DiscoverLeads { .. }
            | Self::TakeScreenshot { .. }
            | Self::CalculateBenchmarks { .. }
            | Self::BatchDiscovery
            | Self::ExpireProposals
            | Self::CheckSsl
            | Self::CleanupOldData { .. } => QueueName::Low,
        }
    }
}
