pub mod analysis;
pub mod benchmark;
pub mod company;
pub mod context;
pub mod email_log;
pub mod error;
pub mod issue;
pub mod job;
pub mod lead;
pub mod offer;
pub mod profile;
pub mod proposal;
pub mod scoring;
pub mod snapshot;
pub mod suppression;
pub mod tenant;
pub mod types;

pub use analysis::{Analysis, AnalysisResult, AnalysisStatus, IssueDelta, ResultStatus};
pub use benchmark::{
    Benchmark, BenchmarkSample, Percentiles, PercentileRank, TopIssue, compute_benchmark,
    percentile_rank,
};
pub use company::Company;
pub use context::JobContext;
pub use email_log::{EmailLogEntry, TrackingEventRecord};
pub use error::CoreError;
pub use issue::{Issue, IssueDefinition, IssueRegistry, Severity};
pub use job::{CleanupTarget, JobKind, QueueName, TrackingEventKind};
pub use lead::{CanonicalUrl, Lead, LeadStatus, canonicalize_url};
pub use offer::{Offer, OfferStatus, OfferTransition, TrackingToken, TransitionResult};
pub use profile::DiscoveryProfile;
pub use proposal::{Proposal, ProposalStatus};
pub use scoring::{ScoringThresholds, map_lead_status};
pub use snapshot::{PeriodType, Snapshot, period_start};
pub use suppression::{SuppressionEntry, SuppressionReason, normalize_email};
pub use tenant::{RateLimitSettings, Tenant, TenantRole};
pub use types::{AnalysisId, LeadId, OfferId, ProposalId, TenantId};
