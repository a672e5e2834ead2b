use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leadflow_core::{
    Analysis, AnalysisResult, Benchmark, Company, EmailLogEntry, Lead, Offer, PeriodType,
    Proposal, Snapshot, SuppressionEntry, Tenant, TenantId, TrackingEventRecord, TrackingToken,
};
use leadflow_core::types::{AnalysisId, LeadId, OfferId, ProposalId};

use crate::error::StateError;

/// Result of a compare-and-swap offer update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CasOutcome {
    /// The update was applied and the stored version bumped.
    Ok,
    /// The stored version moved; reload and retry.
    Conflict,
}

/// Result of appending a provider event to the email log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The event was recorded.
    Applied,
    /// An event of the same kind was already recorded for this message.
    Duplicate,
    /// No log entry exists for the message id.
    UnknownMessage,
}

/// Tenant accounts.
#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Insert or replace a tenant keyed by its user code.
    async fn put_tenant(&self, tenant: Tenant) -> Result<(), StateError>;

    /// Fetch a tenant by user code.
    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StateError>;

    /// All tenants, user-code order.
    async fn list_tenants(&self) -> Result<Vec<Tenant>, StateError>;
}

/// Leads, unique on `(tenant, domain)`.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Insert a lead. Returns `false` without writing when the tenant
    /// already tracks the domain.
    async fn insert_lead(&self, lead: Lead) -> Result<bool, StateError>;

    /// Fetch by id.
    async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>, StateError>;

    /// Fetch by the tenant-scoped dedup key.
    async fn find_lead_by_domain(
        &self,
        tenant: &TenantId,
        domain: &str,
    ) -> Result<Option<Lead>, StateError>;

    /// Replace a lead row by id.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Conflict`] when the lead does not exist.
    async fn update_lead(&self, lead: Lead) -> Result<(), StateError>;

    /// Leads owned by a tenant, creation order.
    async fn list_leads(&self, tenant: &TenantId) -> Result<Vec<Lead>, StateError>;
}

/// Analyses and their per-category results.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Atomically create `analysis` unless the lead already has a pending or
    /// running one. Returns `false` without writing when the slot is taken.
    ///
    /// This is the enforcement point for the one-open-analysis-per-lead
    /// invariant; a second concurrent `analyze_lead` handler observes
    /// `false` and exits as a no-op.
    async fn begin_analysis(&self, analysis: Analysis) -> Result<bool, StateError>;

    /// Fetch by id.
    async fn get_analysis(&self, id: &AnalysisId) -> Result<Option<Analysis>, StateError>;

    /// The lead's analysis with the highest sequence number.
    async fn latest_analysis(&self, lead: &LeadId) -> Result<Option<Analysis>, StateError>;

    /// Replace an analysis row by id.
    async fn update_analysis(&self, analysis: Analysis) -> Result<(), StateError>;

    /// The lead's analyses, newest first.
    async fn list_analyses(
        &self,
        lead: &LeadId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Analysis>, StateError>;

    /// Insert or replace the result row for `(analysis, category)`.
    async fn upsert_result(&self, result: AnalysisResult) -> Result<(), StateError>;

    /// All result rows of an analysis, category order.
    async fn results_for(&self, analysis: &AnalysisId)
    -> Result<Vec<AnalysisResult>, StateError>;

    /// Completed analyses of a tenant in an industry since `since`, for
    /// benchmark aggregation.
    async fn completed_analyses_in_scope(
        &self,
        tenant: &TenantId,
        industry: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Analysis>, StateError>;

    /// Delete analyses finished before `cutoff`, always keeping each lead's
    /// newest `keep_latest` rows. Returns the number of deleted analyses.
    async fn prune_analyses(
        &self,
        cutoff: DateTime<Utc>,
        keep_latest: usize,
    ) -> Result<usize, StateError>;
}

/// Offers, unique on id and on tracking token.
#[async_trait]
pub trait OfferStore: Send + Sync {
    /// Insert a new offer.
    ///
    /// # Errors
    ///
    /// Returns [`StateError::Conflict`] on a duplicate id or tracking token.
    async fn insert_offer(&self, offer: Offer) -> Result<(), StateError>;

    /// Fetch by id.
    async fn get_offer(&self, id: &OfferId) -> Result<Option<Offer>, StateError>;

    /// Fetch by tracking token.
    async fn find_offer_by_token(
        &self,
        token: &TrackingToken,
    ) -> Result<Option<Offer>, StateError>;

    /// Compare-and-swap update: applied only when the stored version equals
    /// `offer.version`; the stored row then carries `offer` with the version
    /// bumped. This serializes per-offer state transitions.
    async fn update_offer(&self, offer: Offer) -> Result<CasOutcome, StateError>;

    /// Offers owned by a tenant, creation order.
    async fn list_offers(&self, tenant: &TenantId) -> Result<Vec<Offer>, StateError>;

    /// Number of offers the tenant sent with `sent_at` in `[from, to)`.
    async fn count_sent_between(
        &self,
        tenant: &TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StateError>;

    /// Like [`count_sent_between`](OfferStore::count_sent_between), further
    /// restricted to one recipient domain.
    async fn count_sent_to_domain_between(
        &self,
        tenant: &TenantId,
        domain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StateError>;
}

/// Proposals.
#[async_trait]
pub trait ProposalStore: Send + Sync {
    /// Insert a new proposal.
    async fn insert_proposal(&self, proposal: Proposal) -> Result<(), StateError>;

    /// Fetch by id.
    async fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, StateError>;

    /// Replace a proposal row by id.
    async fn update_proposal(&self, proposal: Proposal) -> Result<(), StateError>;

    /// A proposal eligible for recycling into another tenant: AI-generated,
    /// not customized, recyclable, not draft, matching industry and type.
    async fn find_recyclable(
        &self,
        industry: &str,
        proposal_type: &str,
    ) -> Result<Option<Proposal>, StateError>;

    /// The newest proposal of a type for a lead, for idempotent generation.
    async fn find_proposal_for_lead(
        &self,
        lead: &LeadId,
        proposal_type: &str,
    ) -> Result<Option<Proposal>, StateError>;

    /// Proposals past their expiry that are not yet marked expired.
    async fn list_expiring(&self, now: DateTime<Utc>) -> Result<Vec<Proposal>, StateError>;
}

/// The suppression list: global and per-tenant blocked recipients.
///
/// Addresses are keyed case-insensitively; callers pass addresses already
/// run through [`leadflow_core::normalize_email`].
#[async_trait]
pub trait SuppressionStore: Send + Sync {
    /// Idempotent upsert; duplicates are not errors. Returns the stored
    /// entry (the pre-existing one on duplicate).
    async fn upsert_suppression(
        &self,
        entry: SuppressionEntry,
    ) -> Result<SuppressionEntry, StateError>;

    /// True when a global entry exists for the address, or a per-tenant
    /// entry exists for `(address, tenant)`.
    async fn is_blocked(
        &self,
        email: &str,
        tenant: Option<&TenantId>,
    ) -> Result<bool, StateError>;

    /// Remove an entry. Returns `true` iff one existed.
    async fn remove_suppression(
        &self,
        email: &str,
        tenant: Option<&TenantId>,
    ) -> Result<bool, StateError>;

    /// Per-tenant entries, newest first.
    async fn list_tenant_suppressions(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<SuppressionEntry>, StateError>;

    /// Global entries, newest first.
    async fn list_global_suppressions(
        &self,
        limit: usize,
    ) -> Result<Vec<SuppressionEntry>, StateError>;
}

/// The email log routing provider callbacks back to offers.
#[async_trait]
pub trait EmailLogStore: Send + Sync {
    /// Record a transmission keyed by provider message id.
    async fn record_send(&self, entry: EmailLogEntry) -> Result<(), StateError>;

    /// Fetch by provider message id.
    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<EmailLogEntry>, StateError>;

    /// Append a provider event, deduplicating on `(message_id, kind)`.
    async fn append_event(
        &self,
        message_id: &str,
        event: TrackingEventRecord,
    ) -> Result<AppendOutcome, StateError>;

    /// Drop events ingested before `cutoff`. Returns the number removed.
    async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StateError>;
}

/// Per-lead trend snapshots, unique on `(lead, period_type, period_start)`.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Insert or replace the snapshot for its period key.
    async fn upsert_snapshot(&self, snapshot: Snapshot) -> Result<(), StateError>;

    /// Snapshots of a lead at one granularity, newest first.
    async fn list_snapshots(
        &self,
        lead: &LeadId,
        period_type: PeriodType,
        limit: usize,
    ) -> Result<Vec<Snapshot>, StateError>;
}

/// Cross-lead benchmarks, unique on `(tenant, industry, period_start)`.
#[async_trait]
pub trait BenchmarkStore: Send + Sync {
    /// Insert or replace the benchmark for its key.
    async fn upsert_benchmark(&self, benchmark: Benchmark) -> Result<(), StateError>;

    /// Fetch the benchmark for an exact period.
    async fn get_benchmark(
        &self,
        tenant: &TenantId,
        industry: &str,
        period_start: DateTime<Utc>,
    ) -> Result<Option<Benchmark>, StateError>;

    /// The newest benchmark for `(tenant, industry)`.
    async fn latest_benchmark(
        &self,
        tenant: &TenantId,
        industry: &str,
    ) -> Result<Option<Benchmark>, StateError>;
}

/// Company records synchronized from the business registry.
#[async_trait]
pub trait CompanyStore: Send + Sync {
    /// Insert or replace a company keyed by ICO.
    async fn upsert_company(&self, company: Company) -> Result<(), StateError>;

    /// Fetch by ICO.
    async fn get_company(&self, ico: &str) -> Result<Option<Company>, StateError>;
}

/// The full entity store a backend provides.
pub trait Store:
    TenantStore
    + LeadStore
    + AnalysisStore
    + OfferStore
    + ProposalStore
    + SuppressionStore
    + EmailLogStore
    + SnapshotStore
    + BenchmarkStore
    + CompanyStore
{
}

impl<T> Store for T where
    T: TenantStore
        + LeadStore
        + AnalysisStore
        + OfferStore
        + ProposalStore
        + SuppressionStore
        + EmailLogStore
        + SnapshotStore
        + BenchmarkStore
        + CompanyStore
{
}
