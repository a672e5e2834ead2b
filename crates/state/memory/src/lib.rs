//! In-memory [`Store`](leadflow_state::Store) backend.
//!
//! A single mutex guards all tables, which makes every multi-row operation
//! (insert-with-unique-check, compare-and-swap, begin-analysis) atomic the
//! same way a database transaction would. The lock is a standard `Mutex`,
//! never held across an `.await` point.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use leadflow_core::types::{AnalysisId, LeadId, OfferId, ProposalId};
use leadflow_core::{
    Analysis, AnalysisResult, Benchmark, Company, EmailLogEntry, Lead, Offer, PeriodType,
    Proposal, ProposalStatus, Snapshot, SuppressionEntry, Tenant, TenantId, TrackingEventRecord,
    TrackingToken,
};
use leadflow_state::{
    AnalysisStore, AppendOutcome, BenchmarkStore, CasOutcome, CompanyStore, EmailLogStore,
    LeadStore, OfferStore, ProposalStore, SnapshotStore, StateError, SuppressionStore,
    TenantStore,
};

type SuppressionKey = (String, Option<TenantId>);

#[derive(Default)]
struct Inner {
    tenants: BTreeMap<TenantId, Tenant>,
    leads: HashMap<LeadId, Lead>,
    lead_domains: HashMap<(TenantId, String), LeadId>,
    analyses: HashMap<AnalysisId, Analysis>,
    lead_analyses: HashMap<LeadId, Vec<AnalysisId>>,
    results: HashMap<AnalysisId, BTreeMap<String, AnalysisResult>>,
    offers: HashMap<OfferId, Offer>,
    offer_tokens: HashMap<String, OfferId>,
    proposals: HashMap<ProposalId, Proposal>,
    suppressions: HashMap<SuppressionKey, SuppressionEntry>,
    email_logs: HashMap<String, EmailLogEntry>,
    snapshots: HashMap<(LeadId, PeriodType, DateTime<Utc>), Snapshot>,
    benchmarks: HashMap<(TenantId, String, DateTime<Utc>), Benchmark>,
    companies: BTreeMap<String, Company>,
}

/// In-memory entity store.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().expect("state mutex poisoned")
    }
}

fn suppression_key(email: &str, tenant: Option<&TenantId>) -> SuppressionKey {
    (email.to_ascii_lowercase(), tenant.cloned())
}

fn recipient_domain(address: &str) -> Option<String> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_ascii_lowercase())
}

#[async_trait]
impl TenantStore for MemoryStore {
    async fn put_tenant(&self, tenant: Tenant) -> Result<(), StateError> {
        self.lock().tenants.insert(tenant.user_code.clone(), tenant);
        Ok(())
    }

    async fn get_tenant(&self, id: &TenantId) -> Result<Option<Tenant>, StateError> {
        Ok(self.lock().tenants.get(id).cloned())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, StateError> {
        Ok(self.lock().tenants.values().cloned().collect())
    }
}

#[async_trait]
impl LeadStore for MemoryStore {
    async fn insert_lead(&self, lead: Lead) -> Result<bool, StateError> {
        let mut inner = self.lock();
        let key = (lead.tenant.clone(), lead.domain.clone());
        if inner.lead_domains.contains_key(&key) {
            return Ok(false);
        }
        inner.lead_domains.insert(key, lead.id);
        inner.leads.insert(lead.id, lead);
        Ok(true)
    }

    async fn get_lead(&self, id: &LeadId) -> Result<Option<Lead>, StateError> {
        Ok(self.lock().leads.get(id).cloned())
    }

    async fn find_lead_by_domain(
        &self,
        tenant: &TenantId,
        domain: &str,
    ) -> Result<Option<Lead>, StateError> {
        let inner = self.lock();
        let id = inner
            .lead_domains
            .get(&(tenant.clone(), domain.to_ascii_lowercase()));
        Ok(id.and_then(|id| inner.leads.get(id)).cloned())
    }

    async fn update_lead(&self, lead: Lead) -> Result<(), StateError> {
        let mut inner = self.lock();
        if !inner.leads.contains_key(&lead.id) {
            return Err(StateError::Conflict(format!("unknown lead {}", lead.id)));
        }
        inner.leads.insert(lead.id, lead);
        Ok(())
    }

    async fn list_leads(&self, tenant: &TenantId) -> Result<Vec<Lead>, StateError> {
        let inner = self.lock();
        let mut leads: Vec<Lead> = inner
            .leads
            .values()
            .filter(|l| &l.tenant == tenant)
            .cloned()
            .collect();
        leads.sort_by_key(|l| l.created_at);
        Ok(leads)
    }
}

#[async_trait]
impl AnalysisStore for MemoryStore {
    async fn begin_analysis(&self, analysis: Analysis) -> Result<bool, StateError> {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let chain = inner.lead_analyses.entry(analysis.lead).or_default();
        let has_open = chain
            .iter()
            .any(|id| inner.analyses.get(id).is_some_and(|a| a.status.is_open()));
        if has_open {
            return Ok(false);
        }
        chain.push(analysis.id);
        inner.analyses.insert(analysis.id, analysis);
        Ok(true)
    }

    async fn get_analysis(&self, id: &AnalysisId) -> Result<Option<Analysis>, StateError> {
        Ok(self.lock().analyses.get(id).cloned())
    }

    async fn latest_analysis(&self, lead: &LeadId) -> Result<Option<Analysis>, StateError> {
        let inner = self.lock();
        let latest = inner
            .lead_analyses
            .get(lead)
            .and_then(|chain| chain.last())
            .and_then(|id| inner.analyses.get(id));
        Ok(latest.cloned())
    }

    async fn update_analysis(&self, analysis: Analysis) -> Result<(), StateError> {
        let mut inner = self.lock();
        if !inner.analyses.contains_key(&analysis.id) {
            return Err(StateError::Conflict(format!(
                "unknown analysis {}",
                analysis.id
            )));
        }
        inner.analyses.insert(analysis.id, analysis);
        Ok(())
    }

    async fn list_analyses(
        &self,
        lead: &LeadId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Analysis>, StateError> {
        let inner = self.lock();
        let chain = inner.lead_analyses.get(lead);
        let analyses = chain
            .map(|chain| {
                chain
                    .iter()
                    .rev()
                    .skip(offset)
                    .take(limit)
                    .filter_map(|id| inner.analyses.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        Ok(analyses)
    }

    async fn upsert_result(&self, result: AnalysisResult) -> Result<(), StateError> {
        self.lock()
            .results
            .entry(result.analysis)
            .or_default()
            .insert(result.category.clone(), result);
        Ok(())
    }

    async fn results_for(
        &self,
        analysis: &AnalysisId,
    ) -> Result<Vec<AnalysisResult>, StateError> {
        let inner = self.lock();
        Ok(inner
            .results
            .get(analysis)
            .map(|by_category| by_category.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn completed_analyses_in_scope(
        &self,
        tenant: &TenantId,
        industry: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Analysis>, StateError> {
        let inner = self.lock();
        Ok(inner
            .analyses
            .values()
            .filter(|a| {
                &a.tenant == tenant
                    && a.status == leadflow_core::AnalysisStatus::Completed
                    && a.industry.as_deref() == Some(industry)
                    && a.finished_at.is_some_and(|at| at >= since)
            })
            .cloned()
            .collect())
    }

    async fn prune_analyses(
        &self,
        cutoff: DateTime<Utc>,
        keep_latest: usize,
    ) -> Result<usize, StateError> {
        let mut inner = self.lock();
        let mut doomed: Vec<(LeadId, AnalysisId)> = Vec::new();
        for (lead, chain) in &inner.lead_analyses {
            let keep_from = chain.len().saturating_sub(keep_latest);
            for id in &chain[..keep_from] {
                let old = inner
                    .analyses
                    .get(id)
                    .is_some_and(|a| a.finished_at.is_some_and(|at| at < cutoff));
                if old {
                    doomed.push((*lead, *id));
                }
            }
        }
        let removed = doomed.len();
        for (lead, id) in doomed {
            inner.analyses.remove(&id);
            inner.results.remove(&id);
            if let Some(chain) = inner.lead_analyses.get_mut(&lead) {
                chain.retain(|existing| *existing != id);
            }
        }
        Ok(removed)
    }
}

#[async_trait]
impl OfferStore for MemoryStore {
    async fn insert_offer(&self, offer: Offer) -> Result<(), StateError> {
        let mut inner = self.lock();
        if inner.offers.contains_key(&offer.id) {
            return Err(StateError::Conflict(format!("duplicate offer {}", offer.id)));
        }
        let token = offer.tracking_token.as_str().to_owned();
        if inner.offer_tokens.contains_key(&token) {
            return Err(StateError::Conflict("duplicate tracking token".into()));
        }
        inner.offer_tokens.insert(token, offer.id);
        inner.offers.insert(offer.id, offer);
        Ok(())
    }

    async fn get_offer(&self, id: &OfferId) -> Result<Option<Offer>, StateError> {
        Ok(self.lock().offers.get(id).cloned())
    }

    async fn find_offer_by_token(
        &self,
        token: &TrackingToken,
    ) -> Result<Option<Offer>, StateError> {
        let inner = self.lock();
        let id = inner.offer_tokens.get(token.as_str());
        Ok(id.and_then(|id| inner.offers.get(id)).cloned())
    }

    async fn update_offer(&self, mut offer: Offer) -> Result<CasOutcome, StateError> {
        let mut inner = self.lock();
        let Some(stored) = inner.offers.get(&offer.id) else {
            return Err(StateError::Conflict(format!("unknown offer {}", offer.id)));
        };
        if stored.version != offer.version {
            return Ok(CasOutcome::Conflict);
        }
        offer.version += 1;
        inner.offers.insert(offer.id, offer);
        Ok(CasOutcome::Ok)
    }

    async fn list_offers(&self, tenant: &TenantId) -> Result<Vec<Offer>, StateError> {
        let inner = self.lock();
        let mut offers: Vec<Offer> = inner
            .offers
            .values()
            .filter(|o| &o.tenant == tenant)
            .cloned()
            .collect();
        offers.sort_by_key(|o| o.created_at);
        Ok(offers)
    }

    async fn count_sent_between(
        &self,
        tenant: &TenantId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StateError> {
        let inner = self.lock();
        Ok(inner
            .offers
            .values()
            .filter(|o| &o.tenant == tenant)
            .filter(|o| o.sent_at.is_some_and(|at| at >= from && at < to))
            .count())
    }

    async fn count_sent_to_domain_between(
        &self,
        tenant: &TenantId,
        domain: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<usize, StateError> {
        let wanted = domain.to_ascii_lowercase();
        let inner = self.lock();
        Ok(inner
            .offers
            .values()
            .filter(|o| &o.tenant == tenant)
            .filter(|o| o.sent_at.is_some_and(|at| at >= from && at < to))
            .filter(|o| recipient_domain(&o.recipient).as_deref() == Some(wanted.as_str()))
            .count())
    }
}

#[async_trait]
impl ProposalStore for MemoryStore {
    async fn insert_proposal(&self, proposal: Proposal) -> Result<(), StateError> {
        let mut inner = self.lock();
        if inner.proposals.contains_key(&proposal.id) {
            return Err(StateError::Conflict(format!(
                "duplicate proposal {}",
                proposal.id
            )));
        }
        inner.proposals.insert(proposal.id, proposal);
        Ok(())
    }

    async fn get_proposal(&self, id: &ProposalId) -> Result<Option<Proposal>, StateError> {
        Ok(self.lock().proposals.get(id).cloned())
    }

    async fn update_proposal(&self, proposal: Proposal) -> Result<(), StateError> {
        let mut inner = self.lock();
        if !inner.proposals.contains_key(&proposal.id) {
            return Err(StateError::Conflict(format!(
                "unknown proposal {}",
                proposal.id
            )));
        }
        inner.proposals.insert(proposal.id, proposal);
        Ok(())
    }

    async fn find_recyclable(
        &self,
        industry: &str,
        proposal_type: &str,
    ) -> Result<Option<Proposal>, StateError> {
        let inner = self.lock();
        let mut candidates: Vec<&Proposal> = inner
            .proposals
            .values()
            .filter(|p| {
                p.is_recycle_candidate()
                    && p.industry.as_deref() == Some(industry)
                    && p.proposal_type == proposal_type
            })
            .collect();
        candidates.sort_by_key(|p| p.created_at);
        Ok(candidates.first().map(|p| (*p).clone()))
    }

    async fn find_proposal_for_lead(
        &self,
        lead: &LeadId,
        proposal_type: &str,
    ) -> Result<Option<Proposal>, StateError> {
        let inner = self.lock();
        let mut matching: Vec<&Proposal> = inner
            .proposals
            .values()
            .filter(|p| &p.lead == lead && p.proposal_type == proposal_type)
            .collect();
        matching.sort_by_key(|p| p.created_at);
        Ok(matching.last().map(|p| (*p).clone()))
    }

    async fn list_expiring(&self, now: DateTime<Utc>) -> Result<Vec<Proposal>, StateError> {
        let inner = self.lock();
        Ok(inner
            .proposals
            .values()
            .filter(|p| p.status != ProposalStatus::Expired && p.is_expired_at(now))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl SuppressionStore for MemoryStore {
    async fn upsert_suppression(
        &self,
        entry: SuppressionEntry,
    ) -> Result<SuppressionEntry, StateError> {
        let mut inner = self.lock();
        let key = suppression_key(&entry.email, entry.tenant.as_ref());
        let stored = inner.suppressions.entry(key).or_insert(entry);
        Ok(stored.clone())
    }

    async fn is_blocked(
        &self,
        email: &str,
        tenant: Option<&TenantId>,
    ) -> Result<bool, StateError> {
        let inner = self.lock();
        if inner
            .suppressions
            .contains_key(&suppression_key(email, None))
        {
            return Ok(true);
        }
        Ok(tenant.is_some_and(|tenant| {
            inner
                .suppressions
                .contains_key(&suppression_key(email, Some(tenant)))
        }))
    }

    async fn remove_suppression(
        &self,
        email: &str,
        tenant: Option<&TenantId>,
    ) -> Result<bool, StateError> {
        let removed = self
            .lock()
            .suppressions
            .remove(&suppression_key(email, tenant))
            .is_some();
        Ok(removed)
    }

    async fn list_tenant_suppressions(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<SuppressionEntry>, StateError> {
        let inner = self.lock();
        let mut entries: Vec<SuppressionEntry> = inner
            .suppressions
            .values()
            .filter(|e| e.tenant.as_ref() == Some(tenant))
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }

    async fn list_global_suppressions(
        &self,
        limit: usize,
    ) -> Result<Vec<SuppressionEntry>, StateError> {
        let inner = self.lock();
        let mut entries: Vec<SuppressionEntry> = inner
            .suppressions
            .values()
            .filter(|e| e.tenant.is_none())
            .cloned()
            .collect();
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        entries.truncate(limit);
        Ok(entries)
    }
}

#[async_trait]
impl EmailLogStore for MemoryStore {
    async fn record_send(&self, entry: EmailLogEntry) -> Result<(), StateError> {
        self.lock()
            .email_logs
            .insert(entry.message_id.clone(), entry);
        Ok(())
    }

    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<EmailLogEntry>, StateError> {
        Ok(self.lock().email_logs.get(message_id).cloned())
    }

    async fn append_event(
        &self,
        message_id: &str,
        event: TrackingEventRecord,
    ) -> Result<AppendOutcome, StateError> {
        let mut inner = self.lock();
        let Some(entry) = inner.email_logs.get_mut(message_id) else {
            return Ok(AppendOutcome::UnknownMessage);
        };
        if entry.has_event(event.kind) {
            return Ok(AppendOutcome::Duplicate);
        }
        entry.events.push(event);
        Ok(AppendOutcome::Applied)
    }

    async fn prune_events_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StateError> {
        let mut inner = self.lock();
        let mut removed = 0;
        for entry in inner.email_logs.values_mut() {
            let before = entry.events.len();
            entry.events.retain(|e| e.at >= cutoff);
            removed += before - entry.events.len();
        }
        Ok(removed)
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn upsert_snapshot(&self, snapshot: Snapshot) -> Result<(), StateError> {
        let key = (snapshot.lead, snapshot.period_type, snapshot.period_start);
        self.lock().snapshots.insert(key, snapshot);
        Ok(())
    }

    async fn list_snapshots(
        &self,
        lead: &LeadId,
        period_type: PeriodType,
        limit: usize,
    ) -> Result<Vec<Snapshot>, StateError> {
        let inner = self.lock();
        let mut snapshots: Vec<Snapshot> = inner
            .snapshots
            .values()
            .filter(|s| &s.lead == lead && s.period_type == period_type)
            .cloned()
            .collect();
        snapshots.sort_by(|a, b| b.period_start.cmp(&a.period_start));
        snapshots.truncate(limit);
        Ok(snapshots)
    }
}

#[async_trait]
impl BenchmarkStore for MemoryStore {
    async fn upsert_benchmark(&self, benchmark: Benchmark) -> Result<(), StateError> {
        let key = (
            benchmark.tenant.clone(),
            benchmark.industry.clone(),
            benchmark.period_start,
        );
        self.lock().benchmarks.insert(key, benchmark);
        Ok(())
    }

    async fn get_benchmark(
        &self,
        tenant: &TenantId,
        industry: &str,
        period_start: DateTime<Utc>,
    ) -> Result<Option<Benchmark>, StateError> {
        let key = (tenant.clone(), industry.to_owned(), period_start);
        Ok(self.lock().benchmarks.get(&key).cloned())
    }

    async fn latest_benchmark(
        &self,
        tenant: &TenantId,
        industry: &str,
    ) -> Result<Option<Benchmark>, StateError> {
        let inner = self.lock();
        let latest = inner
            .benchmarks
            .values()
            .filter(|b| &b.tenant == tenant && b.industry == industry)
            .max_by_key(|b| b.period_start);
        Ok(latest.cloned())
    }
}

#[async_trait]
impl CompanyStore for MemoryStore {
    async fn upsert_company(&self, company: Company) -> Result<(), StateError> {
        self.lock().companies.insert(company.ico.clone(), company);
        Ok(())
    }

    async fn get_company(&self, ico: &str) -> Result<Option<Company>, StateError> {
        Ok(self.lock().companies.get(ico).cloned())
    }
}
