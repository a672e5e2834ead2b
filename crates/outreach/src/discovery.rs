use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use leadflow_core::{CoreError, JobContext, JobKind, Lead, QueueName, TenantId, canonicalize_url};
use leadflow_dispatcher::JobHandler;
use leadflow_state::{LeadStore as _, Store, TenantStore as _};
use leadflow_transport::{JobHeaders, JobTransport, enqueue_job};

/// One search hit from a lead source.
#[derive(Debug, Clone)]
pub struct DiscoveredLead {
    /// Target URL as returned by the source.
    pub url: String,
    /// Display name when the source provides one.
    pub name: Option<String>,
}

/// Seam for lead search backends (SERP scrapers, directories, ...).
#[async_trait]
pub trait LeadSource: Send + Sync {
    /// Source identifier referenced by discovery profiles.
    fn name(&self) -> &str;

    /// Run one query, returning up to `limit` hits.
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<DiscoveredLead>, CoreError>;
}

/// A source returning canned results, for tests and development.
pub struct StaticLeadSource {
    name: String,
    results: Vec<DiscoveredLead>,
}

impl StaticLeadSource {
    /// Create a source answering every query with `urls`.
    #[must_use]
    pub fn new(name: &str, urls: &[&str]) -> Self {
        Self {
            name: name.to_owned(),
            results: urls
                .iter()
                .map(|url| DiscoveredLead {
                    url: (*url).to_owned(),
                    name: None,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl LeadSource for StaticLeadSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _query: &str, limit: u32) -> Result<Vec<DiscoveredLead>, CoreError> {
        Ok(self.results.iter().take(limit as usize).cloned().collect())
    }
}

/// Discovers leads from configured sources, deduplicating per domain and
/// honoring tenant exclusions, then queues each new lead for analysis.
pub struct DiscoveryService {
    store: Arc<dyn Store>,
    transport: Arc<dyn JobTransport>,
    sources: HashMap<String, Arc<dyn LeadSource>>,
}

impl DiscoveryService {
    /// Wire the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, transport: Arc<dyn JobTransport>) -> Self {
        Self {
            store,
            transport,
            sources: HashMap::new(),
        }
    }

    /// Register a source under its name.
    #[must_use]
    pub fn with_source(mut self, source: Arc<dyn LeadSource>) -> Self {
        self.sources.insert(source.name().to_owned(), source);
        self
    }

    /// Run discovery. Returns the number of leads created.
    ///
    /// Dedup happens at three levels: per-run (a domain seen twice across
    /// queries counts once), per-tenant (the `(tenant, domain)` unique key
    /// skips known leads), and tenant exclusions.
    pub async fn discover(
        &self,
        source_name: &str,
        queries: &[String],
        tenant_id: &TenantId,
        limit: u32,
        profile_name: Option<&str>,
        ctx: &JobContext,
    ) -> Result<usize, CoreError> {
        let source = self
            .sources
            .get(source_name)
            .ok_or_else(|| {
                CoreError::PermanentFailure(format!("unknown lead source {source_name:?}"))
            })?;
        let tenant = self
            .store
            .get_tenant(tenant_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("tenant", tenant_id))?;
        let profile = profile_name.and_then(|name| tenant.profiles.get(name));
        let industry = profile
            .and_then(|p| p.industry.clone())
            .or_else(|| tenant.industry.clone());

        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut created = 0usize;

        'queries: for query in queries {
            ctx.checkpoint()?;
            let hits = source.search(query, limit).await?;
            debug!(source = source_name, query = %query, hits = hits.len(), "source query done");

            for hit in hits {
                if created as u32 >= limit {
                    break 'queries;
                }
                let canonical = match canonicalize_url(&hit.url) {
                    Ok(canonical) => canonical,
                    Err(e) => {
                        debug!(url = %hit.url, error = %e, "skipping unparseable hit");
                        continue;
                    }
                };
                if !seen.insert(canonical.domain.clone()) {
                    continue;
                }
                if tenant.is_domain_excluded(&canonical.domain) {
                    debug!(domain = %canonical.domain, "domain excluded by tenant");
                    continue;
                }

                let mut lead = Lead::from_url(tenant_id.clone(), &hit.url)?;
                lead.industry = industry.clone();
                lead.profile = profile.map(|p| p.name.clone());
                let lead_id = lead.id;
                let inserted = self
                    .store
                    .insert_lead(lead)
                    .await
                    .map_err(store_err)?;
                if !inserted {
                    debug!(domain = %canonical.domain, "lead already tracked");
                    continue;
                }
                created += 1;

                if let Err(e) = enqueue_job(
                    &*self.transport,
                    &JobKind::AnalyzeLead {
                        lead_id,
                        reanalyze: false,
                        industry: industry.clone(),
                        profile: profile.map(|p| p.name.clone()),
                    },
                    JobHeaders::new(),
                )
                .await
                {
                    warn!(lead = %lead_id, error = %e, "failed to enqueue analysis for new lead");
                }
            }
        }

        info!(
            source = source_name,
            tenant = %tenant_id,
            created,
            "discovery finished"
        );
        Ok(created)
    }

    /// Expand every tenant's scheduled discovery profiles into
    /// `discover_leads` jobs, one per profile per UTC day.
    ///
    /// The per-profile-per-day dedup key is checked against rows already in
    /// the low queue, so re-emitting the batch job within a day is safe.
    pub async fn run_batch(&self, ctx: &JobContext) -> Result<usize, CoreError> {
        let tenants = self.store.list_tenants().await.map_err(store_err)?;
        let today = Utc::now().format("%Y-%m-%d").to_string();

        let queued = self
            .transport
            .list(QueueName::Low, usize::MAX)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?;
        let queued_keys: BTreeSet<String> = queued
            .iter()
            .filter_map(|job| job.headers.dedup_key.clone())
            .collect();

        let mut emitted = 0;
        for tenant in tenants {
            ctx.checkpoint()?;
            for profile in tenant.profiles.values() {
                if profile.schedule.is_none() {
                    continue;
                }
                let dedup_key =
                    format!("{}:{}:{}", tenant.user_code, profile.name, today);
                if queued_keys.contains(&dedup_key) {
                    debug!(key = %dedup_key, "discovery already queued today");
                    continue;
                }
                let job = JobKind::DiscoverLeads {
                    source: profile.source.clone(),
                    queries: profile.queries.clone(),
                    tenant: tenant.user_code.clone(),
                    limit: profile.limit,
                    profile: Some(profile.name.clone()),
                };
                enqueue_job(
                    &*self.transport,
                    &job,
                    JobHeaders::new().with_dedup_key(dedup_key),
                )
                .await
                .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?;
                emitted += 1;
            }
        }
        info!(emitted, "batch discovery expanded");
        Ok(emitted)
    }
}

fn store_err(e: leadflow_state::StateError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}

/// Handler for `discover_leads` jobs.
pub struct DiscoverLeadsHandler {
    service: Arc<DiscoveryService>,
}

impl DiscoverLeadsHandler {
    /// Wrap the service as a job handler.
    #[must_use]
    pub fn new(service: Arc<DiscoveryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for DiscoverLeadsHandler {
    fn kind(&self) -> &'static str {
        "discover_leads"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        let JobKind::DiscoverLeads {
            source,
            queries,
            tenant,
            limit,
            profile,
        } = job
        else {
            return Err(CoreError::PermanentFailure(format!(
                "discover_leads handler received {} job",
                job.kind()
            )));
        };
        self.service
            .discover(&source, &queries, &tenant, limit, profile.as_deref(), ctx)
            .await?;
        Ok(())
    }
}

/// Handler for `batch_discovery` jobs.
pub struct BatchDiscoveryHandler {
    service: Arc<DiscoveryService>,
}

impl BatchDiscoveryHandler {
    /// Wrap the service as a job handler.
    #[must_use]
    pub fn new(service: Arc<DiscoveryService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for BatchDiscoveryHandler {
    fn kind(&self) -> &'static str {
        "batch_discovery"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        if !matches!(job, JobKind::BatchDiscovery) {
            return Err(CoreError::PermanentFailure(format!(
                "batch_discovery handler received {} job",
                job.kind()
            )));
        }
        self.service.run_batch(ctx).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::{DiscoveryProfile, Tenant};
    use leadflow_state::{LeadStore, TenantStore};
    use leadflow_state_memory::MemoryStore;
    use leadflow_transport::MemoryTransport;

    use super::*;

    fn service(
        store: Arc<MemoryStore>,
        transport: Arc<MemoryTransport>,
        urls: &[&str],
    ) -> DiscoveryService {
        DiscoveryService::new(Arc::clone(&store) as _, Arc::clone(&transport) as _)
            .with_source(Arc::new(StaticLeadSource::new("serp", urls)))
    }

    #[tokio::test]
    async fn discovery_creates_deduplicated_leads() {
        let store = Arc::new(MemoryStore::new());
        store.put_tenant(Tenant::new("acme", "Acme")).await.unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let service = service(
            Arc::clone(&store),
            Arc::clone(&transport),
            &[
                "https://a.test/?utm_source=serp",
                "https://a.test/other",
                "https://b.test/",
            ],
        );

        let created = service
            .discover(
                "serp",
                &["query".into()],
                &TenantId::from("acme"),
                10,
                None,
                &JobContext::unbounded(),
            )
            .await
            .unwrap();
        assert_eq!(created, 2);

        let leads = store.list_leads(&TenantId::from("acme")).await.unwrap();
        assert_eq!(leads.len(), 2);
        // One analysis job per created lead.
        assert_eq!(transport.len(QueueName::Normal).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn rerun_skips_known_leads() {
        let store = Arc::new(MemoryStore::new());
        store.put_tenant(Tenant::new("acme", "Acme")).await.unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let service = service(Arc::clone(&store), transport, &["https://a.test/"]);

        let first = service
            .discover(
                "serp",
                &["q".into()],
                &TenantId::from("acme"),
                10,
                None,
                &JobContext::unbounded(),
            )
            .await
            .unwrap();
        let second = service
            .discover(
                "serp",
                &["q".into()],
                &TenantId::from("acme"),
                10,
                None,
                &JobContext::unbounded(),
            )
            .await
            .unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn excluded_domains_are_skipped() {
        let store = Arc::new(MemoryStore::new());
        let mut tenant = Tenant::new("acme", "Acme");
        tenant.excluded_domains.insert("blocked.test".into());
        store.put_tenant(tenant).await.unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let service = service(
            Arc::clone(&store),
            transport,
            &["https://blocked.test/", "https://fine.test/"],
        );

        let created = service
            .discover(
                "serp",
                &["q".into()],
                &TenantId::from("acme"),
                10,
                None,
                &JobContext::unbounded(),
            )
            .await
            .unwrap();
        assert_eq!(created, 1);
        let leads = store.list_leads(&TenantId::from("acme")).await.unwrap();
        assert_eq!(leads[0].domain, "fine.test");
    }

    #[tokio::test]
    async fn limit_caps_created_leads() {
        let store = Arc::new(MemoryStore::new());
        store.put_tenant(Tenant::new("acme", "Acme")).await.unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let service = service(
            Arc::clone(&store),
            transport,
            &["https://a.test/", "https://b.test/", "https://c.test/"],
        );

        let created = service
            .discover(
                "serp",
                &["q".into()],
                &TenantId::from("acme"),
                2,
                None,
                &JobContext::unbounded(),
            )
            .await
            .unwrap();
        assert_eq!(created, 2);
    }

    #[tokio::test]
    async fn unknown_source_is_permanent() {
        let store = Arc::new(MemoryStore::new());
        store.put_tenant(Tenant::new("acme", "Acme")).await.unwrap();
        let transport = Arc::new(MemoryTransport::new());
        let service = DiscoveryService::new(Arc::clone(&store) as _, transport);

        let err = service
            .discover(
                "nonexistent",
                &["q".into()],
                &TenantId::from("acme"),
                10,
                None,
                &JobContext::unbounded(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::PermanentFailure(_)));
    }

    #[tokio::test]
    async fn batch_discovery_emits_once_per_profile_per_day() {
        let store = Arc::new(MemoryStore::new());
        let mut profile = DiscoveryProfile::new("daily-plumbers", "serp");
        profile.queries = vec!["plumber prague".into()];
        profile.schedule = Some("0 5 * * *".into());
        store
            .put_tenant(Tenant::new("acme", "Acme").with_profile(profile))
            .await
            .unwrap();
        // A profile without a schedule is never expanded.
        store
            .put_tenant(
                Tenant::new("globex", "Globex")
                    .with_profile(DiscoveryProfile::new("manual-only", "serp")),
            )
            .await
            .unwrap();

        let transport = Arc::new(MemoryTransport::new());
        let service = service(Arc::clone(&store), Arc::clone(&transport), &[]);

        let first = service.run_batch(&JobContext::unbounded()).await.unwrap();
        assert_eq!(first, 1);
        // Re-running the batch job the same day is a no-op.
        let second = service.run_batch(&JobContext::unbounded()).await.unwrap();
        assert_eq!(second, 0);

        let jobs = transport.list(QueueName::Low, 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert!(
            jobs[0]
                .headers
                .dedup_key
                .as_deref()
                .unwrap()
                .starts_with("acme:daily-plumbers:")
        );
    }
}
