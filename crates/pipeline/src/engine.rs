use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, info, warn};

use leadflow_core::types::LeadId;
use leadflow_core::{
    Analysis, AnalysisResult, AnalysisStatus, CoreError, DiscoveryProfile, JobContext, JobKind,
    Lead, LeadStatus, PeriodType, ResultStatus, Severity, Snapshot, Tenant, map_lead_status,
    period_start,
};
use leadflow_dispatcher::JobHandler;
use leadflow_state::{
    AnalysisStore as _, LeadStore as _, SnapshotStore as _, Store, TenantStore as _,
};
use leadflow_transport::{JobHeaders, JobTransport, enqueue_job};

use crate::analyzer::{AnalyzerOutcome, AnalyzerRegistry, ESHOP_DETECTION_CATEGORY};
use crate::select::select_analyzers;

/// Tuning knobs for the analysis engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Wall-time budget per analyzer invocation.
    pub analyzer_timeout: Duration,
    /// Number of issue codes kept on a snapshot.
    pub top_issues: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            analyzer_timeout: Duration::from_secs(30),
            top_issues: 5,
        }
    }
}

/// Runs the tenant-configured analyzer set over a lead, persists
/// per-category results, computes the total score and deltas against the
/// previous run, maps the outcome onto a lead status, and upserts the trend
/// snapshot.
pub struct AnalysisEngine {
    store: Arc<dyn Store>,
    registry: Arc<AnalyzerRegistry>,
    transport: Arc<dyn JobTransport>,
    config: EngineConfig,
}

impl AnalysisEngine {
    /// Wire the engine.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<AnalyzerRegistry>,
        transport: Arc<dyn JobTransport>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            registry,
            transport,
            config,
        }
    }

    /// Run one analysis over a lead.
    ///
    /// Returns `Ok(None)` for the tolerated no-ops: the lead already has an
    /// analysis and `reanalyze` is false, or another analysis is running
    /// (the uniqueness precondition ate the slot -- the job is still
    /// consumed).
    pub async fn analyze(
        &self,
        lead_id: LeadId,
        reanalyze: bool,
        industry_override: Option<String>,
        profile_override: Option<String>,
        ctx: &JobContext,
    ) -> Result<Option<Analysis>, CoreError> {
        let lead = self
            .store
            .get_lead(&lead_id)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("lead", lead_id))?;

        if lead.latest_analysis.is_some() && !reanalyze {
            info!(lead = %lead_id, "lead already analyzed and reanalyze not requested; skipping");
            return Ok(None);
        }

        let tenant = self
            .store
            .get_tenant(&lead.tenant)
            .await
            .map_err(store_err)?
            .ok_or_else(|| CoreError::not_found("tenant", &lead.tenant))?;

        let industry = industry_override
            .or_else(|| lead.industry.clone())
            .or_else(|| tenant.industry.clone());
        let profile = profile_override
            .or_else(|| lead.profile.clone())
            .and_then(|name| tenant.profiles.get(&name).cloned());

        let previous = self
            .store
            .latest_analysis(&lead_id)
            .await
            .map_err(store_err)?;

        let mut analysis = Analysis::begin(
            lead_id,
            lead.tenant.clone(),
            previous.as_ref(),
            industry.clone(),
        );
        let created = self
            .store
            .begin_analysis(analysis.clone())
            .await
            .map_err(store_err)?;
        if !created {
            info!(lead = %lead_id, "an analysis is already running for this lead; skipping");
            return Ok(None);
        }

        let original_status = lead.status;
        let mut analyzing = lead.clone();
        analyzing.status = LeadStatus::Analyzing;
        self.store
            .update_lead(analyzing.clone())
            .await
            .map_err(store_err)?;

        match self
            .run_analyzers(&mut analysis, &analyzing, profile.as_ref(), ctx)
            .await
        {
            Ok(results) => {
                self.finalize(
                    analysis,
                    analyzing,
                    &tenant,
                    previous.as_ref(),
                    &results,
                    original_status,
                )
                .await
                .map(Some)
            }
            Err(e) => {
                // Close the running slot so the lead is not wedged; the
                // retried job starts a fresh analysis.
                warn!(lead = %lead_id, error = %e, "analysis aborted");
                analysis.status = AnalysisStatus::Failed;
                analysis.finished_at = Some(Utc::now());
                if let Err(update_err) = self.store.update_analysis(analysis).await {
                    warn!(lead = %lead_id, error = %update_err, "failed to close aborted analysis");
                }
                let mut restored = analyzing;
                restored.status = original_status;
                if let Err(update_err) = self.store.update_lead(restored).await {
                    warn!(lead = %lead_id, error = %update_err, "failed to restore lead status");
                }
                Err(e)
            }
        }
    }

    /// Execute the selected analyzers, persisting one result row each.
    async fn run_analyzers(
        &self,
        analysis: &mut Analysis,
        lead: &Lead,
        profile: Option<&DiscoveryProfile>,
        ctx: &JobContext,
    ) -> Result<Vec<AnalysisResult>, CoreError> {
        let selected = select_analyzers(&self.registry, analysis.industry.as_deref(), profile);
        debug!(
            lead = %lead.id,
            analysis = %analysis.id,
            analyzers = selected.len(),
            "running analysis"
        );

        let mut results = Vec::with_capacity(selected.len());
        for analyzer in selected {
            ctx.checkpoint()?;
            let category = analyzer.category().to_owned();
            let mut result = AnalysisResult::begin(analysis.id, category.clone());
            self.store
                .upsert_result(result.clone())
                .await
                .map_err(store_err)?;

            let outcome =
                match tokio::time::timeout(self.config.analyzer_timeout, analyzer.analyze(lead))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => AnalyzerOutcome::failed("analyzer deadline exceeded"),
                };

            if outcome.success {
                result.status = ResultStatus::Completed;
                result.score = outcome.score;
                result.raw_data = outcome.raw_data;
                result.issues = outcome
                    .issues
                    .into_iter()
                    .filter(|issue| !profile.is_some_and(|p| p.ignores(&category, &issue.code)))
                    .collect();

                if category == ESHOP_DETECTION_CATEGORY
                    && let Some(is_eshop) =
                        result.raw_data.get("isEshop").and_then(serde_json::Value::as_bool)
                {
                    analysis.is_eshop = is_eshop;
                }
            } else {
                result.status = ResultStatus::Failed;
                result.error_message = outcome.error_message;
                warn!(
                    lead = %lead.id,
                    category = %category,
                    error = result.error_message.as_deref().unwrap_or("unknown"),
                    "analyzer failed"
                );
            }

            self.store
                .upsert_result(result.clone())
                .await
                .map_err(store_err)?;
            results.push(result);
        }
        Ok(results)
    }

    /// Finalize the analysis, update the lead, and write the snapshot.
    async fn finalize(
        &self,
        mut analysis: Analysis,
        mut lead: Lead,
        tenant: &Tenant,
        previous: Option<&Analysis>,
        results: &[AnalysisResult],
        original_status: LeadStatus,
    ) -> Result<Analysis, CoreError> {
        // An empty selection counts as all-failed: nothing ran, so nothing
        // may score, snapshot, or re-map the lead.
        let completed = results.iter().any(|r| r.status == ResultStatus::Completed);
        let total_score: i32 = results
            .iter()
            .filter(|r| r.status == ResultStatus::Completed)
            .map(|r| r.score)
            .sum();

        let current_codes: BTreeSet<String> = results
            .iter()
            .flat_map(|r| r.issues.iter().map(|i| i.code.clone()))
            .collect();
        let previous_codes = match previous {
            Some(previous) => {
                let previous_results = self
                    .store
                    .results_for(&previous.id)
                    .await
                    .map_err(store_err)?;
                Some(
                    previous_results
                        .iter()
                        .flat_map(|r| r.issues.iter().map(|i| i.code.clone()))
                        .collect::<BTreeSet<String>>(),
                )
            }
            None => None,
        };

        analysis.finalize(
            completed,
            total_score,
            previous,
            previous_codes.as_ref(),
            &current_codes,
        );
        self.store
            .update_analysis(analysis.clone())
            .await
            .map_err(store_err)?;

        let critical_issue_count: usize = results
            .iter()
            .map(|r| r.issues_at_least(Severity::Critical))
            .sum();

        lead.latest_analysis = Some(analysis.id);
        lead.analysis_count += 1;
        lead.analyzed_at = Some(Utc::now());
        if lead.industry.is_none() {
            lead.industry = analysis.industry.clone();
        }
        lead.status = if analysis.status == AnalysisStatus::Completed {
            map_lead_status(
                total_score,
                critical_issue_count,
                analysis.is_eshop,
                &tenant.scoring,
            )
        } else {
            original_status
        };
        self.store
            .update_lead(lead.clone())
            .await
            .map_err(store_err)?;

        if analysis.status == AnalysisStatus::Completed {
            let period = lead
                .snapshot_period
                .or(tenant.snapshot_period)
                .unwrap_or_else(|| PeriodType::industry_default(lead.industry.as_deref()));
            self.write_snapshot(&analysis, &lead, results, critical_issue_count, period)
                .await?;
        }

        if let Err(e) = enqueue_job(
            &*self.transport,
            &JobKind::TakeScreenshot { lead_id: lead.id },
            JobHeaders::new(),
        )
        .await
        {
            warn!(lead = %lead.id, error = %e, "failed to enqueue screenshot job");
        }

        info!(
            lead = %lead.id,
            analysis = %analysis.id,
            sequence = analysis.sequence_number,
            status = %analysis.status,
            total_score = analysis.total_score,
            score_delta = ?analysis.score_delta,
            "analysis finished"
        );
        Ok(analysis)
    }

    async fn write_snapshot(
        &self,
        analysis: &Analysis,
        lead: &Lead,
        results: &[AnalysisResult],
        critical_issue_count: usize,
        period: PeriodType,
    ) -> Result<(), CoreError> {
        let category_scores: BTreeMap<String, i32> = results
            .iter()
            .filter(|r| r.status == ResultStatus::Completed)
            .map(|r| (r.category.clone(), r.score))
            .collect();
        let issue_count: usize = results.iter().map(|r| r.issues.len()).sum();

        let mut code_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for result in results {
            for issue in &result.issues {
                *code_counts.entry(issue.code.as_str()).or_insert(0) += 1;
            }
        }
        let mut ranked: Vec<(&str, usize)> = code_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        let top_issues: Vec<String> = ranked
            .into_iter()
            .take(self.config.top_issues)
            .map(|(code, _)| code.to_owned())
            .collect();

        let snapshot = Snapshot {
            lead: lead.id,
            tenant: lead.tenant.clone(),
            period_type: period,
            period_start: period_start(period, Utc::now()),
            total_score: analysis.total_score,
            category_scores,
            issue_count,
            critical_issue_count,
            top_issues,
            score_delta: analysis.score_delta,
            created_at: Utc::now(),
        };
        self.store
            .upsert_snapshot(snapshot)
            .await
            .map_err(store_err)
    }
}

fn store_err(e: leadflow_state::StateError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}

/// Handler for `analyze_lead` jobs.
pub struct AnalyzeLeadHandler {
    engine: Arc<AnalysisEngine>,
}

impl AnalyzeLeadHandler {
    /// Wrap the engine as a job handler.
    #[must_use]
    pub fn new(engine: Arc<AnalysisEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for AnalyzeLeadHandler {
    fn kind(&self) -> &'static str {
        "analyze_lead"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        match job {
            JobKind::AnalyzeLead {
                lead_id,
                reanalyze,
                industry,
                profile,
            } => {
                self.engine
                    .analyze(lead_id, reanalyze, industry, profile, ctx)
                    .await?;
                Ok(())
            }
            other => Err(CoreError::PermanentFailure(format!(
                "analyze_lead handler received {} job",
                other.kind()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::{QueueName, Tenant};
    use leadflow_state::{
        AnalysisStore, LeadStore, SnapshotStore, TenantStore,
    };
    use leadflow_state_memory::MemoryStore;
    use leadflow_transport::MemoryTransport;

    use super::*;
    use crate::testing::StaticAnalyzer;

    struct Fixture {
        store: Arc<MemoryStore>,
        transport: Arc<MemoryTransport>,
        engine: AnalysisEngine,
    }

    fn engine_with(registry: AnalyzerRegistry, store: Arc<MemoryStore>) -> Fixture {
        let transport = Arc::new(MemoryTransport::new());
        let engine = AnalysisEngine::new(
            Arc::clone(&store) as _,
            Arc::new(registry),
            Arc::clone(&transport) as _,
            EngineConfig::default(),
        );
        Fixture {
            store,
            transport,
            engine,
        }
    }

    async fn seeded_lead(store: &MemoryStore, industry: &str) -> Lead {
        store.put_tenant(Tenant::new("acme", "Acme")).await.unwrap();
        let lead = Lead::from_url("acme", "https://site-a.test/")
            .unwrap()
            .with_industry(industry);
        store.insert_lead(lead.clone()).await.unwrap();
        lead
    }

    #[tokio::test]
    async fn first_analysis_has_no_deltas_and_writes_snapshot() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(
            StaticAnalyzer::universal("seo", 10).scoring(40, &["missing_title"], Severity::High),
        ));
        let f = engine_with(registry, store);

        let analysis = f
            .engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(analysis.sequence_number, 1);
        assert!(analysis.previous_analysis.is_none());
        assert_eq!(analysis.status, AnalysisStatus::Completed);
        assert_eq!(analysis.total_score, 40);
        assert!(analysis.score_delta.is_none());
        assert!(!analysis.is_improved);
        assert!(analysis.issue_delta.is_none());

        let stored_lead = f.store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(stored_lead.analysis_count, 1);
        assert_eq!(stored_lead.latest_analysis, Some(analysis.id));
        assert!(stored_lead.analyzed_at.is_some());

        // Eshop is not fast-moving: the snapshot lands on the ISO week.
        let snapshots = f
            .store
            .list_snapshots(&lead.id, PeriodType::Week, 10)
            .await
            .unwrap();
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].total_score, 40);
        assert_eq!(
            snapshots[0].period_start,
            period_start(PeriodType::Week, Utc::now())
        );
    }

    #[tokio::test]
    async fn second_analysis_computes_deltas() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(
            StaticAnalyzer::universal("seo", 10).scoring(40, &["a", "b", "c"], Severity::Medium),
        ));
        let f = engine_with(registry, Arc::clone(&store));
        f.engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(
            StaticAnalyzer::universal("seo", 10).scoring(60, &["b", "c", "d"], Severity::Medium),
        ));
        let f = engine_with(registry, store);
        let second = f
            .engine
            .analyze(lead.id, true, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(second.sequence_number, 2);
        assert_eq!(second.score_delta, Some(20));
        assert!(second.is_improved);
        let delta = second.issue_delta.unwrap();
        assert_eq!(delta.added, vec!["d".to_owned()]);
        assert_eq!(delta.removed, vec!["a".to_owned()]);
        assert_eq!(delta.unchanged_count, 2);
    }

    #[tokio::test]
    async fn already_analyzed_without_reanalyze_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(StaticAnalyzer::universal("seo", 10).scoring(
            10,
            &[],
            Severity::Low,
        )));
        let f = engine_with(registry, store);

        assert!(
            f.engine
                .analyze(lead.id, false, None, None, &JobContext::unbounded())
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            f.engine
                .analyze(lead.id, false, None, None, &JobContext::unbounded())
                .await
                .unwrap()
                .is_none()
        );
        let stored = f.store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(stored.analysis_count, 1);
    }

    #[tokio::test]
    async fn concurrent_running_analysis_is_a_no_op() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;

        // Occupy the running slot directly.
        let running = Analysis::begin(lead.id, lead.tenant.clone(), None, None);
        store.begin_analysis(running).await.unwrap();

        let f = engine_with(AnalyzerRegistry::new(), store);
        let outcome = f
            .engine
            .analyze(lead.id, true, None, None, &JobContext::unbounded())
            .await
            .unwrap();
        assert!(outcome.is_none());
    }

    #[tokio::test]
    async fn eshop_sentinel_sets_flag() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;

        let mut raw = serde_json::Map::new();
        raw.insert("isEshop".into(), serde_json::Value::Bool(true));
        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(
            StaticAnalyzer::universal(ESHOP_DETECTION_CATEGORY, 1)
                .with_outcome(AnalyzerOutcome::ok(5, vec![]).with_raw_data(raw)),
        ));
        let f = engine_with(registry, store);

        let analysis = f
            .engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();
        assert!(analysis.is_eshop);
    }

    #[tokio::test]
    async fn all_failed_analyzers_fail_the_analysis() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;
        let original_status = lead.status;

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(
            StaticAnalyzer::universal("seo", 10)
                .with_outcome(AnalyzerOutcome::failed("fetch refused")),
        ));
        let f = engine_with(registry, store);

        let analysis = f
            .engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Failed);

        // No snapshot for a failed analysis; lead status is restored.
        let snapshots = f
            .store
            .list_snapshots(&lead.id, PeriodType::Week, 10)
            .await
            .unwrap();
        assert!(snapshots.is_empty());
        let stored = f.store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(stored.status, original_status);
        assert_eq!(stored.analysis_count, 1);
    }

    #[tokio::test]
    async fn empty_selection_fails_the_analysis() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_tenant(Tenant::new("acme", "Acme").with_profile({
                let mut profile = DiscoveryProfile::new("mute", "serp");
                profile.disabled_categories.insert("seo".into());
                profile
            }))
            .await
            .unwrap();
        let lead = Lead::from_url("acme", "https://muted.test/")
            .unwrap()
            .with_industry("eshop")
            .with_profile("mute");
        store.insert_lead(lead.clone()).await.unwrap();
        let original_status = lead.status;

        // The profile disables the only registered category, so selection
        // comes back empty.
        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(StaticAnalyzer::universal("seo", 10).scoring(
            10,
            &[],
            Severity::Low,
        )));
        let f = engine_with(registry, store);

        let analysis = f
            .engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Failed);
        assert_eq!(analysis.total_score, 0);

        // No snapshot is written and the lead keeps its prior status.
        let snapshots = f
            .store
            .list_snapshots(&lead.id, PeriodType::Week, 10)
            .await
            .unwrap();
        assert!(snapshots.is_empty());
        let stored = f.store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(stored.status, original_status);
        assert_eq!(stored.analysis_count, 1);
    }

    #[tokio::test]
    async fn partial_failure_still_completes() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(StaticAnalyzer::universal("seo", 10).scoring(
            30,
            &[],
            Severity::Low,
        )));
        registry.register(Arc::new(
            StaticAnalyzer::universal("performance", 20)
                .with_outcome(AnalyzerOutcome::failed("timeout")),
        ));
        let f = engine_with(registry, store);

        let analysis = f
            .engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(analysis.status, AnalysisStatus::Completed);
        assert_eq!(analysis.total_score, 30);
    }

    #[tokio::test]
    async fn profile_ignore_codes_filter_issues() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_tenant(Tenant::new("acme", "Acme").with_profile({
                let mut profile = DiscoveryProfile::new("quiet", "serp");
                profile
                    .ignore_codes
                    .entry("seo".into())
                    .or_default()
                    .insert("noisy_code".into());
                profile
            }))
            .await
            .unwrap();
        let lead = Lead::from_url("acme", "https://site-b.test/")
            .unwrap()
            .with_industry("eshop")
            .with_profile("quiet");
        store.insert_lead(lead.clone()).await.unwrap();

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(StaticAnalyzer::universal("seo", 10).scoring(
            10,
            &["noisy_code", "real_code"],
            Severity::Medium,
        )));
        let f = engine_with(registry, store);

        let analysis = f
            .engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();
        let results = f.store.results_for(&analysis.id).await.unwrap();
        let codes: Vec<&str> = results[0].issues.iter().map(|i| i.code.as_str()).collect();
        assert_eq!(codes, vec!["real_code"]);
    }

    #[tokio::test]
    async fn status_mapping_uses_tenant_thresholds() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(StaticAnalyzer::universal("seo", 10).scoring(
            85,
            &[],
            Severity::Low,
        )));
        let f = engine_with(registry, store);

        f.engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();
        let stored = f.store.get_lead(&lead.id).await.unwrap().unwrap();
        assert_eq!(stored.status, LeadStatus::Qualified);
    }

    #[tokio::test]
    async fn screenshot_followup_is_enqueued() {
        let store = Arc::new(MemoryStore::new());
        let lead = seeded_lead(&store, "eshop").await;

        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(StaticAnalyzer::universal("seo", 10).scoring(
            10,
            &[],
            Severity::Low,
        )));
        let f = engine_with(registry, store);

        f.engine
            .analyze(lead.id, false, None, None, &JobContext::unbounded())
            .await
            .unwrap()
            .unwrap();

        let jobs = f.transport.list(QueueName::Low, 10).await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(
            jobs[0].kind().unwrap(),
            JobKind::TakeScreenshot { lead_id: lead.id }
        );
    }

    #[tokio::test]
    async fn unknown_lead_is_a_permanent_failure() {
        let store = Arc::new(MemoryStore::new());
        let f = engine_with(AnalyzerRegistry::new(), store);
        let err = f
            .engine
            .analyze(LeadId::new(), false, None, None, &JobContext::unbounded())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
        assert!(!err.is_retryable());
    }
}
