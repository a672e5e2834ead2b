use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use tracing::{debug, info};

use leadflow_core::{
    BenchmarkSample, CoreError, JobContext, JobKind, PeriodType, ResultStatus, compute_benchmark,
    period_start,
};
use leadflow_dispatcher::JobHandler;
use leadflow_state::{
    AnalysisStore as _, BenchmarkStore as _, LeadStore as _, Store, TenantStore as _,
};

/// Tuning knobs for benchmark aggregation.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
    /// How far back analyses are aggregated.
    pub window_days: i64,
    /// Number of top issues kept per benchmark.
    pub top_issues: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            window_days: 90,
            top_issues: 10,
        }
    }
}

/// Periodic aggregation of completed analyses into per-`(tenant, industry,
/// period)` benchmarks.
pub struct BenchmarkService {
    store: Arc<dyn Store>,
    config: BenchmarkConfig,
}

impl BenchmarkService {
    /// Wire the service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: BenchmarkConfig) -> Self {
        Self { store, config }
    }

    /// Recompute benchmarks for every tenant, optionally restricted to one
    /// industry. Returns the number of benchmarks written.
    ///
    /// Idempotent per `(tenant, industry, period)`: recomputation replaces
    /// the existing row.
    pub async fn calculate(&self, industry_filter: Option<&str>) -> Result<usize, CoreError> {
        let now = Utc::now();
        let since = now - Duration::days(self.config.window_days);
        let period = period_start(PeriodType::Week, now);

        let tenants = self.store.list_tenants().await.map_err(store_err)?;
        let mut written = 0;

        for tenant in tenants {
            let mut industries: BTreeSet<String> = BTreeSet::new();
            if let Some(industry) = &tenant.industry {
                industries.insert(industry.clone());
            }
            for lead in self
                .store
                .list_leads(&tenant.user_code)
                .await
                .map_err(store_err)?
            {
                if let Some(industry) = lead.industry {
                    industries.insert(industry);
                }
            }

            for industry in industries {
                if industry_filter.is_some_and(|filter| filter != industry) {
                    continue;
                }
                let analyses = self
                    .store
                    .completed_analyses_in_scope(&tenant.user_code, &industry, since)
                    .await
                    .map_err(store_err)?;
                if analyses.is_empty() {
                    debug!(tenant = %tenant.user_code, industry = %industry, "no analyses in scope");
                    continue;
                }

                let mut samples = Vec::with_capacity(analyses.len());
                for analysis in &analyses {
                    let results = self
                        .store
                        .results_for(&analysis.id)
                        .await
                        .map_err(store_err)?;
                    samples.push(BenchmarkSample {
                        total_score: analysis.total_score,
                        category_scores: results
                            .iter()
                            .filter(|r| r.status == ResultStatus::Completed)
                            .map(|r| (r.category.clone(), r.score))
                            .collect(),
                        issue_codes: results
                            .iter()
                            .flat_map(|r| r.issues.iter().map(|i| i.code.clone()))
                            .collect(),
                    });
                }

                let benchmark = compute_benchmark(
                    tenant.user_code.clone(),
                    industry.clone(),
                    period,
                    &samples,
                    self.config.top_issues,
                );
                info!(
                    tenant = %tenant.user_code,
                    industry = %industry,
                    sample_size = benchmark.sample_size,
                    avg_score = benchmark.avg_score,
                    "benchmark computed"
                );
                self.store
                    .upsert_benchmark(benchmark)
                    .await
                    .map_err(store_err)?;
                written += 1;
            }
        }
        Ok(written)
    }
}

fn store_err(e: leadflow_state::StateError) -> CoreError {
    CoreError::UpstreamUnavailable(e.to_string())
}

/// Handler for `calculate_benchmarks` jobs.
pub struct CalculateBenchmarksHandler {
    service: Arc<BenchmarkService>,
}

impl CalculateBenchmarksHandler {
    /// Wrap the service as a job handler.
    #[must_use]
    pub fn new(service: Arc<BenchmarkService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl JobHandler for CalculateBenchmarksHandler {
    fn kind(&self) -> &'static str {
        "calculate_benchmarks"
    }

    async fn handle(&self, job: JobKind, ctx: &JobContext) -> Result<(), CoreError> {
        let JobKind::CalculateBenchmarks { industry } = job else {
            return Err(CoreError::PermanentFailure(format!(
                "calculate_benchmarks handler received {} job",
                job.kind()
            )));
        };
        ctx.checkpoint()?;
        self.service.calculate(industry.as_deref()).await?;
        Ok(())
    }
}
