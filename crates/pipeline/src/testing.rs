//! Test analyzers with canned outcomes.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;

use leadflow_core::{Issue, Lead, Severity};

use crate::analyzer::{Analyzer, AnalyzerOutcome};

/// An analyzer returning a fixed outcome, for engine and selection tests.
pub struct StaticAnalyzer {
    category: String,
    priority: i32,
    universal: bool,
    industry: Option<String>,
    outcome: AnalyzerOutcome,
    invocations: Arc<AtomicUsize>,
}

impl StaticAnalyzer {
    /// A universal analyzer scoring `priority` order with an empty outcome.
    #[must_use]
    pub fn universal(category: &str, priority: i32) -> Self {
        Self {
            category: category.to_owned(),
            priority,
            universal: true,
            industry: None,
            outcome: AnalyzerOutcome::ok(0, Vec::new()),
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// An industry-specific analyzer.
    #[must_use]
    pub fn for_industry(category: &str, priority: i32, industry: &str) -> Self {
        Self {
            category: category.to_owned(),
            priority,
            universal: false,
            industry: Some(industry.to_owned()),
            outcome: AnalyzerOutcome::ok(0, Vec::new()),
            invocations: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Set the returned outcome.
    #[must_use]
    pub fn with_outcome(mut self, outcome: AnalyzerOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    /// Convenience: a successful outcome with the given score and issue
    /// codes at the given severity.
    #[must_use]
    pub fn scoring(self, score: i32, codes: &[&str], severity: Severity) -> Self {
        let issues = codes
            .iter()
            .map(|code| Issue::new(*code, severity))
            .collect();
        self.with_outcome(AnalyzerOutcome::ok(score, issues))
    }

    /// Shared invocation counter.
    #[must_use]
    pub fn invocations(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.invocations)
    }
}

#[async_trait]
impl Analyzer for StaticAnalyzer {
    fn category(&self) -> &str {
        &self.category
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn is_universal(&self) -> bool {
        self.universal
    }

    fn industry(&self) -> Option<&str> {
        self.industry.as_deref()
    }

    async fn analyze(&self, _lead: &Lead) -> AnalyzerOutcome {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.outcome.clone()
    }
}
