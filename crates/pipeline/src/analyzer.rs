use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use leadflow_core::{Issue, Lead};

/// Category of the analyzer whose `raw_data.isEshop` flag is copied onto
/// the analysis.
pub const ESHOP_DETECTION_CATEGORY: &str = "eshop_detection";

/// Output of one analyzer invocation.
#[derive(Debug, Clone, Default)]
pub struct AnalyzerOutcome {
    /// Whether the analyzer ran to completion.
    pub success: bool,
    /// Issues found.
    pub issues: Vec<Issue>,
    /// Opaque analyzer output persisted on the result row.
    pub raw_data: serde_json::Map<String, serde_json::Value>,
    /// Category score.
    pub score: i32,
    /// Failure detail when `success` is false.
    pub error_message: Option<String>,
}

impl AnalyzerOutcome {
    /// A successful outcome.
    #[must_use]
    pub fn ok(score: i32, issues: Vec<Issue>) -> Self {
        Self {
            success: true,
            issues,
            raw_data: serde_json::Map::new(),
            score,
            error_message: None,
        }
    }

    /// A failed outcome.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            issues: Vec::new(),
            raw_data: serde_json::Map::new(),
            score: 0,
            error_message: Some(message.into()),
        }
    }

    /// Attach raw data.
    #[must_use]
    pub fn with_raw_data(mut self, raw_data: serde_json::Map<String, serde_json::Value>) -> Self {
        self.raw_data = raw_data;
        self
    }
}

/// A stateless unit that inspects a lead and emits issues plus a score in
/// its category.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Unique category this analyzer owns.
    fn category(&self) -> &str;

    /// Execution priority; lower runs first.
    fn priority(&self) -> i32;

    /// Whether the analyzer applies regardless of industry.
    fn is_universal(&self) -> bool;

    /// The single industry a non-universal analyzer applies to.
    fn industry(&self) -> Option<&str> {
        None
    }

    /// Whether this analyzer covers the given category.
    fn supports(&self, category: &str) -> bool {
        self.category() == category
    }

    /// Inspect the lead. Outbound I/O is bounded by the engine's
    /// per-analyzer deadline.
    async fn analyze(&self, lead: &Lead) -> AnalyzerOutcome;
}

/// Registry of analyzers keyed by category.
///
/// Selection is a table scan with filters rather than dynamic dispatch over
/// a type hierarchy.
#[derive(Default)]
pub struct AnalyzerRegistry {
    analyzers: BTreeMap<String, Arc<dyn Analyzer>>,
}

impl AnalyzerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an analyzer under its category, replacing any previous one.
    pub fn register(&mut self, analyzer: Arc<dyn Analyzer>) {
        self.analyzers
            .insert(analyzer.category().to_owned(), analyzer);
    }

    /// Look up by category.
    #[must_use]
    pub fn get(&self, category: &str) -> Option<Arc<dyn Analyzer>> {
        self.analyzers.get(category).cloned()
    }

    /// All analyzers in category order.
    pub fn all(&self) -> impl Iterator<Item = &Arc<dyn Analyzer>> {
        self.analyzers.values()
    }

    /// Number of registered analyzers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.analyzers.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.analyzers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StaticAnalyzer;

    #[test]
    fn register_replaces_same_category() {
        let mut registry = AnalyzerRegistry::new();
        registry.register(Arc::new(StaticAnalyzer::universal("seo", 10)));
        registry.register(Arc::new(StaticAnalyzer::universal("seo", 99)));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("seo").unwrap().priority(), 99);
    }

    #[test]
    fn supports_defaults_to_category_match() {
        let analyzer = StaticAnalyzer::universal("performance", 10);
        assert!(analyzer.supports("performance"));
        assert!(!analyzer.supports("seo"));
    }

    #[test]
    fn outcome_helpers() {
        let ok = AnalyzerOutcome::ok(12, vec![]);
        assert!(ok.success);
        assert_eq!(ok.score, 12);

        let failed = AnalyzerOutcome::failed("fetch timed out");
        assert!(!failed.success);
        assert_eq!(failed.error_message.as_deref(), Some("fetch timed out"));
    }
}
