use std::sync::Arc;

use leadflow_core::DiscoveryProfile;

use crate::analyzer::{Analyzer, AnalyzerRegistry};

/// Select and order the analyzers to run for a lead.
///
/// Starting from the full registry: profile-disabled categories are
/// dropped, then an analyzer survives iff it is universal or matches the
/// lead's industry (no industry keeps only universal analyzers). Ordering
/// is by effective priority -- a profile override beats the analyzer
/// default -- with the category as tiebreak for determinism.
#[must_use]
pub fn select_analyzers(
    registry: &AnalyzerRegistry,
    industry: Option<&str>,
    profile: Option<&DiscoveryProfile>,
) -> Vec<Arc<dyn Analyzer>> {
    let mut selected: Vec<Arc<dyn Analyzer>> = registry
        .all()
        .filter(|analyzer| {
            !profile.is_some_and(|p| p.is_category_disabled(analyzer.category()))
        })
        .filter(|analyzer| {
            analyzer.is_universal() || industry.is_some_and(|i| analyzer.industry() == Some(i))
        })
        .map(Arc::clone)
        .collect();

    selected.sort_by(|a, b| {
        let pa = effective_priority(a.as_ref(), profile);
        let pb = effective_priority(b.as_ref(), profile);
        pa.cmp(&pb).then_with(|| a.category().cmp(b.category()))
    });
    selected
}

fn effective_priority(analyzer: &dyn Analyzer, profile: Option<&DiscoveryProfile>) -> i32 {
    profile
        .and_then(|p| p.priority_override(analyzer.category()))
        .unwrap_or_else(|| analyzer.priority())
}
