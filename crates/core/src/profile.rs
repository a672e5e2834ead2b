use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// A tenant-owned configuration selecting the source, queries, analyzers,
/// and ignored issue codes for a batch of discoveries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryProfile {
    /// Profile name, unique within the tenant.
    pub name: String,

    /// Lead source identifier (e.g. a search backend name).
    pub source: String,

    /// Search queries run against the source.
    #[serde(default)]
    pub queries: Vec<String>,

    /// Maximum number of leads one discovery run may create.
    #[serde(default = "default_limit")]
    pub limit: u32,

    /// Industry assigned to discovered leads.
    #[serde(default)]
    pub industry: Option<String>,

    /// Analyzer categories disabled for leads carrying this profile.
    #[serde(default)]
    pub disabled_categories: BTreeSet<String>,

    /// Per-category analyzer priority overrides; lower runs first.
    #[serde(default)]
    pub priority_overrides: BTreeMap<String, i32>,

    /// Issue codes dropped from results, per category.
    #[serde(default)]
    pub ignore_codes: BTreeMap<String, BTreeSet<String>>,

    /// Cron expression for batch discovery; `None` disables scheduling.
    #[serde(default)]
    pub schedule: Option<String>,
}

fn default_limit() -> u32 {
    25
}

impl DiscoveryProfile {
    /// Create a profile with default limits and no overrides.
    #[must_use]
    pub fn new(name: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            queries: Vec::new(),
            limit: default_limit(),
            industry: None,
            disabled_categories: BTreeSet::new(),
            priority_overrides: BTreeMap::new(),
            ignore_codes: BTreeMap::new(),
            schedule: None,
        }
    }

    /// Whether the category is disabled by this profile.
    #[must_use]
    pub fn is_category_disabled(&self, category: &str) -> bool {
        self.disabled_categories.contains(category)
    }

    /// Priority override for a category, if any.
    #[must_use]
    pub fn priority_override(&self, category: &str) -> Option<i32> {
        self.priority_overrides.get(category).copied()
    }

    /// Whether an issue code should be dropped for a category.
    #[must_use]
    pub fn ignores(&self, category: &str, code: &str) -> bool {
        self.ignore_codes
            .get(category)
            .is_some_and(|codes| codes.contains(code))
    }
}
