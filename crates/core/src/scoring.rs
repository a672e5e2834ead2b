use serde::{Deserialize, Serialize};

use crate::lead::LeadStatus;

/// Tenant-configured thresholds for mapping an analysis outcome onto a lead
/// qualification status.
///
/// These are configuration, not code: the mapper never hardcodes numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoringThresholds {
    /// Minimum total score for [`LeadStatus::Qualified`].
    #[serde(default = "default_qualified_min")]
    pub qualified_min_score: i32,

    /// Minimum total score for [`LeadStatus::Promising`].
    #[serde(default = "default_promising_min")]
    pub promising_min_score: i32,

    /// More critical issues than this disqualifies the lead regardless of
    /// score.
    #[serde(default = "default_max_critical")]
    pub max_critical_issues: usize,

    /// When set, only detected e-shops can qualify.
    #[serde(default)]
    pub require_eshop: bool,
}

fn default_qualified_min() -> i32 {
    70
}

fn default_promising_min() -> i32 {
    40
}

fn default_max_critical() -> usize {
    3
}

impl Default for ScoringThresholds {
    fn default() -> Self {
        Self {
            qualified_min_score: default_qualified_min(),
            promising_min_score: default_promising_min(),
            max_critical_issues: default_max_critical(),
            require_eshop: false,
        }
    }
}

/// Map a completed analysis onto a lead qualification status.
///
/// Pure and deterministic in `(total_score, critical_issue_count, is_eshop)`
/// and the tenant's thresholds.
#[must_use]
pub fn map_lead_status(
    total_score: i32,
    critical_issue_count: usize,
    is_eshop: bool,
    thresholds: &ScoringThresholds,
) -> LeadStatus {
    if thresholds.require_eshop && !is_eshop {
        return LeadStatus::Unqualified;
    }
    if critical_issue_count > thresholds.max_critical_issues {
        return LeadStatus::Unqualified;
    }
    if total_score >= thresholds.qualified_min_score {
        LeadStatus::Qualified
    } else if total_score >= thresholds.promising_min_score {
        LeadStatus::Promising
    } else {
        LeadStatus::Unqualified
    }
}
