use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::issue::Issue;
use crate::types::{AnalysisId, LeadId, TenantId};

/// Lifecycle status of an analysis run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl AnalysisStatus {
    /// Whether the analysis still occupies the per-lead running slot.
    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Status of one per-category analyzer result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Running,
    Completed,
    Failed,
}

/// Issue-code movement between two consecutive analyses.
///
/// The code sets are the deduplicated union of issue codes across all
/// category results of each analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDelta {
    /// Codes present now but not in the previous analysis, sorted.
    pub added: Vec<String>,
    /// Codes present previously but resolved now, sorted.
    pub removed: Vec<String>,
    /// Number of codes present in both.
    pub unchanged_count: usize,
}

impl IssueDelta {
    /// Compute the delta between the previous and current code sets.
    #[must_use]
    pub fn between(previous: &BTreeSet<String>, current: &BTreeSet<String>) -> Self {
        Self {
            added: current.difference(previous).cloned().collect(),
            removed: previous.difference(current).cloned().collect(),
            unchanged_count: current.intersection(previous).count(),
        }
    }
}

/// One ordered multi-category assessment run on a lead.
///
/// `sequence_number` values form a contiguous 1..N chain per lead, each
/// linking to its predecessor through `previous_analysis`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    /// Unique analysis identifier.
    pub id: AnalysisId,

    /// The lead this analysis assesses.
    pub lead: LeadId,

    /// Owning tenant, denormalized for scoping queries.
    pub tenant: TenantId,

    /// Monotonic position within the lead's analysis chain, starting at 1.
    pub sequence_number: u32,

    /// The analysis with `sequence_number - 1`; `None` iff this is the first.
    #[serde(default)]
    pub previous_analysis: Option<AnalysisId>,

    /// Lifecycle status.
    pub status: AnalysisStatus,

    /// Sum of scores over completed category results.
    #[serde(default)]
    pub total_score: i32,

    /// Industry at the time the analysis was created.
    #[serde(default)]
    pub industry: Option<String>,

    /// Whether the eshop-detection analyzer flagged the target as a shop.
    #[serde(default)]
    pub is_eshop: bool,

    /// `total_score - previous.total_score`; `None` iff no previous.
    #[serde(default)]
    pub score_delta: Option<i32>,

    /// True iff `score_delta` is present and non-negative.
    #[serde(default)]
    pub is_improved: bool,

    /// Issue movement vs the previous analysis.
    #[serde(default)]
    pub issue_delta: Option<IssueDelta>,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run finished (completed or failed).
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl Analysis {
    /// Create a running analysis positioned after `previous`.
    #[must_use]
    pub fn begin(
        lead: LeadId,
        tenant: TenantId,
        previous: Option<&Analysis>,
        industry: Option<String>,
    ) -> Self {
        Self {
            id: AnalysisId::new(),
            lead,
            tenant,
            sequence_number: previous.map_or(0, |p| p.sequence_number) + 1,
            previous_analysis: previous.map(|p| p.id),
            status: AnalysisStatus::Running,
            total_score: 0,
            industry,
            is_eshop: false,
            score_delta: None,
            is_improved: false,
            issue_delta: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Finalize scores and deltas against the previous analysis.
    ///
    /// `completed` is false when every analyzer failed, in which case the
    /// analysis itself is marked failed.
    pub fn finalize(
        &mut self,
        completed: bool,
        total_score: i32,
        previous: Option<&Analysis>,
        previous_codes: Option<&BTreeSet<String>>,
        current_codes: &BTreeSet<String>,
    ) {
        self.total_score = total_score;
        self.status = if completed {
            AnalysisStatus::Completed
        } else {
            AnalysisStatus::Failed
        };
        self.score_delta = previous.map(|p| total_score - p.total_score);
        self.is_improved = self.score_delta.is_some_and(|d| d >= 0);
        self.issue_delta = previous_codes.map(|prev| IssueDelta::between(prev, current_codes));
        self.finished_at = Some(Utc::now());
    }
}

/// The per-category output of one analyzer for one analysis.
///
/// Unique on `(analysis, category)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Owning analysis.
    pub analysis: AnalysisId,

    /// Analyzer category that produced this result.
    pub category: String,

    /// Result lifecycle status.
    pub status: ResultStatus,

    /// Opaque analyzer output (metrics, detected features).
    #[serde(default)]
    pub raw_data: serde_json::Map<String, serde_json::Value>,

    /// Issues found, already filtered through the profile's ignore list.
    #[serde(default)]
    pub issues: Vec<Issue>,

    /// Category score contributed to the analysis total when completed.
    #[serde(default)]
    pub score: i32,

    /// Failure detail when `status` is failed.
    #[serde(default)]
    pub error_message: Option<String>,
}

impl AnalysisResult {
    /// Create a running result row for a category.
    #[must_use]
    pub fn begin(analysis: AnalysisId, category: impl Into<String>) -> Self {
        Self {
            analysis,
            category: category.into(),
            status: ResultStatus::Running,
            raw_data: serde_json::Map::new(),
            issues: Vec::new(),
            score: 0,
            error_message: None,
        }
    }

    /// Number of issues at or above the given severity.
    #[must_use]
    pub fn issues_at_least(&self, severity: crate::issue::Severity) -> usize {
        self.issues.iter().filter(|i| i.severity >= severity).count()
    }
}
