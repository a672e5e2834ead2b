use std::collections::BTreeMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{LeadId, TenantId};

/// Aggregation period for snapshots and benchmarks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeriodType {
    Day,
    Week,
    Month,
}

impl PeriodType {
    /// Default period for an industry when neither the lead nor the tenant
    /// overrides it: fast-moving industries trend daily, everything else
    /// weekly.
    #[must_use]
    pub fn industry_default(industry: Option<&str>) -> Self {
        match industry {
            Some("news" | "media") => Self::Day,
            _ => Self::Week,
        }
    }

    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
        }
    }
}

impl std::fmt::Display for PeriodType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PeriodType {
    type Err = crate::error::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "day" => Ok(Self::Day),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(crate::error::CoreError::InvalidInput(format!(
                "unknown period type {other:?}"
            ))),
        }
    }
}

/// Start of the period containing `at`.
///
/// Boundaries: `day` is the UTC calendar day, `week` is the ISO week's
/// Monday, `month` is the first of the month, all at midnight UTC.
#[must_use]
pub fn period_start(period: PeriodType, at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at.date_naive();
    let start: NaiveDate = match period {
        PeriodType::Day => date,
        PeriodType::Week => {
            date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
        }
        PeriodType::Month => date.with_day(1).expect("day 1 is valid for every month"),
    };
    start
        .and_hms_opt(0, 0, 0)
        .expect("midnight is a valid time")
        .and_utc()
}

/// A periodic aggregate of an analysis for trending.
///
/// Unique on `(lead, period_type, period_start)`; re-analysis within the
/// same period replaces the row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// The lead this snapshot aggregates.
    pub lead: LeadId,

    /// Owning tenant, denormalized for scoping.
    pub tenant: TenantId,

    /// Period granularity.
    pub period_type: PeriodType,

    /// Start of the period (midnight UTC).
    pub period_start: DateTime<Utc>,

    /// Total score of the analysis that produced this snapshot.
    pub total_score: i32,

    /// Per-category scores.
    #[serde(default)]
    pub category_scores: BTreeMap<String, i32>,

    /// Total number of issues across all categories.
    pub issue_count: usize,

    /// Number of critical issues.
    pub critical_issue_count: usize,

    /// Most frequent issue codes, best first.
    #[serde(default)]
    pub top_issues: Vec<String>,

    /// Score delta of the underlying analysis.
    #[serde(default)]
    pub score_delta: Option<i32>,

    /// When the snapshot was (re)written.
    pub created_at: DateTime<Utc>,
}
