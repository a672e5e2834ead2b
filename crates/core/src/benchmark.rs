use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Score percentiles over the analyses aggregated into a benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Percentiles {
    pub p10: i32,
    pub p25: i32,
    pub p50: i32,
    pub p75: i32,
    pub p90: i32,
}

/// One issue code with its occurrence statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopIssue {
    /// Issue code.
    pub code: String,
    /// Number of analyses in which the code appeared.
    pub count: usize,
    /// `count / sample_size` as a percentage.
    pub percentage: f64,
}

/// A cross-lead aggregate per `(tenant, industry, period)` enabling
/// percentile ranking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Benchmark {
    /// Owning tenant.
    pub tenant: TenantId,

    /// Industry the aggregated leads belong to.
    pub industry: String,

    /// Start of the aggregation period (midnight UTC).
    pub period_start: DateTime<Utc>,

    /// Mean total score.
    pub avg_score: f64,

    /// 50th percentile of total scores.
    pub median_score: i32,

    /// Score percentiles; `None` when no analyses were in scope.
    #[serde(default)]
    pub percentiles: Option<Percentiles>,

    /// Mean score per category.
    #[serde(default)]
    pub avg_category_scores: BTreeMap<String, f64>,

    /// Most common issue codes, most frequent first.
    #[serde(default)]
    pub top_issues: Vec<TopIssue>,

    /// Number of analyses aggregated.
    pub sample_size: usize,

    /// When the benchmark was computed.
    pub created_at: DateTime<Utc>,
}

/// One analysis reduced to the fields benchmark aggregation needs.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkSample {
    /// Total score of the analysis.
    pub total_score: i32,
    /// Per-category scores.
    pub category_scores: BTreeMap<String, i32>,
    /// Issue codes across all results (duplicates tolerated; counted once
    /// per analysis).
    pub issue_codes: Vec<String>,
}

/// Where a score lands relative to a benchmark's percentiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PercentileRank {
    Top10,
    Top25,
    AboveAverage,
    BelowAverage,
    Bottom25,
    Unknown,
}

impl PercentileRank {
    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Top10 => "top10",
            Self::Top25 => "top25",
            Self::AboveAverage => "above_average",
            Self::BelowAverage => "below_average",
            Self::Bottom25 => "bottom25",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for PercentileRank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Nearest-rank percentile over a sorted slice.
fn nearest_rank(sorted: &[i32], percentile: usize) -> i32 {
    debug_assert!(!sorted.is_empty());
    let rank = (percentile * sorted.len()).div_ceil(100).max(1);
    sorted[rank - 1]
}

/// Compute a benchmark over the given analysis samples.
///
/// Returns a benchmark with `sample_size = 0` and no percentiles when
/// `samples` is empty; percentile ranking against such a benchmark yields
/// [`PercentileRank::Unknown`].
#[must_use]
pub fn compute_benchmark(
    tenant: TenantId,
    industry: impl Into<String>,
    period_start: DateTime<Utc>,
    samples: &[BenchmarkSample],
    top_n: usize,
) -> Benchmark {
    let sample_size = samples.len();

    if sample_size == 0 {
        return Benchmark {
            tenant,
            industry: industry.into(),
            period_start,
            avg_score: 0.0,
            median_score: 0,
            percentiles: None,
            avg_category_scores: BTreeMap::new(),
            top_issues: Vec::new(),
            sample_size: 0,
            created_at: Utc::now(),
        };
    }

    let mut scores: Vec<i32> = samples.iter().map(|s| s.total_score).collect();
    scores.sort_unstable();

    #[allow(clippy::cast_precision_loss)]
    let avg_score = f64::from(scores.iter().sum::<i32>()) / sample_size as f64;

    let percentiles = Percentiles {
        p10: nearest_rank(&scores, 10),
        p25: nearest_rank(&scores, 25),
        p50: nearest_rank(&scores, 50),
        p75: nearest_rank(&scores, 75),
        p90: nearest_rank(&scores, 90),
    };

    // Mean per category over the samples carrying that category.
    let mut category_sums: BTreeMap<String, (i64, usize)> = BTreeMap::new();
    for sample in samples {
        for (category, score) in &sample.category_scores {
            let entry = category_sums.entry(category.clone()).or_insert((0, 0));
            entry.0 += i64::from(*score);
            entry.1 += 1;
        }
    }
    #[allow(clippy::cast_precision_loss)]
    let avg_category_scores = category_sums
        .into_iter()
        .map(|(category, (sum, count))| (category, sum as f64 / count as f64))
        .collect();

    // Count each code once per analysis.
    let mut occurrences: BTreeMap<String, usize> = BTreeMap::new();
    for sample in samples {
        let unique: BTreeSet<&String> = sample.issue_codes.iter().collect();
        for code in unique {
            *occurrences.entry(code.clone()).or_insert(0) += 1;
        }
    }
    let mut top_issues: Vec<TopIssue> = occurrences
        .into_iter()
        .map(|(code, count)| {
            #[allow(clippy::cast_precision_loss)]
            let percentage = count as f64 / sample_size as f64 * 100.0;
            TopIssue {
                code,
                count,
                percentage,
            }
        })
        .collect();
    top_issues.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.code.cmp(&b.code)));
    top_issues.truncate(top_n);

    Benchmark {
        tenant,
        industry: industry.into(),
        period_start,
        avg_score,
        median_score: percentiles.p50,
        percentiles: Some(percentiles),
        avg_category_scores,
        top_issues,
        sample_size,
        created_at: Utc::now(),
    }
}

/// Rank a score against a benchmark's percentiles.
///
/// Returns [`PercentileRank::Unknown`] iff the benchmark carries no
/// percentiles; otherwise always one of the five bands.
#[must_use]
pub fn percentile_rank(score: i32, benchmark: &Benchmark) -> PercentileRank {
    let Some(p) = benchmark.percentiles else {
        return PercentileRank::Unknown;
    };
    if score >= p.p90 {
        PercentileRank::Top10
    } else if score >= p.p75 {
        PercentileRank::Top25
    } else if score >= p.p50 {
        PercentileRank::AboveAverage
    } else if score >= p.p25 {
        PercentileRank::BelowAverage
    } else {
        PercentileRank::Bottom25
    }
}
