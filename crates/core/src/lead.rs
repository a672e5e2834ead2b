use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::CoreError;
use crate::snapshot::PeriodType;
use crate::types::{AnalysisId, LeadId, TenantId};

/// Tracking parameters stripped by [`canonicalize_url`]. The set is fixed:
/// stripping must be deterministic so that `(tenant, domain)` dedup and
/// re-analysis always see the same stored URL.
const TRACKING_PARAMS: [&str; 8] = [
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "gclid",
    "fbclid",
    "msclkid",
];

/// Qualification status of a lead as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Freshly discovered, not yet analyzed.
    New,
    /// An analysis is in flight.
    Analyzing,
    /// Scored above the tenant's qualification threshold.
    Qualified,
    /// Scored in the promising band; worth a follow-up analysis.
    Promising,
    /// Scored below threshold or disqualified by critical issues.
    Unqualified,
    /// An offer has been sent.
    Contacted,
    /// The recipient replied.
    Responded,
    /// The lead converted to a customer.
    Converted,
}

impl LeadStatus {
    /// Stable string form used in logs and API payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Analyzing => "analyzing",
            Self::Qualified => "qualified",
            Self::Promising => "promising",
            Self::Unqualified => "unqualified",
            Self::Contacted => "contacted",
            Self::Responded => "responded",
            Self::Converted => "converted",
        }
    }
}

impl std::fmt::Display for LeadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A URL reduced to its canonical stored form plus the owning domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CanonicalUrl {
    /// The canonicalized URL (tracking parameters stripped, host lowercased,
    /// path and fragment preserved).
    pub url: String,
    /// Lowercased host, used as the lead's dedup key within a tenant.
    pub domain: String,
}

/// Canonicalize a target URL.
///
/// Strips exactly the tracking parameters in [`TRACKING_PARAMS`], preserves
/// every other query parameter, the path, and the fragment. The operation is
/// idempotent: canonicalizing an already-canonical URL returns it unchanged.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] when the input does not parse as an
/// absolute `http`/`https` URL with a host.
pub fn canonicalize_url(raw: &str) -> Result<CanonicalUrl, CoreError> {
    let mut url = Url::parse(raw.trim())
        .map_err(|e| CoreError::InvalidInput(format!("unparseable url {raw:?}: {e}")))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(CoreError::InvalidInput(format!(
            "unsupported url scheme {:?}",
            url.scheme()
        )));
    }

    let domain = url
        .host_str()
        .ok_or_else(|| CoreError::InvalidInput(format!("url has no host: {raw:?}")))?
        .to_ascii_lowercase();

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.as_ref()))
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    if kept.is_empty() {
        url.set_query(None);
    } else {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (key, value) in &kept {
            pairs.append_pair(key, value);
        }
        drop(pairs);
    }

    Ok(CanonicalUrl {
        url: url.to_string(),
        domain,
    })
}

/// A target entity (a domain or business) tracked through the pipeline.
///
/// Unique on `(tenant, domain)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Unique lead identifier.
    pub id: LeadId,

    /// Owning tenant.
    pub tenant: TenantId,

    /// Lowercased host of the lead's URL; dedup key within the tenant.
    pub domain: String,

    /// Canonicalized target URL.
    pub url: String,

    /// Qualification status.
    pub status: LeadStatus,

    /// Industry classification. Backfilled from the first analysis that
    /// supplies one.
    #[serde(default)]
    pub industry: Option<String>,

    /// Weak link to the newest analysis.
    #[serde(default)]
    pub latest_analysis: Option<AnalysisId>,

    /// Number of persisted analyses; incremented exactly once per run.
    #[serde(default)]
    pub analysis_count: u32,

    /// When the latest analysis finished.
    #[serde(default)]
    pub analyzed_at: Option<DateTime<Utc>>,

    /// Per-lead snapshot period override. When `None`, the tenant or
    /// industry default applies.
    #[serde(default)]
    pub snapshot_period: Option<PeriodType>,

    /// Name of the discovery profile attached to this lead, if any.
    #[serde(default)]
    pub profile: Option<String>,

    /// Result of the last TLS probe; `None` until the first `check_ssl`
    /// pass touches the lead.
    #[serde(default)]
    pub ssl_valid: Option<bool>,

    /// When the lead was created.
    pub created_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new lead from a raw URL, canonicalizing it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] when the URL does not
    /// canonicalize.
    pub fn from_url(tenant: impl Into<TenantId>, raw_url: &str) -> Result<Self, CoreError> {
        let canonical = canonicalize_url(raw_url)?;
        Ok(Self {
            id: LeadId::new(),
            tenant: tenant.into(),
            domain: canonical.domain,
            url: canonical.url,
            status: LeadStatus::New,
            industry: None,
            latest_analysis: None,
            analysis_count: 0,
            analyzed_at: None,
            snapshot_period: None,
            profile: None,
            ssl_valid: None,
            created_at: Utc::now(),
        })
    }

    /// Set the industry.
    #[must_use]
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Attach a discovery profile by name.
    #[must_use]
    pub fn with_profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self
    }
}
