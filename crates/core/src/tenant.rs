use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::DiscoveryProfile;
use crate::scoring::ScoringThresholds;
use crate::snapshot::PeriodType;
use crate::types::TenantId;

/// Role tags attached to a tenant account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TenantRole {
    Admin,
    SuperAdmin,
    SubAccount,
}

/// Per-tenant sending budgets. A missing limit means "unlimited".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitSettings {
    /// Maximum offers sent per UTC calendar day.
    #[serde(default)]
    pub daily_max: Option<u32>,

    /// Maximum offers sent per clock hour.
    #[serde(default)]
    pub hourly_max: Option<u32>,

    /// Maximum offers sent per recipient domain per UTC calendar day.
    #[serde(default)]
    pub domain_daily_max: Option<u32>,
}

/// An account unit that owns leads and receives rate-limited sending budgets.
///
/// The root of all ownership: every lead, analysis, proposal, and offer is
/// checked against the acting tenant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    /// Unique user code identifying this tenant.
    pub user_code: TenantId,

    /// Display name.
    pub name: String,

    /// Default industry for leads discovered by this tenant.
    #[serde(default)]
    pub industry: Option<String>,

    /// Domains this tenant never wants discovered or contacted.
    #[serde(default)]
    pub excluded_domains: BTreeSet<String>,

    /// Sending budgets enforced by the offer send gate.
    #[serde(default)]
    pub rate_limits: RateLimitSettings,

    /// Default snapshot period for this tenant's leads. Falls back to the
    /// industry default when unset.
    #[serde(default)]
    pub snapshot_period: Option<PeriodType>,

    /// Thresholds driving the analysis-to-lead-status mapping.
    #[serde(default)]
    pub scoring: ScoringThresholds,

    /// Discovery profiles owned by this tenant, keyed by profile name.
    #[serde(default)]
    pub profiles: BTreeMap<String, DiscoveryProfile>,

    /// Parent account for sub-accounts; `None` for top-level tenants.
    #[serde(default)]
    pub parent_tenant: Option<TenantId>,

    /// Role tags.
    #[serde(default)]
    pub roles: BTreeSet<TenantRole>,

    /// When the tenant was created.
    pub created_at: DateTime<Utc>,
}

impl Tenant {
    /// Create a tenant with default settings.
    #[must_use]
    pub fn new(user_code: impl Into<TenantId>, name: impl Into<String>) -> Self {
        Self {
            user_code: user_code.into(),
            name: name.into(),
            industry: None,
            excluded_domains: BTreeSet::new(),
            rate_limits: RateLimitSettings::default(),
            snapshot_period: None,
            scoring: ScoringThresholds::default(),
            profiles: BTreeMap::new(),
            parent_tenant: None,
            roles: BTreeSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Set the tenant industry.
    #[must_use]
    pub fn with_industry(mut self, industry: impl Into<String>) -> Self {
        self.industry = Some(industry.into());
        self
    }

    /// Set the sending budgets.
    #[must_use]
    pub fn with_rate_limits(mut self, limits: RateLimitSettings) -> Self {
        self.rate_limits = limits;
        self
    }

    /// Attach a discovery profile under its name.
    #[must_use]
    pub fn with_profile(mut self, profile: DiscoveryProfile) -> Self {
        self.profiles.insert(profile.name.clone(), profile);
        self
    }

    /// Whether the given domain is excluded from discovery and sending.
    #[must_use]
    pub fn is_domain_excluded(&self, domain: &str) -> bool {
        self.excluded_domains.contains(&domain.to_ascii_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_tenant_defaults() {
        let t = Tenant::new("acme", "Acme s.r.o.");
        assert_eq!(t.user_code.as_str(), "acme");
        assert!(t.rate_limits.daily_max.is_none());
        assert!(t.profiles.is_empty());
        assert!(t.parent_tenant.is_none());
    }

    #[test]
    fn excluded_domain_check_is_case_insensitive() {
        let mut t = Tenant::new("acme", "Acme");
        t.excluded_domains.insert("blocked.example".into());
        assert!(t.is_domain_excluded("Blocked.Example"));
        assert!(!t.is_domain_excluded("fine.example"));
    }

    #[test]
    fn rate_limits_deserialize_with_defaults() {
        let limits: RateLimitSettings = serde_json::from_str(r#"{"daily_max": 50}"#).unwrap();
        assert_eq!(limits.daily_max, Some(50));
        assert!(limits.hourly_max.is_none());
        assert!(limits.domain_daily_max.is_none());
    }

    #[test]
    fn tenant_serde_roundtrip() {
        let t = Tenant::new("acme", "Acme").with_industry("eshop");
        let json = serde_json::to_string(&t).unwrap();
        let back: Tenant = serde_json::from_str(&json).unwrap();
        assert_eq!(back.user_code, t.user_code);
        assert_eq!(back.industry.as_deref(), Some("eshop"));
    }
}
