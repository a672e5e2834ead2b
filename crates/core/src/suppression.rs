use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::TenantId;

/// Why a recipient was suppressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    HardBounce,
    Complaint,
    Unsubscribe,
    SoftBounce,
    Manual,
}

impl SuppressionReason {
    /// Hard bounces and complaints block the address for every tenant;
    /// unsubscribes and soft bounces only for the tenant that triggered them.
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::HardBounce | Self::Complaint)
    }

    /// Stable string form.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HardBounce => "hard_bounce",
            Self::Complaint => "complaint",
            Self::Unsubscribe => "unsubscribe",
            Self::SoftBounce => "soft_bounce",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalize an email address for suppression storage and lookup.
///
/// Trims surrounding whitespace and lowercases the domain part; the local
/// part keeps its case. Membership tests compare the fully lowercased form,
/// so lookups are case-insensitive while the stored address stays readable.
#[must_use]
pub fn normalize_email(raw: &str) -> String {
    let trimmed = raw.trim();
    match trimmed.rsplit_once('@') {
        Some((local, domain)) => format!("{local}@{}", domain.to_ascii_lowercase()),
        None => trimmed.to_owned(),
    }
}

/// A recorded refusal to send to an address.
///
/// Keyed on `(email, tenant)`; `tenant = None` is a global entry that blocks
/// the address for everyone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionEntry {
    /// Normalized address (see [`normalize_email`]).
    pub email: String,

    /// Owning tenant; `None` for a global entry.
    #[serde(default)]
    pub tenant: Option<TenantId>,

    /// Why the address was suppressed.
    pub reason: SuppressionReason,

    /// When the entry was first recorded.
    pub created_at: DateTime<Utc>,
}

impl SuppressionEntry {
    /// Create an entry scoped by the reason: global reasons ignore `tenant`.
    #[must_use]
    pub fn new(email: &str, reason: SuppressionReason, tenant: Option<TenantId>) -> Self {
        Self {
            email: normalize_email(email),
            tenant: if reason.is_global() { None } else { tenant },
            reason,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_reasons() {
        assert!(SuppressionReason::HardBounce.is_global());
        assert!(SuppressionReason::Complaint.is_global());
        assert!(!SuppressionReason::Unsubscribe.is_global());
        assert!(!SuppressionReason::SoftBounce.is_global());
        assert!(!SuppressionReason::Manual.is_global());
    }

    #[test]
    fn normalize_lowercases_domain_only() {
        assert_eq!(normalize_email("  John.Doe@EXAMPLE.COM "), "John.Doe@example.com");
    }

    #[test]
    fn normalize_without_at_sign() {
        assert_eq!(normalize_email(" not-an-address "), "not-an-address");
    }

    #[test]
    fn global_reason_drops_tenant_scope() {
        let entry = SuppressionEntry::new(
            "x@y.com",
            SuppressionReason::HardBounce,
            Some(TenantId::from("acme")),
        );
        assert!(entry.tenant.is_none());
    }

    #[test]
    fn tenant_reason_keeps_scope() {
        let entry = SuppressionEntry::new(
            "x@y.com",
            SuppressionReason::Unsubscribe,
            Some(TenantId::from("acme")),
        );
        assert_eq!(entry.tenant, Some(TenantId::from("acme")));
    }

    #[test]
    fn reason_labels() {
        assert_eq!(SuppressionReason::SoftBounce.as_str(), "soft_bounce");
        assert_eq!(SuppressionReason::Manual.to_string(), "manual");
    }
}
