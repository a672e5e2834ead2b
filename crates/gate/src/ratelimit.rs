use std::sync::Arc;

use chrono::{DateTime, Duration, Timelike, Utc};
use serde::{Deserialize, Serialize};

use leadflow_core::{CoreError, PeriodType, RateLimitSettings, Tenant, period_start};
use leadflow_state::OfferStore;

/// The recipient domain of an email address, lowercased.
#[must_use]
pub fn recipient_domain(address: &str) -> Option<String> {
    address
        .rsplit_once('@')
        .map(|(_, domain)| domain.to_ascii_lowercase())
}

/// Current usage against each configured window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitUsage {
    /// Offers sent this UTC calendar day.
    pub daily: usize,
    /// Offers sent this clock hour.
    pub hourly: usize,
    /// Offers sent to the evaluated recipient domain this UTC day.
    pub domain_daily: usize,
}

/// Outcome of a rate-limit evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitDecision {
    /// Whether the send may proceed.
    pub allowed: bool,
    /// Which limit denied the send, when one did.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// The tenant's configured limits.
    pub limits: RateLimitSettings,
    /// Usage counted from committed sends.
    pub usage: RateLimitUsage,
    /// Remaining budget per window; `None` means unlimited.
    pub remaining: RemainingBudget,
}

/// Remaining budget per window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemainingBudget {
    #[serde(default)]
    pub daily: Option<usize>,
    #[serde(default)]
    pub hourly: Option<usize>,
    #[serde(default)]
    pub domain_daily: Option<usize>,
}

fn remaining(limit: Option<u32>, used: usize) -> Option<usize> {
    limit.map(|limit| (limit as usize).saturating_sub(used))
}

/// Sliding-window sending budgets per tenant and per recipient domain.
///
/// Usage is a read-only aggregation over committed `sent` offers -- an
/// in-flight send that has not committed is not counted, so the counter may
/// slightly undercount. Denied sends never consume budget.
pub struct RateLimiter {
    offers: Arc<dyn OfferStore>,
}

impl RateLimiter {
    /// Create a limiter over the offer store.
    #[must_use]
    pub fn new(offers: Arc<dyn OfferStore>) -> Self {
        Self { offers }
    }

    /// Evaluate every applicable limit for a tenant and recipient domain.
    /// Missing limits mean "unlimited".
    pub async fn evaluate(
        &self,
        tenant: &Tenant,
        domain: Option<&str>,
    ) -> Result<RateLimitDecision, CoreError> {
        self.evaluate_at(tenant, domain, Utc::now()).await
    }

    /// [`evaluate`](Self::evaluate) against an explicit clock, for tests.
    pub async fn evaluate_at(
        &self,
        tenant: &Tenant,
        domain: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<RateLimitDecision, CoreError> {
        let limits = tenant.rate_limits.clone();
        let day_start = period_start(PeriodType::Day, now);
        let day_end = day_start + Duration::days(1);
        let hour_start = now
            .with_minute(0)
            .and_then(|t| t.with_second(0))
            .and_then(|t| t.with_nanosecond(0))
            .unwrap_or(now);
        let hour_end = hour_start + Duration::hours(1);

        let map_err = |e: leadflow_state::StateError| CoreError::UpstreamUnavailable(e.to_string());

        let daily = self
            .offers
            .count_sent_between(&tenant.user_code, day_start, day_end)
            .await
            .map_err(map_err)?;
        let hourly = self
            .offers
            .count_sent_between(&tenant.user_code, hour_start, hour_end)
            .await
            .map_err(map_err)?;
        let domain_daily = match domain {
            Some(domain) => self
                .offers
                .count_sent_to_domain_between(&tenant.user_code, domain, day_start, day_end)
                .await
                .map_err(map_err)?,
            None => 0,
        };

        let usage = RateLimitUsage {
            daily,
            hourly,
            domain_daily,
        };

        let mut reason = None;
        if limits.daily_max.is_some_and(|max| daily >= max as usize) {
            reason = Some("daily limit reached".to_owned());
        } else if limits.hourly_max.is_some_and(|max| hourly >= max as usize) {
            reason = Some("hourly limit reached".to_owned());
        } else if domain.is_some()
            && limits
                .domain_daily_max
                .is_some_and(|max| domain_daily >= max as usize)
        {
            reason = Some("recipient domain daily limit reached".to_owned());
        }

        Ok(RateLimitDecision {
            allowed: reason.is_none(),
            remaining: RemainingBudget {
                daily: remaining(limits.daily_max, daily),
                hourly: remaining(limits.hourly_max, hourly),
                domain_daily: domain.and_then(|_| remaining(limits.domain_daily_max, domain_daily)),
            },
            reason,
            limits,
            usage,
        })
    }
}
