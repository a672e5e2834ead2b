use std::sync::Arc;

use tracing::info;

use leadflow_core::{CoreError, SuppressionEntry, SuppressionReason, TenantId, normalize_email};
use leadflow_state::SuppressionStore;

/// Service wrapping the suppression store with address normalization and
/// reason-based scoping.
///
/// Hard bounces and complaints always land as global entries; unsubscribes
/// and soft bounces stay scoped to the tenant that triggered them. The
/// membership check runs before every send.
pub struct SuppressionService {
    store: Arc<dyn SuppressionStore>,
}

impl SuppressionService {
    /// Create the service over a store backend.
    #[must_use]
    pub fn new(store: Arc<dyn SuppressionStore>) -> Self {
        Self { store }
    }

    /// True if a global entry exists for the address, or a per-tenant entry
    /// for `(address, tenant)`. Case-insensitive.
    pub async fn is_blocked(
        &self,
        email: &str,
        tenant: Option<&TenantId>,
    ) -> Result<bool, CoreError> {
        let normalized = normalize_email(email);
        self.store
            .is_blocked(&normalized, tenant)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))
    }

    /// Record a suppression. Idempotent: recording an address twice is not
    /// an error and keeps the original entry.
    pub async fn record(
        &self,
        email: &str,
        reason: SuppressionReason,
        tenant: Option<TenantId>,
    ) -> Result<SuppressionEntry, CoreError> {
        let entry = SuppressionEntry::new(email, reason, tenant);
        info!(
            email = %entry.email,
            reason = %entry.reason,
            tenant = ?entry.tenant,
            "recording suppression"
        );
        self.store
            .upsert_suppression(entry)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))
    }

    /// Remove an entry. Returns `true` iff one existed.
    pub async fn remove(
        &self,
        email: &str,
        tenant: Option<&TenantId>,
    ) -> Result<bool, CoreError> {
        let normalized = normalize_email(email);
        self.store
            .remove_suppression(&normalized, tenant)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))
    }

    /// The tenant's unsubscribe entries, newest first.
    pub async fn list_unsubscribes(
        &self,
        tenant: &TenantId,
        limit: usize,
    ) -> Result<Vec<SuppressionEntry>, CoreError> {
        let entries = self
            .store
            .list_tenant_suppressions(tenant, limit)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))?;
        Ok(entries
            .into_iter()
            .filter(|e| e.reason == SuppressionReason::Unsubscribe)
            .collect())
    }

    /// Global entries, newest first.
    pub async fn list_global(&self, limit: usize) -> Result<Vec<SuppressionEntry>, CoreError> {
        self.store
            .list_global_suppressions(limit)
            .await
            .map_err(|e| CoreError::UpstreamUnavailable(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use leadflow_state_memory::MemoryStore;

    use super::*;

    fn service() -> SuppressionService {
        SuppressionService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn hard_bounce_blocks_globally() {
        let service = service();
        service
            .record(
                "X@Y.com",
                SuppressionReason::HardBounce,
                Some(TenantId::from("acme")),
            )
            .await
            .unwrap();

        assert!(service.is_blocked("x@y.com", None).await.unwrap());
        assert!(
            service
                .is_blocked("X@y.COM", Some(&TenantId::from("globex")))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn unsubscribe_blocks_only_its_tenant() {
        let service = service();
        service
            .record(
                "u@v.com",
                SuppressionReason::Unsubscribe,
                Some(TenantId::from("acme")),
            )
            .await
            .unwrap();

        assert!(
            service
                .is_blocked("u@v.com", Some(&TenantId::from("acme")))
                .await
                .unwrap()
        );
        assert!(
            !service
                .is_blocked("u@v.com", Some(&TenantId::from("globex")))
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn record_is_idempotent() {
        let service = service();
        let first = service
            .record("a@b.c", SuppressionReason::Manual, None)
            .await
            .unwrap();
        let second = service
            .record("a@b.c", SuppressionReason::Manual, None)
            .await
            .unwrap();
        assert_eq!(first.created_at, second.created_at);
    }

    #[tokio::test]
    async fn list_unsubscribes_filters_reason() {
        let service = service();
        let tenant = TenantId::from("acme");
        service
            .record("u1@v.com", SuppressionReason::Unsubscribe, Some(tenant.clone()))
            .await
            .unwrap();
        service
            .record("s1@v.com", SuppressionReason::SoftBounce, Some(tenant.clone()))
            .await
            .unwrap();

        let unsubscribes = service.list_unsubscribes(&tenant, 10).await.unwrap();
        assert_eq!(unsubscribes.len(), 1);
        assert_eq!(unsubscribes[0].email, "u1@v.com");
    }

    #[tokio::test]
    async fn remove_then_unblocked() {
        let service = service();
        service
            .record("a@b.c", SuppressionReason::Manual, None)
            .await
            .unwrap();
        assert!(service.remove("A@B.C", None).await.unwrap());
        assert!(!service.is_blocked("a@b.c", None).await.unwrap());
    }
}
