//! Per-tenant runtime state.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Mutable state remembered between requests for one tenant.
#[derive(Clone, Default)]
pub struct TenantState {
    /// Index into the tenant's `baseUrls` of the endpoint last tried
    pub active_endpoint: Option<usize>,
    secret: Option<String>,
}

impl std::fmt::Debug for TenantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantState")
            .field("active_endpoint", &self.active_endpoint)
            .field("secret", &self.secret.as_ref().map(|_| "***REDACTED***"))
            .finish()
    }
}

/// Registry of tenant runtime state shared by concurrent requests.
///
/// Updates are last-writer-wins: two requests failing over at the same time
/// may both record an endpoint, and either one is acceptable.
#[derive(Clone, Default)]
pub struct TenantRegistry {
    states: Arc<RwLock<HashMap<String, TenantState>>>,
}

impl TenantRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Endpoint index to start the next connection attempt from.
    pub async fn active_endpoint(&self, tenant_id: &str) -> Option<usize> {
        let states = self.states.read().await;
        states.get(tenant_id).and_then(|s| s.active_endpoint)
    }

    pub async fn remember_endpoint(&self, tenant_id: &str, index: usize) {
        let mut states = self.states.write().await;
        states.entry(tenant_id.to_string()).or_default().active_endpoint = Some(index);
    }

    pub async fn cached_secret(&self, tenant_id: &str) -> Option<String> {
        let states = self.states.read().await;
        states.get(tenant_id).and_then(|s| s.secret.clone())
    }

    pub async fn cache_secret(&self, tenant_id: &str, secret: String) {
        let mut states = self.states.write().await;
        states.entry(tenant_id.to_string()).or_default().secret = Some(secret);
    }

    /// Snapshot of a tenant's state.
    pub async fn state(&self, tenant_id: &str) -> Option<TenantState> {
        let states = self.states.read().await;
        states.get(tenant_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remembered_endpoint_is_per_tenant() {
        let registry = TenantRegistry::new();
        registry.remember_endpoint("a", 2).await;
        assert_eq!(registry.active_endpoint("a").await, Some(2));
        assert_eq!(registry.active_endpoint("b").await, None);
    }

    #[tokio::test]
    async fn test_secret_cache_is_redacted_in_debug() {
        let registry = TenantRegistry::new();
        registry.cache_secret("a", "hunter2".to_string()).await;
        assert_eq!(registry.cached_secret("a").await.as_deref(), Some("hunter2"));
        let state = registry.state("a").await.unwrap();
        assert!(!format!("{:?}", state).contains("hunter2"));
    }
}
