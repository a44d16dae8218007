//! Connection acquisition with endpoint failover.
//!
//! Each logical request acquires its own bound [`DirectorySession`] through the
//! [`ConnectionManager`]. Acquisition walks the tenant's candidate endpoints
//! starting from the one remembered in the [`TenantRegistry`]; timeouts and
//! refused connections move on to the next candidate, every other failure
//! ends the attempt immediately. The candidate list is walked at most once.
//!
//! The bind credential is either the tenant's configured account, with its
//! secret revealed once through a [`SecretSource`] and cached, or, when the
//! configuration allows it, the caller's own authorization header.

mod registry;

pub use registry::{TenantRegistry, TenantState};

use crate::auth::PassThroughCredential;
use crate::config::{ConnectorConfig, PlainTextSecrets, SecretSource, TenantConfig};
use crate::directory::{DirectoryClient, DirectorySession};
use crate::error::{ConnectorError, ConnectorResult};
use log::{debug, info, warn};
use std::sync::Arc;

/// Username and secret used for a bind.
#[derive(Clone)]
struct BindCredential {
    username: String,
    secret: String,
}

/// Hands out bound directory sessions for tenants.
pub struct ConnectionManager<C: DirectoryClient> {
    client: C,
    config: Arc<ConnectorConfig>,
    registry: TenantRegistry,
    secrets: Arc<dyn SecretSource>,
}

impl<C: DirectoryClient> ConnectionManager<C> {
    /// Create a manager using plain-text secrets from the configuration.
    pub fn new(client: C, config: Arc<ConnectorConfig>) -> Self {
        Self {
            client,
            config,
            registry: TenantRegistry::new(),
            secrets: Arc::new(PlainTextSecrets),
        }
    }

    /// Reveal configured secrets through `secrets`.
    pub fn with_secret_source(mut self, secrets: Arc<dyn SecretSource>) -> Self {
        self.secrets = secrets;
        self
    }

    /// Share an existing registry, e.g. between several managers.
    pub fn with_registry(mut self, registry: TenantRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &TenantRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.config
    }

    /// Acquire a bound session for `tenant_id`.
    ///
    /// `authorization` is the caller's raw `Authorization` header; it is only
    /// used when `authPassThroughAllowed` is set.
    pub async fn acquire(
        &self,
        tenant_id: &str,
        authorization: Option<&str>,
    ) -> ConnectorResult<C::Session> {
        let tenant = self.config.tenant(tenant_id)?;
        let credential = self.credential(tenant_id, tenant, authorization).await?;

        let count = tenant.base_urls.len();
        let start = self
            .registry
            .active_endpoint(tenant_id)
            .await
            .filter(|index| *index < count)
            .unwrap_or(0);

        let mut last_error = None;
        for attempt in 0..count {
            let index = (start + attempt) % count;
            let url = &tenant.base_urls[index];
            self.registry.remember_endpoint(tenant_id, index).await;

            match self.connect_and_bind(url, &credential).await {
                Ok(session) => {
                    if attempt > 0 {
                        info!(
                            "Tenant '{}' failed over to baseUrl={} after {} attempt(s)",
                            tenant_id, url, attempt
                        );
                    } else {
                        debug!("Tenant '{}' connected to baseUrl={}", tenant_id, url);
                    }
                    return Ok(session);
                }
                Err(err) if err.is_transient() => {
                    warn!(
                        "Tenant '{}' baseUrl={} connection error - starting retry: {}",
                        tenant_id, url, err
                    );
                    last_error = Some(err);
                }
                Err(err) => {
                    warn!("Tenant '{}' baseUrl={} connect failed: {}", tenant_id, url, err);
                    return Err(err);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ConnectorError::configuration(format!(
                "entity.{}.baseUrls configuration is mandatory",
                tenant_id
            ))
        }))
    }

    async fn connect_and_bind(
        &self,
        url: &str,
        credential: &BindCredential,
    ) -> ConnectorResult<C::Session> {
        let mut session = self
            .client
            .connect(url, self.config.connect_timeout())
            .await
            .map_err(|e| e.into_connector_error(url))?;

        if let Err(e) = session.bind(&credential.username, &credential.secret).await {
            session.destroy();
            return Err(e.into_connector_error(url));
        }
        Ok(session)
    }

    async fn credential(
        &self,
        tenant_id: &str,
        tenant: &TenantConfig,
        authorization: Option<&str>,
    ) -> ConnectorResult<BindCredential> {
        if self.config.auth_pass_through_allowed {
            if let Some(header) = authorization {
                let parsed = PassThroughCredential::parse(header)?;
                let (username, secret) = parsed.bind_identity(&tenant.username);
                return Ok(BindCredential {
                    username: username.to_string(),
                    secret: secret.to_string(),
                });
            }
        }

        let secret = match self.registry.cached_secret(tenant_id).await {
            Some(secret) => secret,
            None => {
                let stored = tenant.password.as_deref().unwrap_or_default();
                let revealed = self.secrets.reveal(tenant_id, stored)?;
                self.registry.cache_secret(tenant_id, revealed.clone()).await;
                revealed
            }
        };

        Ok(BindCredential {
            username: tenant.username.clone(),
            secret,
        })
    }
}
