//! SCIM provisioning connector for LDAP directories.
//!
//! Translates SCIM-style user and group operations into LDAP operations against
//! one or more directory endpoints per tenant, with endpoint failover, paged
//! searches and reverse group membership.
//!
//! # Core Components
//!
//! - [`ProvisioningService`] - list, create, modify and delete users and groups
//! - [`AttributeMap`] - canonical to directory attribute translation
//! - [`ConnectionManager`] - failover across a tenant's endpoints and bind
//! - [`RequestExecutor`] - paged search and write dispatch with error recovery
//! - [`MembershipResolver`] - groups a member belongs to, by DN, SID or GUID
//! - [`DirectoryClient`] - seam between the connector and the wire protocol
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use scim_ldap_connector::{ConnectorConfig, LdapDirectory, ProvisioningService, RequestContext};
//! use scim_ldap_connector::context::ListQuery;
//!
//! # async fn example(config_json: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConnectorConfig::from_json(config_json)?;
//! let service = ProvisioningService::new(config, LdapDirectory::new())?;
//!
//! let context = RequestContext::new("undefined");
//! let users = service.list_users(&context, &ListQuery::new()).await?;
//! println!("{} users", users.total_results());
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod connection;
pub mod context;
pub mod directory;
pub mod error;
pub mod executor;
pub mod mapper;
pub mod membership;
pub mod service;

// Re-export commonly used types for convenience
pub use config::{ConnectorConfig, MemberIdKind, SecretSource, TenantConfig};
pub use connection::{ConnectionManager, TenantRegistry};
pub use context::{ListQuery, ListResponse, RequestContext};
pub use directory::{DirectoryClient, DirectorySession, InMemoryDirectory, LdapDirectory};
pub use error::{ConnectorError, ConnectorResult, ErrorKind};
pub use executor::{NativeOperation, NativeResult, RequestExecutor};
pub use mapper::{AttributeMap, TranslationRule};
pub use membership::{MembershipEdge, MembershipResolver};
pub use service::{ProvisioningService, ScimFilter};
