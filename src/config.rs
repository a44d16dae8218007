//! Connector configuration.
//!
//! The configuration is loaded and decrypted by the hosting process and handed
//! to the connector as a [`ConnectorConfig`]. It is deserialized from the same
//! JSON layout the gateway uses for its `endpoint` section:
//!
//! ```json
//! {
//!   "entity": {
//!     "undefined": {
//!       "baseUrls": ["ldap://dc1.example.com:389", "ldap://dc2.example.com:389"],
//!       "username": "cn=admin,dc=example,dc=com",
//!       "password": "secret",
//!       "ldap": {
//!         "userBase": "ou=users,dc=example,dc=com",
//!         "groupBase": "ou=groups,dc=example,dc=com",
//!         "userObjectClasses": ["inetOrgPerson"],
//!         "groupObjectClasses": ["groupOfNames"],
//!         "userNamingAttr": "uid",
//!         "groupNamingAttr": "cn"
//!       }
//!     }
//!   },
//!   "map": {
//!     "user": { "uid": { "mapTo": "userName", "type": "string" } },
//!     "group": { "cn": { "mapTo": "displayName", "type": "string" } }
//!   }
//! }
//! ```
//!
//! Validation happens once, in [`ConnectorConfig::validate`]; everything after
//! that assumes a consistent configuration.

use crate::error::{ConnectorError, ConnectorResult};
use crate::mapper::AttributeMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

fn default_page_size() -> u32 {
    200
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

/// How member identifiers handed to the membership resolver are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MemberIdKind {
    /// Member ids are distinguished names
    #[default]
    Dn,
    /// Member ids are string security identifiers (`S-1-5-21-...`)
    Sid,
    /// Member ids are base64 encoded `objectGUID` values
    Guid,
}

/// Top-level connector configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    /// Tenant ("baseEntity") settings keyed by tenant id
    pub entity: BTreeMap<String, TenantConfig>,
    /// Attribute maps per entity kind
    pub map: AttributeMaps,
    #[serde(default)]
    pub member_id_kind: MemberIdKind,
    /// Page size used for paged searches
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Bind with the caller's authorization header instead of the tenant credential
    #[serde(default)]
    pub auth_pass_through_allowed: bool,
}

/// User and group attribute maps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMaps {
    pub user: AttributeMap,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<AttributeMap>,
}

/// Settings for one tenant.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantConfig {
    /// Candidate endpoints in failover order
    pub base_urls: Vec<String>,
    /// Bind username (distinguished name or UPN)
    pub username: String,
    /// Bind secret as stored; revealed through a [`SecretSource`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    pub ldap: LdapSettings,
}

impl std::fmt::Debug for TenantConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantConfig")
            .field("base_urls", &self.base_urls)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***REDACTED***"))
            .field("ldap", &self.ldap)
            .finish()
    }
}

/// Directory layout for one tenant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LdapSettings {
    pub user_base: String,
    /// Absent when the tenant does not provision groups
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_base: Option<String>,
    pub user_object_classes: Vec<String>,
    #[serde(default)]
    pub group_object_classes: Vec<String>,
    /// Attribute forming the RDN of new users (e.g. `uid` or `CN`)
    pub user_naming_attr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_naming_attr: Option<String>,
    /// Extra filter fragment appended to user searches, e.g. `(!(ou=disabled))`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_filter: Option<String>,
}

impl ConnectorConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json(text: &str) -> ConnectorResult<Self> {
        let config: Self = serde_json::from_str(text).map_err(|e| {
            ConnectorError::configuration(format!("invalid connector configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Build and validate a configuration from an already parsed JSON value.
    pub fn from_value(value: serde_json::Value) -> ConnectorResult<Self> {
        let config: Self = serde_json::from_value(value).map_err(|e| {
            ConnectorError::configuration(format!("invalid connector configuration: {}", e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for consistency.
    pub fn validate(&self) -> ConnectorResult<()> {
        if self.map.user.is_empty() {
            return Err(ConnectorError::configuration(
                "map.user configuration is mandatory",
            ));
        }
        self.map.user.validate("map.user")?;
        if let Some(group) = &self.map.group {
            group.validate("map.group")?;
        }
        if self.entity.is_empty() {
            return Err(ConnectorError::configuration(
                "at least one entity must be configured",
            ));
        }
        if self.page_size == 0 {
            return Err(ConnectorError::configuration(
                "pageSize must be greater than 0",
            ));
        }

        for (tenant_id, tenant) in &self.entity {
            tenant.validate(tenant_id, self.map.group.is_some())?;
        }

        Ok(())
    }

    /// Look up the settings of a tenant.
    pub fn tenant(&self, tenant_id: &str) -> ConnectorResult<&TenantConfig> {
        self.entity.get(tenant_id).ok_or_else(|| {
            ConnectorError::configuration(format!(
                "missing configuration for baseEntity '{}'",
                tenant_id
            ))
        })
    }

    /// The group attribute map, required by every group operation.
    pub fn group_map(&self) -> ConnectorResult<&AttributeMap> {
        self.map
            .group
            .as_ref()
            .ok_or_else(|| ConnectorError::configuration("missing configuration endpoint.map.group"))
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl TenantConfig {
    fn validate(&self, tenant_id: &str, groups_mapped: bool) -> ConnectorResult<()> {
        let missing = |field: &str| {
            ConnectorError::configuration(format!(
                "entity.{}.{} configuration is mandatory",
                tenant_id, field
            ))
        };

        if self.base_urls.is_empty() || self.base_urls.iter().any(|url| url.trim().is_empty()) {
            return Err(missing("baseUrls"));
        }
        if self.ldap.user_base.trim().is_empty() {
            return Err(missing("ldap.userBase"));
        }
        if self.ldap.user_object_classes.is_empty() {
            return Err(missing("ldap.userObjectClasses"));
        }
        if self.ldap.user_naming_attr.trim().is_empty() {
            return Err(missing("ldap.userNamingAttr"));
        }

        if groups_mapped && self.ldap.group_base.is_some() {
            if self.ldap.group_object_classes.is_empty() {
                return Err(missing("ldap.groupObjectClasses"));
            }
            if self.ldap.group_naming_attr.is_none() {
                return Err(missing("ldap.groupNamingAttr"));
            }
        }

        Ok(())
    }

    /// Group subtree base, or a configuration error when groups are not set up.
    pub fn group_base(&self) -> ConnectorResult<&str> {
        self.ldap.group_base.as_deref().ok_or_else(|| {
            ConnectorError::configuration("missing configuration entity.ldap.groupBase")
        })
    }
}

/// Reveals stored bind secrets.
///
/// Secret storage and decryption belong to the hosting process; the connector
/// only asks for the plain secret once per tenant and caches it.
pub trait SecretSource: Send + Sync {
    fn reveal(&self, tenant_id: &str, stored: &str) -> ConnectorResult<String>;
}

/// Secret source for configurations that already carry plain secrets.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTextSecrets;

impl SecretSource for PlainTextSecrets {
    fn reveal(&self, _tenant_id: &str, stored: &str) -> ConnectorResult<String> {
        Ok(stored.to_string())
    }
}
