//! Provisioning operations for users and groups.
//!
//! [`ProvisioningService`] is the connector's outer surface: a front end calls
//! one of the four verbs (list, create, modify, delete) per entity kind with a
//! [`RequestContext`] naming the tenant. The service translates canonical
//! payloads and filters through the tenant's attribute maps, runs the resulting
//! directory operations through the [`RequestExecutor`] and translates results
//! back.
//!
//! Identifiers are percent-encoded distinguished names. Ids received from the
//! caller are decoded exactly once here; ids handed out are encoded by the
//! mapper or the membership resolver.
//!
//! Errors leaving a verb carry the action name, e.g.
//! `getUsers error: not supporting advanced filtering: ...`.
//!
//! # Example Usage
//!
//! ```rust
//! use scim_ldap_connector::config::ConnectorConfig;
//! use scim_ldap_connector::context::{ListQuery, RequestContext};
//! use scim_ldap_connector::directory::InMemoryDirectory;
//! use scim_ldap_connector::service::ProvisioningService;
//! use serde_json::json;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConnectorConfig::from_value(json!({
//!     "entity": {
//!         "undefined": {
//!             "baseUrls": ["ldap://localhost:389"],
//!             "username": "cn=admin,dc=example,dc=com",
//!             "password": "secret",
//!             "ldap": {
//!                 "userBase": "ou=users,dc=example,dc=com",
//!                 "userObjectClasses": ["inetOrgPerson"],
//!                 "userNamingAttr": "uid"
//!             }
//!         }
//!     },
//!     "map": {
//!         "user": {
//!             "dn": { "mapTo": "id", "type": "dn" },
//!             "uid": { "mapTo": "userName" },
//!             "sn": { "mapTo": "name.familyName" }
//!         }
//!     }
//! }))?;
//!
//! let directory = InMemoryDirectory::new();
//! directory
//!     .insert_entry("ou=users,dc=example,dc=com", [("objectClass", vec!["organizationalUnit"])])
//!     .await;
//! let service = ProvisioningService::new(config, directory)?;
//! let context = RequestContext::new("undefined");
//!
//! let id = service
//!     .create_user(&context, &json!({"userName": "bjensen", "name": {"familyName": "Jensen"}}))
//!     .await?;
//!
//! let users = service
//!     .list_users(&context, &ListQuery::new().with_filter(r#"userName eq "bjensen""#))
//!     .await?;
//! assert_eq!(users.resources[0]["id"], id);
//! # Ok(())
//! # }
//! ```

mod filter;
mod groups;
mod users;

pub use filter::ScimFilter;

use crate::config::ConnectorConfig;
use crate::connection::ConnectionManager;
use crate::context::RequestContext;
use crate::directory::{
    DN_KEY, DirectoryClient, NativeRecord, escape_dn_value, object_class_filter,
};
use crate::error::{ConnectorError, ConnectorResult};
use crate::executor::{NativeOperation, RequestExecutor};
use crate::mapper::AttributeMap;
use serde_json::{Map, Value};
use std::sync::Arc;

/// The four provisioning verbs for users and groups.
pub struct ProvisioningService<C: DirectoryClient> {
    executor: RequestExecutor<C>,
}

impl<C: DirectoryClient> ProvisioningService<C> {
    /// Validate `config` and build a service talking to directories through `client`.
    pub fn new(config: ConnectorConfig, client: C) -> ConnectorResult<Self> {
        config.validate()?;
        Ok(Self::from_connections(ConnectionManager::new(
            client,
            Arc::new(config),
        )))
    }

    /// Build a service on a preconfigured connection manager, e.g. one using a
    /// custom [`SecretSource`](crate::config::SecretSource).
    pub fn from_connections(connections: ConnectionManager<C>) -> Self {
        Self {
            executor: RequestExecutor::new(connections),
        }
    }

    pub fn executor(&self) -> &RequestExecutor<C> {
        &self.executor
    }

    pub fn config(&self) -> &ConnectorConfig {
        self.executor.connections().config()
    }

    async fn search(
        &self,
        context: &RequestContext,
        operation: NativeOperation,
    ) -> ConnectorResult<Vec<NativeRecord>> {
        Ok(self.executor.execute(context, operation).await?.into_records())
    }

    async fn write(&self, context: &RequestContext, operation: NativeOperation) -> ConnectorResult<()> {
        self.executor.execute(context, operation).await.map(|_| ())
    }
}

/// `(&<object classes><terms><static fragment>)`
fn search_filter(classes: &[String], terms: &str, fragment: Option<&str>) -> String {
    format!(
        "(&{}{}{})",
        object_class_filter(classes),
        terms,
        fragment.unwrap_or_default()
    )
}

/// Clone a payload's top-level object.
fn payload_object(payload: &Value) -> ConnectorResult<Map<String, Value>> {
    payload
        .as_object()
        .cloned()
        .ok_or_else(|| ConnectorError::invalid_request("payload must be a JSON object"))
}

/// Remove a key ignoring case.
fn remove_ci(object: &mut Map<String, Value>, key: &str) -> Option<Value> {
    let existing = object.keys().find(|k| k.eq_ignore_ascii_case(key)).cloned()?;
    object.remove(&existing)
}

/// Translate a create payload and complete it with object classes and the
/// naming attribute; returns the record and the new entry's DN.
fn creation_record(
    map: &AttributeMap,
    payload: Map<String, Value>,
    object_classes: &[String],
    naming_attr: &str,
    naming_canonical: &str,
    base: &str,
) -> ConnectorResult<(NativeRecord, String)> {
    let fallback = payload
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(naming_canonical))
        .and_then(|(_, value)| value.as_str())
        .map(str::to_string);

    let mut record = map.outbound_object(&Value::Object(payload))?;
    record.remove(DN_KEY);

    let naming_value = match record.get(naming_attr).and_then(|v| v.first()) {
        Some(value) if !value.is_empty() => value.to_string(),
        _ => fallback.filter(|v| !v.is_empty()).ok_or_else(|| {
            ConnectorError::invalid_request(format!(
                "missing value for naming attribute '{}' ({})",
                naming_attr, naming_canonical
            ))
        })?,
    };
    if !record.contains(naming_attr) {
        record.insert(naming_attr, naming_value.clone());
    }
    record.insert("objectClass", object_classes.to_vec());

    let dn = format!("{}={},{}", naming_attr, escape_dn_value(&naming_value), base);
    Ok((record, dn))
}
