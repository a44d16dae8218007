//! Common test utilities: configuration fixtures and directory seeding.

use scim_ldap_connector::config::ConnectorConfig;
use scim_ldap_connector::context::RequestContext;
use scim_ldap_connector::directory::InMemoryDirectory;
use scim_ldap_connector::service::ProvisioningService;
use serde_json::{Value, json};

pub const TENANT: &str = "undefined";
pub const ADMIN: &str = "cn=admin,dc=example,dc=com";
pub const ADMIN_SECRET: &str = "adminpassword";
pub const USER_BASE: &str = "ou=users,dc=example,dc=com";
pub const GROUP_BASE: &str = "ou=groups,dc=example,dc=com";
pub const DC1: &str = "ldap://dc1.example.com:389";
pub const DC2: &str = "ldap://dc2.example.com:389";

/// Install a test logger; honours `RUST_LOG`.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Connector configuration for an OpenLDAP-style directory.
pub fn config_value() -> Value {
    json!({
        "entity": {
            "undefined": {
                "baseUrls": [DC1, DC2],
                "username": ADMIN,
                "password": ADMIN_SECRET,
                "ldap": {
                    "userBase": USER_BASE,
                    "groupBase": GROUP_BASE,
                    "userObjectClasses": ["inetOrgPerson"],
                    "groupObjectClasses": ["groupOfNames"],
                    "userNamingAttr": "uid",
                    "groupNamingAttr": "cn"
                }
            }
        },
        "map": {
            "user": {
                "dn": { "mapTo": "id", "type": "dn" },
                "uid": { "mapTo": "userName", "type": "string" },
                "cn": { "mapTo": "displayName", "type": "string" },
                "givenName": { "mapTo": "name.givenName", "type": "string" },
                "sn": { "mapTo": "name.familyName", "type": "string" },
                "mail": { "mapTo": "emails.work.value", "type": "string" },
                "employeeActive": { "mapTo": "active", "type": "boolean" },
                "userPassword": { "mapTo": "password", "type": "string", "direction": "outbound" }
            },
            "group": {
                "dn": { "mapTo": "id", "type": "dn" },
                "cn": { "mapTo": "displayName", "type": "string" },
                "businessCategory": { "mapTo": "externalId", "type": "string" },
                "member": { "mapTo": "members.value", "type": "dn" }
            }
        }
    })
}

pub fn config_from(value: Value) -> ConnectorConfig {
    ConnectorConfig::from_value(value).expect("test configuration is valid")
}

/// A directory with the user and group containers in place.
///
/// `groupOfNames` requires at least one `member` value, as in OpenLDAP.
pub async fn directory() -> InMemoryDirectory {
    let directory = InMemoryDirectory::new();
    directory.add_account(ADMIN, ADMIN_SECRET).await;
    directory.require_attribute("groupOfNames", "member").await;
    for base in [USER_BASE, GROUP_BASE, "ou=contractors,dc=example,dc=com"] {
        directory
            .insert_entry(base, [("objectClass", vec!["organizationalUnit"])])
            .await;
    }
    directory
}

pub fn service(directory: &InMemoryDirectory) -> ProvisioningService<InMemoryDirectory> {
    service_with(directory, config_value())
}

pub fn service_with(
    directory: &InMemoryDirectory,
    config: Value,
) -> ProvisioningService<InMemoryDirectory> {
    ProvisioningService::new(config_from(config), directory.clone())
        .expect("test configuration is valid")
}

pub fn context() -> RequestContext {
    RequestContext::new(TENANT)
}

pub fn user_dn(uid: &str) -> String {
    format!("uid={},{}", uid, USER_BASE)
}

pub fn group_dn(cn: &str) -> String {
    format!("cn={},{}", cn, GROUP_BASE)
}

/// Store a user entry directly.
pub async fn seed_user(directory: &InMemoryDirectory, uid: &str) {
    directory
        .insert_entry(
            &user_dn(uid),
            [
                ("objectClass", vec!["inetOrgPerson".to_string()]),
                ("uid", vec![uid.to_string()]),
                ("cn", vec![format!("User {}", uid)]),
                ("sn", vec!["Test".to_string()]),
            ],
        )
        .await;
}

/// Store a group entry directly; an empty member list stores the placeholder value.
pub async fn seed_group(directory: &InMemoryDirectory, cn: &str, members: &[String]) {
    let members = if members.is_empty() {
        vec![String::new()]
    } else {
        members.to_vec()
    };
    directory
        .insert_entry(
            &group_dn(cn),
            [
                ("objectClass", vec!["groupOfNames".to_string()]),
                ("cn", vec![cn.to_string()]),
                ("member", members),
            ],
        )
        .await;
}
