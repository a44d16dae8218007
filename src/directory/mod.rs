//! Directory access layer.
//!
//! This module separates the directory wire protocol from the connector logic.
//! The [`DirectoryClient`] trait opens sessions against an endpoint URL and the
//! [`DirectorySession`] trait exposes the handful of protocol operations the
//! connector issues: bind, paged search, add, modify, delete and release.
//!
//! Two backends are provided:
//!
//! * [`LdapDirectory`]: talks LDAP through the `ldap3` crate
//! * [`InMemoryDirectory`]: a thread-safe in-memory directory tree used for
//!   testing and development
//!
//! # Example Usage
//!
//! ```rust
//! use scim_ldap_connector::directory::{
//!     DirectoryClient, DirectorySession, InMemoryDirectory, SearchRequest, SearchScope,
//! };
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let directory = InMemoryDirectory::new();
//! directory
//!     .insert_entry("ou=users,dc=example,dc=com", [("objectClass", vec!["organizationalUnit"])])
//!     .await;
//!
//! let mut session = directory.connect("ldap://dc1", Duration::from_secs(5)).await?;
//! session.bind("cn=admin,dc=example,dc=com", "secret").await?;
//!
//! let request = SearchRequest::new("ou=users,dc=example,dc=com", SearchScope::Base, "(objectClass=*)");
//! let page = session.search_page(&request, 200, None).await?;
//! assert_eq!(page.entries.len(), 1);
//! session.unbind().await?;
//! # Ok(())
//! # }
//! ```

pub mod escape;
pub mod in_memory;
pub mod ldap;

pub use escape::{escape_dn_value, escape_filter_value, object_class_filter};
pub use in_memory::{InMemoryDirectory, InMemoryDirectoryStats};
pub use ldap::{LdapDirectory, LdapSession};

use crate::error::{ConnectorError, INVALID_CREDENTIALS_MESSAGE};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// Reserved record key holding the distinguished name of a search result.
pub const DN_KEY: &str = "dn";

/// LDAP result codes the connector reacts to.
pub mod result_code {
    pub const ATTRIBUTE_OR_VALUE_EXISTS: u32 = 20;
    pub const NO_SUCH_OBJECT: u32 = 32;
    pub const INVALID_CREDENTIALS: u32 = 49;
    pub const OBJECT_CLASS_VIOLATION: u32 = 65;
    pub const ENTRY_ALREADY_EXISTS: u32 = 68;
    pub const OTHER: u32 = 80;
}

/// Search scope of a directory search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    /// Only the base object
    Base,
    /// Immediate children of the base object
    OneLevel,
    /// The base object and all its descendants
    Subtree,
}

/// A native directory search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub base: String,
    pub scope: SearchScope,
    pub filter: String,
    /// Attributes to return; empty requests all user attributes
    pub attributes: Vec<String>,
}

impl SearchRequest {
    pub fn new(base: impl Into<String>, scope: SearchScope, filter: impl Into<String>) -> Self {
        Self {
            base: base.into(),
            scope,
            filter: filter.into(),
            attributes: Vec::new(),
        }
    }

    pub fn with_attributes<I, S>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.attributes = attributes.into_iter().map(Into::into).collect();
        self
    }
}

/// Kind of a modify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModifyKind {
    /// Replace all values of the attribute
    Replace,
    /// Add values to the attribute
    Add,
    /// Remove values from the attribute
    Delete,
}

/// An attribute value of a flattened directory record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NativeValue {
    Single(String),
    Multi(Vec<String>),
}

impl NativeValue {
    /// Build a value from a list, unwrapping single-element lists.
    pub fn from_values(mut values: Vec<String>) -> Self {
        if values.len() == 1 {
            Self::Single(values.remove(0))
        } else {
            Self::Multi(values)
        }
    }

    /// All values as a list.
    pub fn to_values(&self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value.clone()],
            Self::Multi(values) => values.clone(),
        }
    }

    pub fn into_values(self) -> Vec<String> {
        match self {
            Self::Single(value) => vec![value],
            Self::Multi(values) => values,
        }
    }

    /// The first value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Single(value) => Some(value),
            Self::Multi(values) => values.first().map(String::as_str),
        }
    }
}

impl From<&str> for NativeValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for NativeValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for NativeValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multi(values)
    }
}

/// A flattened directory record keyed by native attribute name.
///
/// Search results always carry the reserved [`DN_KEY`]. Lookups by name are
/// case-insensitive, matching directory attribute semantics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NativeRecord(BTreeMap<String, NativeValue>);

impl NativeRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<NativeValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Look up an attribute, ignoring case.
    pub fn get(&self, name: &str) -> Option<&NativeValue> {
        self.0.get(name).or_else(|| {
            self.0
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Remove an attribute, ignoring case.
    pub fn remove(&mut self, name: &str) -> Option<NativeValue> {
        let key = self
            .0
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()?;
        self.0.remove(&key)
    }

    /// Distinguished name of a search result.
    pub fn dn(&self) -> Option<&str> {
        self.get(DN_KEY).and_then(NativeValue::first)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &NativeValue)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Attribute changes as name/value-list pairs, excluding the reserved `dn` key.
    pub fn to_changes(&self) -> Vec<(String, Vec<String>)> {
        self.0
            .iter()
            .filter(|(name, _)| !name.eq_ignore_ascii_case(DN_KEY))
            .map(|(name, value)| (name.clone(), value.to_values()))
            .collect()
    }
}

impl FromIterator<(String, NativeValue)> for NativeRecord {
    fn from_iter<T: IntoIterator<Item = (String, NativeValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// A raw search result entry as delivered by a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    pub dn: String,
    /// Attribute values; binary attributes are already rendered as text
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl DirectoryEntry {
    /// Flatten into a [`NativeRecord`]: single values unwrapped, `dn` added.
    pub fn into_record(self) -> NativeRecord {
        let mut record: NativeRecord = self
            .attributes
            .into_iter()
            .map(|(name, values)| (name, NativeValue::from_values(values)))
            .collect();
        record.insert(DN_KEY, NativeValue::Single(self.dn));
        record
    }
}

/// One page of a paged search.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    pub entries: Vec<DirectoryEntry>,
    /// Continuation cookie; `None` or empty on the last page
    pub cookie: Option<Vec<u8>>,
}

/// Protocol-level failure reported by a directory backend.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DirectoryError {
    /// Connection attempt timed out
    #[error("{endpoint} connection timeout: {message}")]
    Timeout { endpoint: String, message: String },

    /// Connection refused by the endpoint
    #[error("{endpoint} ECONNREFUSED: {message}")]
    Refused { endpoint: String, message: String },

    /// Transport failure other than timeout or refusal
    #[error("{message}")]
    Io { message: String },

    /// Operation completed with a non-success result code
    #[error("{message}")]
    Result { code: u32, message: String },
}

impl DirectoryError {
    pub fn result(code: u32, message: impl Into<String>) -> Self {
        Self::Result {
            code,
            message: message.into(),
        }
    }

    /// LDAP result code, if the directory answered.
    pub fn result_code(&self) -> Option<u32> {
        match self {
            Self::Result { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Timeout and refusal are worth trying another endpoint for.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Refused { .. })
    }

    /// Base object missing, including the Active Directory variant reported as text.
    pub fn is_no_such_object(&self) -> bool {
        match self {
            Self::Result { code, message } => {
                *code == result_code::NO_SUCH_OBJECT || message.contains("DSID-0C0909F2")
            }
            Self::Io { message } => message.contains("DSID-0C0909F2"),
            _ => false,
        }
    }

    pub fn is_invalid_credentials(&self) -> bool {
        match self {
            Self::Result { code, message } => {
                *code == result_code::INVALID_CREDENTIALS
                    || message.contains("AcceptSecurityContext")
            }
            Self::Io { message } => message.contains("AcceptSecurityContext"),
            _ => false,
        }
    }

    /// Classify into a [`ConnectorError`]; `target` is the DN or endpoint involved.
    pub fn into_connector_error(self, target: &str) -> ConnectorError {
        if self.is_invalid_credentials() {
            return ConnectorError::Authentication {
                message: INVALID_CREDENTIALS_MESSAGE.to_string(),
            };
        }
        match self {
            Self::Timeout { endpoint, message } | Self::Refused { endpoint, message } => {
                ConnectorError::Connection { endpoint, message }
            }
            Self::Io { message } => ConnectorError::Directory {
                code: result_code::OTHER,
                message,
            },
            Self::Result { code, message } => match code {
                result_code::NO_SUCH_OBJECT => ConnectorError::NotFound {
                    dn: target.to_string(),
                    message,
                },
                result_code::ENTRY_ALREADY_EXISTS => ConnectorError::Conflict {
                    dn: target.to_string(),
                    message,
                },
                result_code::OBJECT_CLASS_VIOLATION => ConnectorError::SchemaViolation {
                    dn: target.to_string(),
                    message,
                },
                code => ConnectorError::Directory { code, message },
            },
        }
    }
}

/// Opens sessions against directory endpoints.
///
/// Implementations must be cheap to share; the connection manager holds one
/// client for all tenants.
pub trait DirectoryClient: Send + Sync {
    /// Session type produced by this client.
    type Session: DirectorySession;

    /// Open an unauthenticated session to `url`, giving up after `timeout`.
    fn connect(
        &self,
        url: &str,
        timeout: Duration,
    ) -> impl Future<Output = Result<Self::Session, DirectoryError>> + Send;
}

/// An exclusively owned directory session.
///
/// A session is bound once, used for the operations of one logical request and
/// then either released with [`unbind`](DirectorySession::unbind) or torn down
/// with [`destroy`](DirectorySession::destroy).
pub trait DirectorySession: Send + Sized {
    /// Authenticate the session with a simple bind.
    fn bind(
        &mut self,
        username: &str,
        secret: &str,
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Fetch one page of a paged search.
    ///
    /// `cookie` is `None` for the first page and the cookie returned by the
    /// previous page afterwards.
    fn search_page(
        &mut self,
        request: &SearchRequest,
        page_size: u32,
        cookie: Option<Vec<u8>>,
    ) -> impl Future<Output = Result<SearchPage, DirectoryError>> + Send;

    /// Create an entry.
    fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Apply one kind of change to the listed attributes of an entry.
    fn modify(
        &mut self,
        dn: &str,
        kind: ModifyKind,
        changes: &[(String, Vec<String>)],
    ) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Remove an entry.
    fn delete(&mut self, dn: &str) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Release the session gracefully.
    fn unbind(self) -> impl Future<Output = Result<(), DirectoryError>> + Send;

    /// Tear the session down without a protocol goodbye.
    fn destroy(self);
}
