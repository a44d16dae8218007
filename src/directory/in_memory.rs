//! In-memory directory implementation.
//!
//! This module provides a thread-safe in-memory directory tree implementing
//! [`DirectoryClient`]. It is designed for testing and development: it honours
//! search scopes, a useful subset of the filter grammar, paged results, the
//! result codes the connector reacts to, and the Active Directory style
//! `<SID=...>` / `<GUID=...>` search bases.
//!
//! # Features
//!
//! * Thread-safe concurrent access with async RwLock
//! * Endpoints can be marked unreachable to exercise failover
//! * Optional credential checking on bind
//! * Per-object-class mandatory attributes to exercise schema violations
//! * Statistics on connects, binds, pages and session releases
//!
//! # Example Usage
//!
//! ```rust
//! use scim_ldap_connector::directory::{DirectoryError, InMemoryDirectory};
//!
//! # async fn example() {
//! let directory = InMemoryDirectory::new();
//! directory
//!     .fail_endpoint("ldap://dc1", DirectoryError::Refused {
//!         endpoint: "ldap://dc1".to_string(),
//!         message: "connect ECONNREFUSED".to_string(),
//!     })
//!     .await;
//! directory.require_attribute("groupOfNames", "member").await;
//! directory
//!     .insert_entry(
//!         "cn=Admins,ou=groups,dc=example,dc=com",
//!         [("objectClass", vec!["groupOfNames"]), ("member", vec!["uid=a,dc=example,dc=com"])],
//!     )
//!     .await;
//! assert_eq!(directory.stats().await.entries, 1);
//! # }
//! ```

use super::{
    DirectoryClient, DirectoryEntry, DirectoryError, DirectorySession, ModifyKind, SearchPage,
    SearchRequest, SearchScope, result_code,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

const NO_SUCH_ATTRIBUTE: u32 = 16;
const INSUFFICIENT_ACCESS_RIGHTS: u32 = 50;
const FILTER_ERROR: u32 = 87;

/// Counters describing how the directory has been used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InMemoryDirectoryStats {
    /// Number of stored entries
    pub entries: usize,
    /// Endpoint URLs in the order connections were attempted
    pub connect_attempts: Vec<String>,
    pub successful_binds: usize,
    pub failed_binds: usize,
    /// Search pages served
    pub page_requests: usize,
    pub unbinds: usize,
    pub destroys: usize,
}

#[derive(Default)]
struct DirectoryState {
    // Insertion order is delivery order.
    entries: Vec<DirectoryEntry>,
    unreachable: HashMap<String, DirectoryError>,
    credentials: HashMap<String, String>,
    required: HashMap<String, Vec<String>>,
    stats: InMemoryDirectoryStats,
}

/// Thread-safe in-memory directory.
#[derive(Clone, Default)]
pub struct InMemoryDirectory {
    state: Arc<RwLock<DirectoryState>>,
}

impl InMemoryDirectory {
    /// Create a new empty directory that accepts every bind.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make connections to `url` fail with `error`.
    pub async fn fail_endpoint(&self, url: impl Into<String>, error: DirectoryError) {
        let mut state = self.state.write().await;
        state.unreachable.insert(url.into(), error);
    }

    /// Make `url` reachable again.
    pub async fn restore_endpoint(&self, url: &str) {
        let mut state = self.state.write().await;
        state.unreachable.remove(url);
    }

    /// Accept binds only from registered accounts.
    pub async fn add_account(&self, username: impl Into<String>, secret: impl Into<String>) {
        let mut state = self.state.write().await;
        state.credentials.insert(username.into(), secret.into());
    }

    /// Declare `attribute` mandatory for entries of `object_class`.
    pub async fn require_attribute(&self, object_class: &str, attribute: &str) {
        let mut state = self.state.write().await;
        state
            .required
            .entry(object_class.to_lowercase())
            .or_default()
            .push(attribute.to_string());
    }

    /// Store an entry directly, replacing any entry with the same DN.
    pub async fn insert_entry<I, K, V>(&self, dn: &str, attributes: I)
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        let entry = DirectoryEntry {
            dn: dn.to_string(),
            attributes: attributes
                .into_iter()
                .map(|(name, values)| (name.into(), values.into_iter().map(Into::into).collect()))
                .collect(),
        };
        let mut state = self.state.write().await;
        let key = normalize_dn(dn);
        state.entries.retain(|existing| normalize_dn(&existing.dn) != key);
        state.entries.push(entry);
    }

    /// Fetch a stored entry by DN.
    pub async fn entry(&self, dn: &str) -> Option<DirectoryEntry> {
        let state = self.state.read().await;
        let key = normalize_dn(dn);
        state
            .entries
            .iter()
            .find(|entry| normalize_dn(&entry.dn) == key)
            .cloned()
    }

    /// Get usage statistics.
    pub async fn stats(&self) -> InMemoryDirectoryStats {
        let state = self.state.read().await;
        InMemoryDirectoryStats {
            entries: state.entries.len(),
            ..state.stats.clone()
        }
    }
}

impl DirectoryClient for InMemoryDirectory {
    type Session = InMemorySession;

    async fn connect(&self, url: &str, _timeout: Duration) -> Result<InMemorySession, DirectoryError> {
        let mut state = self.state.write().await;
        state.stats.connect_attempts.push(url.to_string());
        if let Some(error) = state.unreachable.get(url) {
            return Err(error.clone());
        }
        Ok(InMemorySession {
            directory: self.clone(),
            bound: false,
        })
    }
}

/// Session against an [`InMemoryDirectory`].
pub struct InMemorySession {
    directory: InMemoryDirectory,
    bound: bool,
}

impl std::fmt::Debug for InMemorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySession")
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

impl InMemorySession {
    fn ensure_bound(&self) -> Result<(), DirectoryError> {
        if self.bound {
            Ok(())
        } else {
            Err(DirectoryError::result(
                INSUFFICIENT_ACCESS_RIGHTS,
                "operation requires an authenticated session",
            ))
        }
    }
}

impl DirectorySession for InMemorySession {
    async fn bind(&mut self, username: &str, secret: &str) -> Result<(), DirectoryError> {
        let mut state = self.directory.state.write().await;
        let accepted = state.credentials.is_empty()
            || state.credentials.get(username).is_some_and(|stored| stored == secret);
        if accepted {
            state.stats.successful_binds += 1;
            self.bound = true;
            Ok(())
        } else {
            state.stats.failed_binds += 1;
            Err(DirectoryError::result(
                result_code::INVALID_CREDENTIALS,
                "80090308: LdapErr: DSID-0C09042A, comment: AcceptSecurityContext error, data 52e",
            ))
        }
    }

    async fn search_page(
        &mut self,
        request: &SearchRequest,
        page_size: u32,
        cookie: Option<Vec<u8>>,
    ) -> Result<SearchPage, DirectoryError> {
        self.ensure_bound()?;
        let filter = Filter::parse(&request.filter)?;

        let mut state = self.directory.state.write().await;
        state.stats.page_requests += 1;

        let base = resolve_base(&state.entries, &request.base)?;
        let matches: Vec<&DirectoryEntry> = state
            .entries
            .iter()
            .filter(|entry| in_scope(&normalize_dn(&entry.dn), &base, request.scope))
            .filter(|entry| filter.matches(entry))
            .collect();

        let offset = match cookie {
            Some(cookie) if !cookie.is_empty() => String::from_utf8(cookie)
                .ok()
                .and_then(|text| text.parse::<usize>().ok())
                .ok_or_else(|| DirectoryError::result(result_code::OTHER, "invalid paging cookie"))?,
            _ => 0,
        };
        let end = matches.len().min(offset + page_size.max(1) as usize);
        let entries = matches
            .get(offset..end)
            .unwrap_or_default()
            .iter()
            .map(|entry| project(entry, &request.attributes))
            .collect();

        Ok(SearchPage {
            entries,
            cookie: (end < matches.len()).then(|| end.to_string().into_bytes()),
        })
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> Result<(), DirectoryError> {
        self.ensure_bound()?;
        let mut state = self.directory.state.write().await;
        let key = normalize_dn(dn);
        if state.entries.iter().any(|entry| normalize_dn(&entry.dn) == key) {
            return Err(DirectoryError::result(
                result_code::ENTRY_ALREADY_EXISTS,
                "Entry Already Exists",
            ));
        }

        let entry = DirectoryEntry {
            dn: dn.to_string(),
            attributes: attributes.iter().cloned().collect(),
        };
        check_required(&state.required, &entry)?;
        state.entries.push(entry);
        Ok(())
    }

    async fn modify(
        &mut self,
        dn: &str,
        kind: ModifyKind,
        changes: &[(String, Vec<String>)],
    ) -> Result<(), DirectoryError> {
        self.ensure_bound()?;
        let mut state = self.directory.state.write().await;
        let key = normalize_dn(dn);
        let position = state
            .entries
            .iter()
            .position(|entry| normalize_dn(&entry.dn) == key)
            .ok_or_else(|| DirectoryError::result(result_code::NO_SUCH_OBJECT, "No Such Object"))?;

        // Changes apply atomically: work on a copy.
        let mut updated = state.entries[position].clone();
        for (name, values) in changes {
            apply_change(&mut updated, kind, name, values)?;
        }
        check_required(&state.required, &updated)?;
        state.entries[position] = updated;
        Ok(())
    }

    async fn delete(&mut self, dn: &str) -> Result<(), DirectoryError> {
        self.ensure_bound()?;
        let mut state = self.directory.state.write().await;
        let key = normalize_dn(dn);
        let before = state.entries.len();
        state.entries.retain(|entry| normalize_dn(&entry.dn) != key);
        if state.entries.len() == before {
            return Err(DirectoryError::result(
                result_code::NO_SUCH_OBJECT,
                "No Such Object",
            ));
        }
        Ok(())
    }

    async fn unbind(self) -> Result<(), DirectoryError> {
        let mut state = self.directory.state.write().await;
        state.stats.unbinds += 1;
        Ok(())
    }

    fn destroy(self) {
        let counted = match self.directory.state.try_write() {
            Ok(mut state) => {
                state.stats.destroys += 1;
                true
            }
            Err(_) => false,
        };
        if !counted {
            let directory = self.directory;
            tokio::spawn(async move {
                directory.state.write().await.stats.destroys += 1;
            });
        }
    }
}

fn apply_change(
    entry: &mut DirectoryEntry,
    kind: ModifyKind,
    name: &str,
    values: &[String],
) -> Result<(), DirectoryError> {
    let existing_key = entry
        .attributes
        .keys()
        .find(|key| key.eq_ignore_ascii_case(name))
        .cloned();

    match kind {
        ModifyKind::Replace => {
            if let Some(key) = existing_key {
                entry.attributes.remove(&key);
            }
            if !values.is_empty() {
                entry.attributes.insert(name.to_string(), values.to_vec());
            }
        }
        ModifyKind::Add => {
            let key = existing_key.unwrap_or_else(|| name.to_string());
            let current = entry.attributes.entry(key).or_default();
            for value in values {
                if current.iter().any(|v| values_equal(v, value)) {
                    return Err(DirectoryError::result(
                        result_code::ATTRIBUTE_OR_VALUE_EXISTS,
                        format!("Type or value exists: {}", name),
                    ));
                }
                current.push(value.clone());
            }
        }
        ModifyKind::Delete => {
            let Some(key) = existing_key else {
                return Err(DirectoryError::result(
                    NO_SUCH_ATTRIBUTE,
                    format!("No such attribute: {}", name),
                ));
            };
            if values.is_empty() {
                entry.attributes.remove(&key);
                return Ok(());
            }
            let current = entry.attributes.entry(key.clone()).or_default();
            for value in values {
                let index = current
                    .iter()
                    .position(|v| values_equal(v, value))
                    .ok_or_else(|| {
                        DirectoryError::result(
                            NO_SUCH_ATTRIBUTE,
                            format!("No such attribute value: {}", name),
                        )
                    })?;
                current.remove(index);
            }
            if current.is_empty() {
                entry.attributes.remove(&key);
            }
        }
    }
    Ok(())
}

fn check_required(
    required: &HashMap<String, Vec<String>>,
    entry: &DirectoryEntry,
) -> Result<(), DirectoryError> {
    for class in attribute_values(entry, "objectClass") {
        let Some(attributes) = required.get(&class.to_lowercase()) else {
            continue;
        };
        for attribute in attributes {
            if attribute_values(entry, attribute).is_empty() {
                return Err(DirectoryError::result(
                    result_code::OBJECT_CLASS_VIOLATION,
                    format!(
                        "Objectclass Violation: object class '{}' requires attribute '{}'",
                        class, attribute
                    ),
                ));
            }
        }
    }
    Ok(())
}

fn attribute_values<'a>(entry: &'a DirectoryEntry, name: &str) -> &'a [String] {
    entry
        .attributes
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, values)| values.as_slice())
        .unwrap_or_default()
}

/// Resolve a search base, including `<SID=...>` and `<GUID=...>` forms, to a normalized DN.
fn resolve_base(entries: &[DirectoryEntry], base: &str) -> Result<String, DirectoryError> {
    let no_object = || {
        DirectoryError::result(
            result_code::NO_SUCH_OBJECT,
            format!("NO_OBJECT: {}", base),
        )
    };

    let found = if let Some(sid) = base.strip_prefix("<SID=").and_then(|s| s.strip_suffix('>')) {
        entries.iter().find(|entry| {
            attribute_values(entry, "objectSid")
                .iter()
                .any(|value| value.eq_ignore_ascii_case(sid))
        })
    } else if let Some(hex) = base.strip_prefix("<GUID=").and_then(|s| s.strip_suffix('>')) {
        entries.iter().find(|entry| {
            attribute_values(entry, "objectGUID").iter().any(|value| {
                STANDARD
                    .decode(value)
                    .map(|bytes| to_hex(&bytes).eq_ignore_ascii_case(hex))
                    .unwrap_or(false)
            })
        })
    } else {
        let key = normalize_dn(base);
        entries.iter().find(|entry| normalize_dn(&entry.dn) == key)
    };

    found.map(|entry| normalize_dn(&entry.dn)).ok_or_else(no_object)
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::OneLevel => parent_dn(dn) == Some(base),
        SearchScope::Subtree => {
            dn == base || (dn.len() > base.len() && dn.ends_with(base) && dn[..dn.len() - base.len()].ends_with(','))
        }
    }
}

fn parent_dn(dn: &str) -> Option<&str> {
    let first = split_rdns(dn).into_iter().next()?;
    dn[first.len()..].strip_prefix(',')
}

/// Split a DN on unescaped commas.
fn split_rdns(dn: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut escaped = false;
    for (i, ch) in dn.char_indices() {
        match ch {
            '\\' if !escaped => escaped = true,
            ',' if !escaped => {
                parts.push(&dn[start..i]);
                start = i + 1;
            }
            _ => escaped = false,
        }
    }
    parts.push(&dn[start..]);
    parts
}

/// Case- and whitespace-insensitive form of a DN used for comparisons.
fn normalize_dn(dn: &str) -> String {
    split_rdns(dn)
        .iter()
        .map(|rdn| {
            let rdn = rdn.trim();
            match rdn.split_once('=') {
                Some((attr, value)) => format!("{}={}", attr.trim(), value.trim()),
                None => rdn.to_string(),
            }
            .to_lowercase()
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn values_equal(a: &str, b: &str) -> bool {
    normalize_dn(a) == normalize_dn(b)
}

fn project(entry: &DirectoryEntry, attributes: &[String]) -> DirectoryEntry {
    let all = attributes.is_empty() || attributes.iter().any(|a| a == "*");
    DirectoryEntry {
        dn: entry.dn.clone(),
        attributes: entry
            .attributes
            .iter()
            .filter(|(name, values)| {
                !values.is_empty()
                    && (all || attributes.iter().any(|a| a.eq_ignore_ascii_case(name)))
            })
            .map(|(name, values)| (name.clone(), values.clone()))
            .collect::<BTreeMap<_, _>>(),
    }
}

/// The filter subset understood by the in-memory directory.
#[derive(Debug, Clone, PartialEq)]
enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equal(String, String),
    Present(String),
}

impl Filter {
    fn parse(text: &str) -> Result<Self, DirectoryError> {
        let chars: Vec<char> = text.trim().chars().collect();
        let mut position = 0;
        let filter = Self::parse_at(&chars, &mut position)?;
        if position != chars.len() {
            return Err(filter_error(text));
        }
        Ok(filter)
    }

    fn parse_at(chars: &[char], position: &mut usize) -> Result<Self, DirectoryError> {
        let source: String = chars.iter().collect();
        if chars.get(*position) != Some(&'(') {
            return Err(filter_error(&source));
        }
        *position += 1;

        let filter = match chars.get(*position) {
            Some('&') | Some('|') => {
                let conjunction = chars[*position] == '&';
                *position += 1;
                let mut parts = Vec::new();
                while chars.get(*position) == Some(&'(') {
                    parts.push(Self::parse_at(chars, position)?);
                }
                if conjunction {
                    Filter::And(parts)
                } else {
                    Filter::Or(parts)
                }
            }
            Some('!') => {
                *position += 1;
                Filter::Not(Box::new(Self::parse_at(chars, position)?))
            }
            Some(_) => {
                let start = *position;
                while chars.get(*position).is_some_and(|c| *c != ')') {
                    *position += 1;
                }
                let item: String = chars[start..*position].iter().collect();
                let (attribute, value) = item
                    .split_once('=')
                    .ok_or_else(|| filter_error(&source))?;
                if value == "*" {
                    Filter::Present(attribute.trim().to_string())
                } else {
                    Filter::Equal(attribute.trim().to_string(), unescape(value)?)
                }
            }
            None => return Err(filter_error(&source)),
        };

        if chars.get(*position) != Some(&')') {
            return Err(filter_error(&source));
        }
        *position += 1;
        Ok(filter)
    }

    fn matches(&self, entry: &DirectoryEntry) -> bool {
        match self {
            Filter::And(parts) => parts.iter().all(|part| part.matches(entry)),
            Filter::Or(parts) => parts.iter().any(|part| part.matches(entry)),
            Filter::Not(inner) => !inner.matches(entry),
            Filter::Present(attribute) => {
                attribute.eq_ignore_ascii_case("objectClass")
                    || !attribute_values(entry, attribute).is_empty()
            }
            Filter::Equal(attribute, value) => attribute_values(entry, attribute)
                .iter()
                .any(|candidate| values_equal(candidate, value)),
        }
    }
}

fn filter_error(text: &str) -> DirectoryError {
    DirectoryError::result(FILTER_ERROR, format!("Bad search filter: {}", text))
}

/// Undo RFC 4515 `\XX` escapes.
fn unescape(value: &str) -> Result<String, DirectoryError> {
    let mut bytes = Vec::with_capacity(value.len());
    let raw = value.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        if raw[i] == b'\\' {
            let hex = value
                .get(i + 1..i + 3)
                .and_then(|h| u8::from_str_radix(h, 16).ok())
                .ok_or_else(|| filter_error(value))?;
            bytes.push(hex);
            i += 3;
        } else {
            bytes.push(raw[i]);
            i += 1;
        }
    }
    String::from_utf8(bytes).map_err(|_| filter_error(value))
}
