//! LDAP backend built on the `ldap3` crate.

use super::{
    DirectoryClient, DirectoryEntry, DirectoryError, DirectorySession, ModifyKind, SearchPage,
    SearchRequest, SearchScope,
};
use crate::membership::Sid;
use base64::{Engine as _, engine::general_purpose::STANDARD};
use ldap3::controls::{Control, ControlType, PagedResults, RawControl};
use ldap3::{Ldap, LdapConnAsync, LdapConnSettings, LdapError, Mod, Scope, SearchEntry, SearchResult};
use log::{debug, warn};
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::time::Duration;

/// Directory client speaking LDAP (`ldap://` and `ldaps://` URLs).
#[derive(Debug, Clone, Default)]
pub struct LdapDirectory {
    no_tls_verify: bool,
}

impl LdapDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip certificate verification for `ldaps://` endpoints.
    pub fn with_no_tls_verify(mut self, no_tls_verify: bool) -> Self {
        self.no_tls_verify = no_tls_verify;
        self
    }
}

/// A live LDAP session.
pub struct LdapSession {
    ldap: Ldap,
    url: String,
}

impl DirectoryClient for LdapDirectory {
    type Session = LdapSession;

    async fn connect(&self, url: &str, timeout: Duration) -> Result<LdapSession, DirectoryError> {
        debug!("Connecting to LDAP server {}", url);

        let settings = LdapConnSettings::new()
            .set_conn_timeout(timeout)
            .set_no_tls_verify(self.no_tls_verify);

        let (conn, ldap) = LdapConnAsync::with_settings(settings, url)
            .await
            .map_err(|e| classify(url, e))?;

        let driver_url = url.to_string();
        tokio::spawn(async move {
            if let Err(e) = conn.drive().await {
                warn!("LDAP connection driver error for {}: {}", driver_url, e);
            }
        });

        Ok(LdapSession {
            ldap,
            url: url.to_string(),
        })
    }
}

impl DirectorySession for LdapSession {
    async fn bind(&mut self, username: &str, secret: &str) -> Result<(), DirectoryError> {
        let result = self
            .ldap
            .simple_bind(username, secret)
            .await
            .map_err(|e| classify(&self.url, e))?;
        check(result.rc, result.text)
    }

    async fn search_page(
        &mut self,
        request: &SearchRequest,
        page_size: u32,
        cookie: Option<Vec<u8>>,
    ) -> Result<SearchPage, DirectoryError> {
        let control = PagedResults {
            size: i32::try_from(page_size).unwrap_or(i32::MAX),
            cookie: cookie.unwrap_or_default(),
        };
        let scope = match request.scope {
            SearchScope::Base => Scope::Base,
            SearchScope::OneLevel => Scope::OneLevel,
            SearchScope::Subtree => Scope::Subtree,
        };

        let SearchResult(entries, result) = self
            .ldap
            .with_controls(vec![RawControl::from(control)])
            .search(&request.base, scope, &request.filter, request.attributes.clone())
            .await
            .map_err(|e| classify(&self.url, e))?;

        if result.rc != 0 {
            return Err(DirectoryError::result(result.rc, result.text));
        }

        let next = result.ctrls.iter().find_map(|ctrl| match ctrl {
            Control(Some(ControlType::PagedResults), raw) => {
                Some(raw.parse::<PagedResults>().cookie)
            }
            _ => None,
        });

        let entries = entries
            .into_iter()
            .map(|entry| render_entry(SearchEntry::construct(entry)))
            .collect();

        Ok(SearchPage {
            entries,
            cookie: next.filter(|cookie| !cookie.is_empty()),
        })
    }

    async fn add(
        &mut self,
        dn: &str,
        attributes: &[(String, Vec<String>)],
    ) -> Result<(), DirectoryError> {
        let attrs: Vec<(String, HashSet<String>)> = attributes
            .iter()
            .map(|(name, values)| (name.clone(), values.iter().cloned().collect()))
            .collect();
        let result = self
            .ldap
            .add(dn, attrs)
            .await
            .map_err(|e| classify(&self.url, e))?;
        check(result.rc, result.text)
    }

    async fn modify(
        &mut self,
        dn: &str,
        kind: ModifyKind,
        changes: &[(String, Vec<String>)],
    ) -> Result<(), DirectoryError> {
        let mods: Vec<Mod<String>> = changes
            .iter()
            .map(|(name, values)| {
                let values: HashSet<String> = values
                    .iter()
                    .filter(|value| !value.is_empty() || kind == ModifyKind::Replace)
                    .cloned()
                    .collect();
                match kind {
                    ModifyKind::Replace => Mod::Replace(name.clone(), values),
                    ModifyKind::Add => Mod::Add(name.clone(), values),
                    ModifyKind::Delete => Mod::Delete(name.clone(), values),
                }
            })
            .collect();
        let result = self
            .ldap
            .modify(dn, mods)
            .await
            .map_err(|e| classify(&self.url, e))?;
        check(result.rc, result.text)
    }

    async fn delete(&mut self, dn: &str) -> Result<(), DirectoryError> {
        let result = self
            .ldap
            .delete(dn)
            .await
            .map_err(|e| classify(&self.url, e))?;
        check(result.rc, result.text)
    }

    async fn unbind(mut self) -> Result<(), DirectoryError> {
        self.ldap.unbind().await.map_err(|e| classify(&self.url, e))
    }

    fn destroy(self) {
        // Dropping the last handle closes the channel and stops the driver.
        drop(self.ldap);
    }
}

fn check(rc: u32, text: String) -> Result<(), DirectoryError> {
    if rc == 0 {
        Ok(())
    } else {
        Err(DirectoryError::result(rc, text))
    }
}

/// Map an `ldap3` error onto the connector's transient/permanent split.
fn classify(endpoint: &str, error: LdapError) -> DirectoryError {
    match error {
        LdapError::Io { source } => match source.kind() {
            io::ErrorKind::ConnectionRefused => DirectoryError::Refused {
                endpoint: endpoint.to_string(),
                message: source.to_string(),
            },
            io::ErrorKind::TimedOut => DirectoryError::Timeout {
                endpoint: endpoint.to_string(),
                message: source.to_string(),
            },
            _ => DirectoryError::Io {
                message: source.to_string(),
            },
        },
        LdapError::LdapResult { result } => DirectoryError::result(result.rc, result.text),
        other => {
            let message = other.to_string();
            let lowered = message.to_lowercase();
            if lowered.contains("timeout") || lowered.contains("timed out") || lowered.contains("elapsed") {
                DirectoryError::Timeout {
                    endpoint: endpoint.to_string(),
                    message,
                }
            } else if lowered.contains("refused") {
                DirectoryError::Refused {
                    endpoint: endpoint.to_string(),
                    message,
                }
            } else {
                DirectoryError::Io { message }
            }
        }
    }
}

/// Attributes holding binary values even when their bytes happen to be valid UTF-8.
const BINARY_ATTRIBUTES: &[&str] = &["objectGUID", "objectSid"];

fn is_binary(name: &str) -> bool {
    BINARY_ATTRIBUTES.iter().any(|b| b.eq_ignore_ascii_case(name))
}

/// Text form of a binary value: SIDs in `S-1-...` form, everything else base64.
fn render_binary(name: &str, bytes: &[u8]) -> String {
    if name.eq_ignore_ascii_case("objectSid") {
        Sid::from_bytes(bytes)
            .map(|sid| sid.to_string())
            .unwrap_or_else(|_| STANDARD.encode(bytes))
    } else {
        STANDARD.encode(bytes)
    }
}

/// Render binary attributes as text.
fn render_entry(entry: SearchEntry) -> DirectoryEntry {
    let mut attributes = BTreeMap::new();

    for (name, values) in entry.attrs {
        let values = if is_binary(&name) {
            values
                .iter()
                .map(|value| render_binary(&name, value.as_bytes()))
                .collect()
        } else {
            values
        };
        attributes.insert(name, values);
    }
    for (name, values) in entry.bin_attrs {
        let rendered = values.iter().map(|bytes| render_binary(&name, bytes)).collect();
        attributes.insert(name, rendered);
    }

    DirectoryEntry {
        dn: entry.dn,
        attributes,
    }
}
