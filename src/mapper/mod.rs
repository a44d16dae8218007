//! Attribute mapping between the canonical schema and directory attributes.
//!
//! An [`AttributeMap`] is configured per entity kind as a mapping from native
//! attribute name to a [`MappingSpec`]:
//!
//! ```json
//! {
//!   "uid":       { "mapTo": "userName", "type": "string" },
//!   "givenName": { "mapTo": "name.givenName", "type": "string" },
//!   "mail":      { "mapTo": "emails.work.value", "type": "string" },
//!   "memberOf":  { "mapTo": "groups.value", "type": "dn", "direction": "inbound" }
//! }
//! ```
//!
//! Canonical names are dotted paths. Two segments ending in `value` address a
//! list of `{"value": ...}` objects, three segments address one field of a
//! typed list element (`emails.work.value`), and anything else addresses a
//! nested object.
//!
//! # Example Usage
//!
//! ```rust
//! use scim_ldap_connector::mapper::{AttributeMap, Direction, TranslationRule};
//! use serde_json::json;
//!
//! let map = AttributeMap::new()
//!     .with_mapping("uid", "userName", TranslationRule::String, Direction::Both)
//!     .with_mapping("sn", "name.familyName", TranslationRule::String, Direction::Both);
//!
//! let record = map
//!     .outbound_object(&json!({"userName": "bjensen", "name": {"familyName": "Jensen"}}))
//!     .unwrap();
//! assert_eq!(record.get("sn").and_then(|v| v.first()), Some("Jensen"));
//!
//! let canonical = map.inbound(&record);
//! assert_eq!(canonical["name"]["familyName"], "Jensen");
//! ```

mod path;
mod rules;

use crate::directory::{DN_KEY, NativeRecord};
use crate::error::{ConnectorError, ConnectorResult};
use path::{CanonicalPath, PRESENTATION_KEYS, get_ci};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Protocol envelope keys that are never translated.
const ENVELOPE_KEYS: &[&str] = &["schemas", "meta"];

/// How values of a mapped attribute are converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TranslationRule {
    /// Direct copy
    #[default]
    String,
    /// Multi-valued list
    Array,
    /// `TRUE`/`FALSE` to and from JSON booleans
    Boolean,
    Integer,
    /// Generalized time to and from RFC 3339
    DateTime,
    /// Whole sub-object stored as JSON text
    Composite,
    /// Distinguished name, percent-encoded towards callers
    Dn,
}

/// Which way a mapping translates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    #[default]
    Both,
    /// Canonical to native only
    Outbound,
    /// Native to canonical only
    Inbound,
}

/// What to do with a canonical name that has no mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnknownAttributePolicy {
    /// Skip it (attribute selection lists)
    Drop,
    /// Fail with a translation error
    Reject,
}

/// Configuration form of a single mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MappingSpec {
    pub map_to: String,
    #[serde(rename = "type", default)]
    pub rule: TranslationRule,
    #[serde(default)]
    pub direction: Direction,
}

/// One native-to-canonical attribute mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeMapping {
    native: String,
    canonical: String,
    rule: TranslationRule,
    direction: Direction,
    path: CanonicalPath,
}

impl AttributeMapping {
    pub fn new(
        native: impl Into<String>,
        canonical: impl Into<String>,
        rule: TranslationRule,
        direction: Direction,
    ) -> Self {
        let canonical = canonical.into();
        Self {
            native: native.into(),
            path: CanonicalPath::parse(&canonical),
            canonical,
            rule,
            direction,
        }
    }

    pub fn native(&self) -> &str {
        &self.native
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    pub fn rule(&self) -> TranslationRule {
        self.rule
    }

    pub fn is_outbound(&self) -> bool {
        self.direction != Direction::Inbound
    }

    pub fn is_inbound(&self) -> bool {
        self.direction != Direction::Outbound
    }

    /// Whether this mapping selects `name`, either exactly or as a parent path.
    fn selected_by(&self, name: &str) -> bool {
        self.canonical.eq_ignore_ascii_case(name) || is_parent_path(name, &self.canonical)
    }
}

/// Whether `parent` is a dotted ancestor of `path`, ignoring case.
fn is_parent_path(parent: &str, path: &str) -> bool {
    path.len() > parent.len()
        && path.as_bytes()[parent.len()] == b'.'
        && path
            .get(..parent.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(parent))
}

/// Bidirectional attribute map for one entity kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    from = "BTreeMap<String, MappingSpec>",
    into = "BTreeMap<String, MappingSpec>"
)]
pub struct AttributeMap {
    mappings: Vec<AttributeMapping>,
}

impl From<BTreeMap<String, MappingSpec>> for AttributeMap {
    fn from(specs: BTreeMap<String, MappingSpec>) -> Self {
        Self {
            mappings: specs
                .into_iter()
                .map(|(native, spec)| {
                    AttributeMapping::new(native, spec.map_to, spec.rule, spec.direction)
                })
                .collect(),
        }
    }
}

impl From<AttributeMap> for BTreeMap<String, MappingSpec> {
    fn from(map: AttributeMap) -> Self {
        map.mappings
            .into_iter()
            .map(|m| {
                (
                    m.native,
                    MappingSpec {
                        map_to: m.canonical,
                        rule: m.rule,
                        direction: m.direction,
                    },
                )
            })
            .collect()
    }
}

impl AttributeMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping.
    pub fn with_mapping(
        mut self,
        native: impl Into<String>,
        canonical: impl Into<String>,
        rule: TranslationRule,
        direction: Direction,
    ) -> Self {
        self.mappings
            .push(AttributeMapping::new(native, canonical, rule, direction));
        self
    }

    pub fn mappings(&self) -> impl Iterator<Item = &AttributeMapping> {
        self.mappings.iter()
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    /// Reject empty targets and canonical names mapped outbound more than once.
    pub fn validate(&self, section: &str) -> ConnectorResult<()> {
        for (index, mapping) in self.mappings.iter().enumerate() {
            if mapping.canonical.trim().is_empty() {
                return Err(ConnectorError::configuration(format!(
                    "{}.{}.mapTo must not be empty",
                    section, mapping.native
                )));
            }
            let duplicate = self.mappings[..index].iter().any(|other| {
                other.is_outbound()
                    && mapping.is_outbound()
                    && other.canonical.eq_ignore_ascii_case(&mapping.canonical)
            });
            if duplicate {
                return Err(ConnectorError::configuration(format!(
                    "{}: canonical attribute '{}' is mapped more than once",
                    section, mapping.canonical
                )));
            }
        }
        Ok(())
    }

    fn find(&self, canonical: &str) -> Option<&AttributeMapping> {
        self.mappings
            .iter()
            .find(|m| m.canonical.eq_ignore_ascii_case(canonical))
    }

    /// Native name of a canonical attribute.
    pub fn outbound_name(&self, canonical: &str) -> ConnectorResult<&str> {
        self.find(canonical)
            .map(|m| m.native.as_str())
            .ok_or_else(|| {
                ConnectorError::translation(format!(
                    "attribute '{}' is not mapped to a directory attribute",
                    canonical
                ))
            })
    }

    /// Native names for an attribute selection list.
    ///
    /// A parent name such as `name` or `emails` selects every mapping below it.
    /// Duplicates are removed; the order follows the first selection.
    pub fn outbound_names<S: AsRef<str>>(
        &self,
        names: &[S],
        policy: UnknownAttributePolicy,
    ) -> ConnectorResult<Vec<String>> {
        let mut natives: Vec<String> = Vec::new();
        for name in names {
            let name = name.as_ref();
            let mut matched = false;
            for mapping in self.mappings.iter().filter(|m| m.selected_by(name)) {
                matched = true;
                if !natives.iter().any(|n| n.eq_ignore_ascii_case(&mapping.native)) {
                    natives.push(mapping.native.clone());
                }
            }
            if !matched && policy == UnknownAttributePolicy::Reject {
                return Err(ConnectorError::translation(format!(
                    "attribute '{}' is not mapped to a directory attribute",
                    name
                )));
            }
        }
        Ok(natives)
    }

    /// Translate a single filter operand, returning the native name and value.
    pub fn outbound_scalar(&self, canonical: &str, value: &str) -> ConnectorResult<(&str, String)> {
        let mapping = self.find(canonical).ok_or_else(|| {
            ConnectorError::translation(format!(
                "attribute '{}' is not mapped to a directory attribute",
                canonical
            ))
        })?;
        let native = rules::to_native(mapping.rule, &mapping.canonical, &Value::String(value.to_string()))?;
        let text = native.first().unwrap_or_default().to_string();
        Ok((mapping.native.as_str(), text))
    }

    /// Translate a canonical payload into a native record.
    ///
    /// Every value-carrying path of the payload must be covered by an outbound
    /// mapping. The `schemas` and `meta` envelope keys are ignored.
    pub fn outbound_object(&self, canonical: &Value) -> ConnectorResult<NativeRecord> {
        let object = canonical
            .as_object()
            .ok_or_else(|| ConnectorError::invalid_request("payload must be a JSON object"))?;

        let mut uncovered = Vec::new();
        for (key, value) in object {
            if ENVELOPE_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                continue;
            }
            self.collect_uncovered(key, value, &mut uncovered);
        }
        if !uncovered.is_empty() {
            return Err(ConnectorError::translation(format!(
                "attribute '{}' is not mapped to a directory attribute",
                uncovered.join("', '")
            )));
        }

        let mut record = NativeRecord::new();
        for mapping in self.mappings.iter().filter(|m| m.is_outbound()) {
            if let Some(value) = mapping.path.extract(object) {
                let native = rules::to_native(mapping.rule, &mapping.canonical, &value)?;
                record.insert(mapping.native.clone(), native);
            }
        }
        Ok(record)
    }

    fn covers(&self, path: &str) -> bool {
        self.mappings.iter().any(|m| {
            m.is_outbound()
                && (m.canonical.eq_ignore_ascii_case(path) || is_parent_path(&m.canonical, path))
        })
    }

    fn collect_uncovered(&self, path: &str, value: &Value, uncovered: &mut Vec<String>) {
        if self.covers(path) {
            return;
        }
        match value {
            Value::Object(fields) => {
                for (key, child) in fields {
                    self.collect_uncovered(&format!("{}.{}", path, key), child, uncovered);
                }
            }
            Value::Array(elements) => {
                for element in elements {
                    match element {
                        Value::Object(fields) => {
                            let kind = get_ci(fields, "type").and_then(Value::as_str);
                            for (key, child) in fields {
                                let skip = PRESENTATION_KEYS.iter().any(|k| k.eq_ignore_ascii_case(key))
                                    || (kind.is_some() && key.eq_ignore_ascii_case("type"));
                                if skip {
                                    continue;
                                }
                                let child_path = match kind {
                                    Some(kind) => format!("{}.{}.{}", path, kind, key),
                                    None => format!("{}.{}", path, key),
                                };
                                self.collect_uncovered(&child_path, child, uncovered);
                            }
                        }
                        _ => {
                            if !uncovered.iter().any(|p| p == path) {
                                uncovered.push(path.to_string());
                            }
                        }
                    }
                }
            }
            _ => uncovered.push(path.to_string()),
        }
    }

    /// Translate a native record into a canonical object.
    ///
    /// Native attributes missing from the record are omitted from the result.
    pub fn inbound(&self, record: &NativeRecord) -> Value {
        let mut object = Map::new();
        for mapping in self.mappings.iter().filter(|m| m.is_inbound()) {
            let Some(native) = record.get(&mapping.native) else {
                continue;
            };
            if let Some(value) = rules::to_canonical(mapping.rule, native) {
                mapping.path.insert(&mut object, value);
            }
        }
        Value::Object(object)
    }

    /// Every canonical name that can be reported back.
    pub fn all_canonical_names(&self) -> Vec<String> {
        self.mappings
            .iter()
            .filter(|m| m.is_inbound())
            .map(|m| m.canonical.clone())
            .collect()
    }

    /// Native attributes to request from the directory for a selection list.
    ///
    /// An empty selection requests every inbound mapping. The reserved `dn` is
    /// never requested; it accompanies every search result.
    pub fn search_attributes<S: AsRef<str>>(&self, selection: &[S]) -> ConnectorResult<Vec<String>> {
        let natives = if selection.is_empty() {
            self.outbound_names(&self.all_canonical_names(), UnknownAttributePolicy::Drop)?
        } else {
            self.outbound_names(selection, UnknownAttributePolicy::Drop)?
        };
        Ok(natives
            .into_iter()
            .filter(|n| !n.eq_ignore_ascii_case(DN_KEY))
            .collect())
    }
}
