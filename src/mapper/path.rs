//! Dotted canonical attribute paths.

use serde_json::{Map, Value};

/// Sub-attributes of multi-valued elements that carry presentation only.
pub(crate) const PRESENTATION_KEYS: &[&str] = &["primary", "display", "$ref"];

/// Shape of a canonical attribute path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum CanonicalPath {
    /// `userName`, `name.givenName` or an extension attribute
    Nested(Vec<String>),
    /// `members.value`: list of `{"value": ...}` objects
    ValueList(String),
    /// `emails.work.value`: `field` of the list element whose `type` is `kind`
    Typed {
        attribute: String,
        kind: String,
        field: String,
    },
}

impl CanonicalPath {
    pub(crate) fn parse(path: &str) -> Self {
        let segments = split_segments(path);
        let urn = segments.first().is_some_and(|first| is_urn(first));
        match segments.as_slice() {
            [attribute, last] if !urn && last == "value" => Self::ValueList(attribute.clone()),
            [attribute, kind, field] if !urn => Self::Typed {
                attribute: attribute.clone(),
                kind: kind.clone(),
                field: field.clone(),
            },
            _ => Self::Nested(segments),
        }
    }

    /// Read the canonical value this path addresses.
    ///
    /// Value lists come back as an array of the element values.
    pub(crate) fn extract(&self, object: &Map<String, Value>) -> Option<Value> {
        match self {
            Self::Nested(segments) => {
                let (last, parents) = segments.split_last()?;
                let mut current = object;
                for segment in parents {
                    current = get_ci(current, segment)?.as_object()?;
                }
                get_ci(current, last).cloned()
            }
            Self::ValueList(attribute) => match get_ci(object, attribute)? {
                Value::Array(elements) => Some(Value::Array(
                    elements
                        .iter()
                        .filter_map(|element| match element {
                            Value::Object(fields) => get_ci(fields, "value").cloned(),
                            other => Some(other.clone()),
                        })
                        .collect(),
                )),
                Value::Object(fields) => get_ci(fields, "value").cloned(),
                scalar => Some(scalar.clone()),
            },
            Self::Typed {
                attribute,
                kind,
                field,
            } => match get_ci(object, attribute)? {
                Value::Array(elements) => elements.iter().find_map(|element| {
                    let fields = element.as_object()?;
                    let element_kind = get_ci(fields, "type")?.as_str()?;
                    if element_kind.eq_ignore_ascii_case(kind) {
                        get_ci(fields, field).cloned()
                    } else {
                        None
                    }
                }),
                Value::Object(by_kind) => get_ci(by_kind, kind)?
                    .as_object()
                    .and_then(|fields| get_ci(fields, field))
                    .cloned(),
                _ => None,
            },
        }
    }

    /// Place an inbound value at this path.
    pub(crate) fn insert(&self, object: &mut Map<String, Value>, value: Value) {
        match self {
            Self::Nested(segments) => {
                let Some((last, parents)) = segments.split_last() else {
                    return;
                };
                let mut current = object;
                for segment in parents {
                    let slot = current
                        .entry(segment.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if !slot.is_object() {
                        *slot = Value::Object(Map::new());
                    }
                    let Value::Object(next) = slot else {
                        return;
                    };
                    current = next;
                }
                current.insert(last.clone(), value);
            }
            Self::ValueList(attribute) => {
                let Some(elements) = list_slot(object, attribute) else {
                    return;
                };
                let values = match value {
                    Value::Array(values) => values,
                    single => vec![single],
                };
                for value in values {
                    let mut element = Map::new();
                    element.insert("value".to_string(), value);
                    elements.push(Value::Object(element));
                }
            }
            Self::Typed {
                attribute,
                kind,
                field,
            } => {
                let Some(elements) = list_slot(object, attribute) else {
                    return;
                };
                let position = elements.iter().position(|element| {
                    element
                        .get("type")
                        .and_then(Value::as_str)
                        .is_some_and(|t| t.eq_ignore_ascii_case(kind))
                });
                let index = match position {
                    Some(index) => index,
                    None => {
                        let mut element = Map::new();
                        element.insert("type".to_string(), Value::String(kind.clone()));
                        elements.push(Value::Object(element));
                        elements.len() - 1
                    }
                };
                if let Some(Value::Object(element)) = elements.get_mut(index) {
                    element.insert(field.clone(), value);
                }
            }
        }
    }
}

fn list_slot<'a>(object: &'a mut Map<String, Value>, attribute: &str) -> Option<&'a mut Vec<Value>> {
    let slot = object
        .entry(attribute.to_string())
        .or_insert_with(|| Value::Array(Vec::new()));
    if !slot.is_array() {
        *slot = Value::Array(Vec::new());
    }
    slot.as_array_mut()
}

/// Look up a key, falling back to a case-insensitive match.
pub(crate) fn get_ci<'a>(object: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    object.get(key).or_else(|| {
        object
            .iter()
            .find(|(candidate, _)| candidate.eq_ignore_ascii_case(key))
            .map(|(_, value)| value)
    })
}

fn is_urn(segment: &str) -> bool {
    segment
        .get(..4)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("urn:"))
}

/// Split a path on dots, keeping a schema URN prefix (which contains dots) intact.
///
/// `urn:ietf:params:scim:schemas:extension:enterprise:2.0:User.manager.value`
/// splits into the URN-qualified schema key followed by `manager` and `value`.
fn split_segments(path: &str) -> Vec<String> {
    if is_urn(path) {
        if let Some(colon) = path.rfind(':') {
            let (prefix, tail) = path.split_at(colon + 1);
            let mut rest = tail.split('.');
            let head = format!("{}{}", prefix, rest.next().unwrap_or_default());
            return std::iter::once(head)
                .chain(rest.map(str::to_string))
                .collect();
        }
    }
    path.split('.').map(str::to_string).collect()
}
