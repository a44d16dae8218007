//! Minimal SCIM filter parsing.
//!
//! Only single attribute comparisons are understood. Expressions combining
//! comparisons with `and`, `or`, `not`, grouping parentheses or value-path
//! brackets are recognized as advanced and left unparsed.

use crate::error::{ConnectorError, ConnectorResult};

const OPERATORS: &[&str] = &["eq", "ne", "co", "sw", "ew", "gt", "ge", "lt", "le", "pr"];
const LOGICAL: &[&str] = &["and", "or", "not"];

/// A parsed list filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScimFilter {
    /// `<attribute> eq <value>`
    Equals {
        attribute: String,
        value: String,
        raw: String,
    },
    /// Any other single comparison, e.g. `userName sw "b"` or `title pr`
    Other {
        attribute: String,
        operator: String,
        raw: String,
    },
    /// Logical combinations and complex attribute filters
    Advanced { raw: String },
}

impl ScimFilter {
    /// Parse filter text; blank text means "no filter".
    pub fn parse(text: &str) -> ConnectorResult<Option<Self>> {
        let raw = text.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let invalid = || ConnectorError::invalid_request(format!("invalid filter: {}", raw));

        let tokens = tokenize(raw).ok_or_else(invalid)?;
        let advanced = tokens.iter().any(|token| {
            !token.quoted
                && (LOGICAL.iter().any(|op| token.text.eq_ignore_ascii_case(op))
                    || token.text.starts_with('(')
                    || token.text.contains('['))
        });
        if advanced {
            return Ok(Some(Self::Advanced {
                raw: raw.to_string(),
            }));
        }

        let raw = raw.to_string();
        match tokens.as_slice() {
            [attribute, operator]
                if !attribute.quoted && operator.text.eq_ignore_ascii_case("pr") =>
            {
                Ok(Some(Self::Other {
                    attribute: attribute.text.clone(),
                    operator: "pr".to_string(),
                    raw,
                }))
            }
            [attribute, operator, value] if !attribute.quoted && !operator.quoted => {
                let operator = operator.text.to_ascii_lowercase();
                if !OPERATORS.contains(&operator.as_str()) || operator == "pr" {
                    return Err(invalid());
                }
                if operator == "eq" {
                    Ok(Some(Self::Equals {
                        attribute: attribute.text.clone(),
                        value: value.text.clone(),
                        raw,
                    }))
                } else {
                    Ok(Some(Self::Other {
                        attribute: attribute.text.clone(),
                        operator,
                        raw,
                    }))
                }
            }
            _ => Err(invalid()),
        }
    }

    /// The filter text as received.
    pub fn raw(&self) -> &str {
        match self {
            Self::Equals { raw, .. } | Self::Other { raw, .. } | Self::Advanced { raw } => raw,
        }
    }
}

struct Token {
    text: String,
    quoted: bool,
}

/// Split on whitespace outside of double quotes; quotes are removed and `\"`
/// unescaped. `None` for an unterminated quote.
fn tokenize(text: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c == '"' {
            chars.next();
            let mut value = String::new();
            let mut closed = false;
            while let Some(c) = chars.next() {
                match c {
                    '\\' => value.push(chars.next()?),
                    '"' => {
                        closed = true;
                        break;
                    }
                    other => value.push(other),
                }
            }
            if !closed {
                return None;
            }
            tokens.push(Token {
                text: value,
                quoted: true,
            });
        } else {
            let mut word = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() {
                    break;
                }
                word.push(c);
                chars.next();
            }
            tokens.push(Token {
                text: word,
                quoted: false,
            });
        }
    }
    Some(tokens)
}
