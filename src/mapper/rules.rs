//! Value coercion between canonical JSON values and native attribute values.

use super::TranslationRule;
use crate::directory::NativeValue;
use crate::error::{ConnectorError, ConnectorResult};
use crate::membership::{decode_id, encode_id};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde_json::Value;

const GENERALIZED_TIME: &str = "%Y%m%d%H%M%S";

/// Convert a canonical value into native values following `rule`.
///
/// `null` yields an empty value list, which clears the attribute on replace.
pub(crate) fn to_native(rule: TranslationRule, name: &str, value: &Value) -> ConnectorResult<NativeValue> {
    if value.is_null() {
        return Ok(NativeValue::Multi(Vec::new()));
    }

    let values = match rule {
        TranslationRule::Composite => vec![serde_json::to_string(value).map_err(|e| {
            ConnectorError::translation(format!("attribute '{}' cannot be serialized: {}", name, e))
        })?],
        TranslationRule::String | TranslationRule::Array => each_scalar(name, value, scalar_text)?,
        TranslationRule::Boolean => each_scalar(name, value, boolean_text)?,
        TranslationRule::Integer => each_scalar(name, value, integer_text)?,
        TranslationRule::DateTime => each_scalar(name, value, generalized_time)?,
        TranslationRule::Dn => each_scalar(name, value, |name, v| decode_id(&scalar_text(name, v)?))?,
    };

    Ok(match rule {
        TranslationRule::Array => NativeValue::Multi(values),
        _ => NativeValue::from_values(values),
    })
}

/// Convert native values into a canonical value following `rule`.
///
/// Returns `None` when nothing is left to report, e.g. a DN attribute holding
/// only the empty placeholder value.
pub(crate) fn to_canonical(rule: TranslationRule, value: &NativeValue) -> Option<Value> {
    match rule {
        TranslationRule::Array => Some(Value::Array(
            value
                .to_values()
                .into_iter()
                .filter(|v| !v.is_empty())
                .map(Value::String)
                .collect(),
        )),
        TranslationRule::Dn => match value {
            NativeValue::Single(v) if v.is_empty() => None,
            NativeValue::Single(v) => Some(Value::String(encode_id(v))),
            NativeValue::Multi(values) => Some(Value::Array(
                values
                    .iter()
                    .filter(|v| !v.is_empty())
                    .map(|v| Value::String(encode_id(v)))
                    .collect(),
            )),
        },
        _ => match value {
            NativeValue::Single(v) => Some(scalar_to_canonical(rule, v)),
            NativeValue::Multi(values) if values.is_empty() => None,
            NativeValue::Multi(values) => Some(Value::Array(
                values.iter().map(|v| scalar_to_canonical(rule, v)).collect(),
            )),
        },
    }
}

fn scalar_to_canonical(rule: TranslationRule, text: &str) -> Value {
    match rule {
        TranslationRule::Boolean if text.eq_ignore_ascii_case("TRUE") => Value::Bool(true),
        TranslationRule::Boolean if text.eq_ignore_ascii_case("FALSE") => Value::Bool(false),
        TranslationRule::Integer => text
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(text.to_string())),
        TranslationRule::DateTime => parse_generalized_time(text)
            .map(|time| Value::String(time.to_rfc3339_opts(SecondsFormat::Secs, true)))
            .unwrap_or_else(|| Value::String(text.to_string())),
        TranslationRule::Composite => {
            serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
        }
        _ => Value::String(text.to_string()),
    }
}

fn each_scalar<F>(name: &str, value: &Value, convert: F) -> ConnectorResult<Vec<String>>
where
    F: Fn(&str, &Value) -> ConnectorResult<String>,
{
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(|item| convert(name, item))
            .collect(),
        single => Ok(vec![convert(name, single)?]),
    }
}

fn scalar_text(name: &str, value: &Value) -> ConnectorResult<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Bool(flag) => Ok(flag.to_string()),
        _ => Err(ConnectorError::translation(format!(
            "attribute '{}' expects a simple value",
            name
        ))),
    }
}

fn boolean_text(name: &str, value: &Value) -> ConnectorResult<String> {
    let flag = match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(text) if text.eq_ignore_ascii_case("true") => Some(true),
        Value::String(text) if text.eq_ignore_ascii_case("false") => Some(false),
        _ => None,
    };
    flag.map(|flag| if flag { "TRUE" } else { "FALSE" }.to_string())
        .ok_or_else(|| ConnectorError::translation(format!("attribute '{}' expects a boolean", name)))
}

fn integer_text(name: &str, value: &Value) -> ConnectorResult<String> {
    let number = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    };
    number
        .map(|n| n.to_string())
        .ok_or_else(|| ConnectorError::translation(format!("attribute '{}' expects an integer", name)))
}

fn generalized_time(name: &str, value: &Value) -> ConnectorResult<String> {
    let text = value.as_str().ok_or_else(|| {
        ConnectorError::translation(format!("attribute '{}' expects a date-time string", name))
    })?;
    let time = DateTime::parse_from_rfc3339(text).map_err(|e| {
        ConnectorError::translation(format!("attribute '{}' has invalid date-time '{}': {}", name, text, e))
    })?;
    Ok(format!("{}Z", time.with_timezone(&Utc).format(GENERALIZED_TIME)))
}

/// Parse `YYYYMMDDHHMMSS[.fraction]Z`.
fn parse_generalized_time(text: &str) -> Option<DateTime<Utc>> {
    let body = text.strip_suffix('Z')?;
    let whole = body.split(['.', ',']).next()?;
    let naive = NaiveDateTime::parse_from_str(whole, GENERALIZED_TIME).ok()?;
    Some(Utc.from_utc_datetime(&naive))
}
