use std::collections::BTreeMap;

use serde_json::Value;

use crate::app_config::error::ConfigurationError;

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

/// Replace `%NAME%` tokens in every string of `value`.
///
/// A `%` not opening a well-formed token is kept verbatim; a well-formed
/// token without a value is an error naming where it was found.
pub fn substitute(value: &Value, params: &BTreeMap<String, String>, config_id: &str) -> Result<Value, ConfigurationError> {
    substitute_at(value, params, config_id, "$")
}

fn substitute_at(
    value: &Value,
    params: &BTreeMap<String, String>,
    config_id: &str,
    path: &str,
) -> Result<Value, ConfigurationError> {
    match value {
        Value::String(s) => substitute_str(s, params, config_id, path).map(Value::String),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| substitute_at(item, params, config_id, &format!("{}[{}]", path, i)))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        Value::Object(map) => {
            let mut out = serde_json::Map::with_capacity(map.len());
            for (key, item) in map {
                out.insert(
                    key.clone(),
                    substitute_at(item, params, config_id, &format!("{}.{}", path, key))?,
                );
            }
            Ok(Value::Object(out))
        }
        other => Ok(other.clone()),
    }
}

fn substitute_str(
    input: &str,
    params: &BTreeMap<String, String>,
    config_id: &str,
    path: &str,
) -> Result<String, ConfigurationError> {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find('%') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let name_len = after.find(|c: char| !is_name_char(c)).unwrap_or(after.len());
        if name_len > 0 && after[name_len..].starts_with('%') {
            let name = &after[..name_len];
            let value = params
                .get(name)
                .ok_or_else(|| ConfigurationError::UnresolvedParameter {
                    name: name.to_string(),
                    location: format!("configuration '{}' at {}", config_id, path),
                })?;
            out.push_str(value);
            rest = &after[name_len + 1..];
        } else {
            out.push('%');
            rest = after;
        }
    }
    out.push_str(rest);
    Ok(out)
}
