//! Field extraction helpers shared by the subsystem collectors
//!
//! Speedport documents mix JSON numbers and numeric strings (`"-92"`,
//! `" 12.5 "`) for the same field across firmware versions, so numeric
//! accessors accept both.

use anyhow::{anyhow, Result};
use serde_json::{Map, Value};

pub type Object = Map<String, Value>;

/// The document itself as an object
pub fn as_object(document: &Value) -> Result<&Object> {
    document
        .as_object()
        .ok_or_else(|| anyhow!("expected a JSON object"))
}

/// Nested object at `key`
pub fn object<'a>(parent: &'a Object, key: &str) -> Result<&'a Object> {
    parent
        .get(key)
        .and_then(Value::as_object)
        .ok_or_else(|| anyhow!("missing object '{}'", key))
}

/// Nested array at `key`
pub fn array<'a>(parent: &'a Object, key: &str) -> Result<&'a Vec<Value>> {
    parent
        .get(key)
        .and_then(Value::as_array)
        .ok_or_else(|| anyhow!("missing list '{}'", key))
}

/// Interpret a value as a number
pub fn to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Interpret a scalar value as text
pub fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn number(parent: &Object, key: &str) -> Result<f64> {
    let value = parent
        .get(key)
        .ok_or_else(|| anyhow!("missing field '{}'", key))?;
    to_f64(value).ok_or_else(|| anyhow!("field '{}' is not numeric: {}", key, value))
}

pub fn optional_number(parent: &Object, key: &str) -> Option<f64> {
    parent.get(key).and_then(to_f64)
}

pub fn text(parent: &Object, key: &str) -> Result<String> {
    let value = parent
        .get(key)
        .ok_or_else(|| anyhow!("missing field '{}'", key))?;
    to_text(value).ok_or_else(|| anyhow!("field '{}' is not a scalar: {}", key, value))
}

pub fn optional_text(parent: &Object, key: &str) -> String {
    parent.get(key).and_then(to_text).unwrap_or_default()
}

/// Truthy device flags: `1`, `"1"`, `true`, `"on"`, `"yes"`, `"enabled"`, `"up"`
pub fn flag(parent: &Object, key: &str) -> Result<bool> {
    let value = parent
        .get(key)
        .ok_or_else(|| anyhow!("missing field '{}'", key))?;
    Ok(match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "on" | "yes" | "enabled" | "up"
        ),
        _ => false,
    })
}

/// Every scalar entry of an object as `(key, value)` text pairs, sorted by key
pub fn scalar_pairs(object: &Object) -> Vec<(String, String)> {
    let mut pairs: Vec<(String, String)> = object
        .iter()
        .filter_map(|(k, v)| to_text(v).map(|text| (k.clone(), text)))
        .collect();
    pairs.sort();
    pairs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numbers_accept_numeric_strings() {
        let doc = json!({"a": 5, "b": " -92.5 ", "c": "n/a"});
        let obj = as_object(&doc).unwrap();
        assert_eq!(number(obj, "a").unwrap(), 5.0);
        assert_eq!(number(obj, "b").unwrap(), -92.5);
        assert!(number(obj, "c").is_err());
        assert!(number(obj, "missing").is_err());
        assert_eq!(optional_number(obj, "c"), None);
    }

    #[test]
    fn flags_and_pairs() {
        let doc = json!({"on": "1", "off": "0", "b": true, "nested": {"x": 1}, "s": "Up"});
        let obj = as_object(&doc).unwrap();
        assert!(flag(obj, "on").unwrap());
        assert!(!flag(obj, "off").unwrap());
        assert!(flag(obj, "b").unwrap());
        assert!(flag(obj, "s").unwrap());
        assert_eq!(
            scalar_pairs(obj),
            vec![
                ("b".to_string(), "true".to_string()),
                ("off".to_string(), "0".to_string()),
                ("on".to_string(), "1".to_string()),
                ("s".to_string(), "Up".to_string()),
            ]
        );
    }
}
