//! Device document decoding
//!
//! The Speedport serves near-JSON: single-quoted strings, unquoted keys or
//! values, and trailing commas all show up in captured traffic. [`parse_lenient`]
//! accepts strict JSON first and falls back to normalising those deviations.
//!
//! Several resources (`Login`, `heartbeat`, `Module`) return a list of typed
//! variables instead of an object:
//!
//! ```text
//! [{"vartype":"value","varid":"login","varvalue":"success"}, ...]
//! ```
//!
//! [`fold_variables`] turns such a list into a flat `varid -> varvalue` map.

use crate::error::{ExporterError, Result};
use serde_json::{Map, Value};

/// Decoded JSON of one device resource
pub type RawDeviceDocument = Value;

/// Flat mapping produced by [`fold_variables`]
pub type FoldedDocument = Map<String, Value>;

const ID_KEY: &str = "varid";
const VALUE_KEY: &str = "varvalue";

/// Folds a `{varid, varvalue}` list into a map.
///
/// The result does not depend on the order of the list. Repeating an id with
/// the same value is accepted, repeating it with a different value is an error.
/// An object document is returned unchanged.
pub fn fold_variables(resource: &str, document: &RawDeviceDocument) -> Result<FoldedDocument> {
    let items = match document {
        Value::Array(items) => items,
        Value::Object(map) => return Ok(map.clone()),
        other => {
            return Err(ExporterError::parse(
                resource,
                format!("expected a variable list, got {}", kind(other)),
            ))
        }
    };

    let mut folded = Map::new();
    for item in items {
        let id = item
            .get(ID_KEY)
            .and_then(Value::as_str)
            .ok_or_else(|| ExporterError::parse(resource, format!("entry without {}", ID_KEY)))?;
        let value = item.get(VALUE_KEY).cloned().unwrap_or(Value::Null);

        match folded.get(id) {
            Some(existing) if *existing != value => {
                return Err(ExporterError::parse(
                    resource,
                    format!("conflicting values for {} '{}'", ID_KEY, id),
                ));
            }
            Some(_) => {}
            None => {
                folded.insert(id.to_string(), value);
            }
        }
    }
    Ok(folded)
}

/// Parses a device body, tolerating the deviations described in the module docs.
pub fn parse_lenient(resource: &str, body: &str) -> Result<RawDeviceDocument> {
    match serde_json::from_str(body) {
        Ok(value) => Ok(value),
        Err(strict_err) => {
            let normalized = normalize(body).map_err(|message| {
                ExporterError::parse(resource, format!("{} (strict: {})", message, strict_err))
            })?;
            serde_json::from_str(&normalized)
                .map_err(|e| ExporterError::parse(resource, e.to_string()))
        }
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Rewrites near-JSON into strict JSON.
fn normalize(input: &str) -> std::result::Result<String, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len() + 16);
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '"' | '\'' => {
                i = copy_string(&chars, i, &mut out)?;
            }
            ',' => {
                // Drop trailing commas before a closing bracket.
                let next = skip_whitespace(&chars, i + 1);
                if !matches!(chars.get(next), Some('}') | Some(']')) {
                    out.push(',');
                }
                i += 1;
            }
            c if c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | ':') => {
                out.push(c);
                i += 1;
            }
            _ => {
                let start = i;
                while i < chars.len() && !is_delimiter(chars[i]) {
                    i += 1;
                }
                let token: String = chars[start..i].iter().collect();
                push_bare_token(&token, &mut out);
            }
        }
    }
    Ok(out)
}

fn is_delimiter(c: char) -> bool {
    c.is_whitespace() || matches!(c, ',' | ':' | '{' | '}' | '[' | ']' | '"' | '\'')
}

fn skip_whitespace(chars: &[char], mut i: usize) -> usize {
    while i < chars.len() && chars[i].is_whitespace() {
        i += 1;
    }
    i
}

fn push_bare_token(token: &str, out: &mut String) {
    let is_literal = matches!(token, "true" | "false" | "null");
    if is_literal || serde_json::from_str::<serde_json::Number>(token).is_ok() {
        out.push_str(token);
    } else {
        out.push_str(&Value::String(token.to_string()).to_string());
    }
}

/// Copies a quoted string starting at `start` as a double-quoted JSON string,
/// returning the index after the closing quote.
fn copy_string(chars: &[char], start: usize, out: &mut String) -> std::result::Result<usize, String> {
    let quote = chars[start];
    let mut content = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        let c = chars[i];
        if c == '\\' {
            let escaped = *chars
                .get(i + 1)
                .ok_or_else(|| "unterminated escape sequence".to_string())?;
            if escaped == '\'' {
                content.push('\'');
            } else {
                content.push('\\');
                content.push(escaped);
            }
            i += 2;
            continue;
        }
        if c == quote {
            out.push('"');
            out.push_str(&content);
            out.push('"');
            return Ok(i + 1);
        }
        match c {
            '"' => content.push_str("\\\""),
            '\n' => content.push_str("\\n"),
            '\r' => content.push_str("\\r"),
            '\t' => content.push_str("\\t"),
            _ => content.push(c),
        }
        i += 1;
    }
    Err("unterminated string".to_string())
}
