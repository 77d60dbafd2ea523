//! Canonical JSON rendering and dot-path field extraction.

use serde_json::Value;

use crate::error::{HashError, HashResult};

/// Render a JSON value with object keys sorted at every depth and no
/// insignificant whitespace.
///
/// The output does not depend on the insertion order of the source maps, so
/// it is safe to hash.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(&map[key], out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Resolve a dot-separated path (`"user.address.city"`) inside a JSON value.
///
/// Numeric segments index into arrays.
pub fn extract_field<'a>(value: &'a Value, path: &str) -> HashResult<&'a Value> {
    if path.is_empty() {
        return Err(HashError::FieldNotFound(path.to_string()));
    }
    let mut current = value;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
        .ok_or_else(|| HashError::FieldNotFound(path.to_string()))?;
    }
    Ok(current)
}
