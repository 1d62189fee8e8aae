//! Field masking for bodies and headers.
//!
//! Masking is purely structural: a configured key name has its value
//! replaced with a fixed redaction marker wherever it appears as a map key,
//! at any nesting depth. No schema awareness is involved.

use http::HeaderMap;
use serde_json::{Map, Value};

/// The redaction marker substituted for masked values.
pub const REDACTED: &str = "*****";

/// Mask a decoded JSON value in place.
///
/// For every object key in `masks`, the value is replaced with
/// [`REDACTED`] regardless of its shape; masked subtrees are not recursed
/// into. Non-matching keys whose values are themselves objects are walked
/// with the same rule set. Arrays and scalars are left untouched.
///
/// An empty rule set leaves the value unchanged.
pub fn mask_value(value: &mut Value, masks: &[String]) {
    if masks.is_empty() {
        return;
    }
    if let Value::Object(map) = value {
        for (key, entry) in map.iter_mut() {
            if masks.iter().any(|m| m == key) {
                *entry = Value::String(REDACTED.to_owned());
            } else if entry.is_object() {
                mask_value(entry, masks);
            }
        }
    }
}

/// Convert a header map into a JSON object.
///
/// Multi-valued headers become arrays, mirroring the wire-side view of a
/// header block; single values stay scalar. Non-UTF-8 header bytes are
/// replaced lossily.
pub fn headers_to_map(headers: &HeaderMap) -> Map<String, Value> {
    let mut map = Map::new();
    for key in headers.keys() {
        let mut values: Vec<Value> = headers
            .get_all(key)
            .iter()
            .map(|v| Value::String(String::from_utf8_lossy(v.as_bytes()).into_owned()))
            .collect();
        let value = if values.len() == 1 {
            match values.pop() {
                Some(single) => single,
                None => continue,
            }
        } else {
            Value::Array(values)
        };
        map.insert(key.as_str().to_owned(), value);
    }
    map
}

/// Capture a header map as a JSON object with the configured names redacted.
///
/// Header names compare case-insensitively, since the `http` crate stores
/// them lowercased while mask lists are typically written in canonical
/// casing.
pub fn mask_headers(headers: &HeaderMap, masks: &[String]) -> Map<String, Value> {
    let mut map = headers_to_map(headers);
    if masks.is_empty() {
        return map;
    }
    for (key, value) in map.iter_mut() {
        if masks.iter().any(|m| m.eq_ignore_ascii_case(key)) {
            *value = Value::String(REDACTED.to_owned());
        }
    }
    map
}
