//! Bracketed form encoding (`fields[UF_CRM_1][0][fileData][0]=a.pdf`).
//!
//! The REST API takes nested parameters in this shape, and the automation
//! platform posts its webhook payloads the same way.

use serde_json::{Map, Value};

/// Encode nested JSON into a bracketed, percent-encoded query string.
///
/// Nulls are skipped, booleans become `1`/`0`, array elements get their index
/// as key.
pub fn build_query(params: &Value) -> String {
    let mut pairs = Vec::new();
    flatten(None, params, &mut pairs);
    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn flatten(prefix: Option<&str>, value: &Value, out: &mut Vec<(String, String)>) {
    let nested = |key: &str| match prefix {
        Some(p) => format!("{}[{}]", p, key),
        None => key.to_string(),
    };
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                flatten(Some(&nested(k)), v, out);
            }
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten(Some(&nested(&i.to_string())), v, out);
            }
        }
        Value::Null => {}
        scalar => {
            if let Some(key) = prefix {
                let text = match scalar {
                    Value::Bool(true) => "1".to_string(),
                    Value::Bool(false) => "0".to_string(),
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                out.push((key.to_string(), text));
            }
        }
    }
}

/// Decode a bracketed form body into nested JSON objects.
///
/// Values stay strings. `key[]=v` appends to an array. Later duplicates of a
/// scalar key overwrite earlier ones.
pub fn parse_query(body: &str) -> Value {
    let mut root = Value::Object(Map::new());
    for pair in body.split('&').filter(|p| !p.is_empty()) {
        let (raw_key, raw_value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = decode_component(raw_key);
        let value = decode_component(raw_value);
        let segments = split_key(&key);
        if segments.first().is_none_or(|s| s.is_empty()) {
            continue;
        }
        insert(&mut root, &segments, value);
    }
    root
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

fn split_key(key: &str) -> Vec<String> {
    let Some(open) = key.find('[') else {
        return vec![key.to_string()];
    };
    let mut segments = vec![key[..open].to_string()];
    let mut rest = &key[open..];
    while let Some(stripped) = rest.strip_prefix('[') {
        match stripped.find(']') {
            Some(close) => {
                segments.push(stripped[..close].to_string());
                rest = &stripped[close + 1..];
            }
            None => {
                // Unterminated bracket: keep the whole key literal.
                return vec![key.to_string()];
            }
        }
    }
    segments
}

fn insert(target: &mut Value, segments: &[String], value: String) {
    let Some((head, tail)) = segments.split_first() else {
        *target = Value::String(value);
        return;
    };
    if head.is_empty() {
        if !target.is_array() {
            *target = Value::Array(Vec::new());
        }
        if let Value::Array(items) = target {
            items.push(Value::Null);
            if let Some(last) = items.last_mut() {
                insert(last, tail, value);
            }
        }
        return;
    }
    if !target.is_object() {
        *target = Value::Object(Map::new());
    }
    if let Value::Object(map) = target {
        let slot = map.entry(head.clone()).or_insert(Value::Null);
        insert(slot, tail, value);
    }
}
