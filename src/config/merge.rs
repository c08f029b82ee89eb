//! Deep merge of configuration tiers.
//!
//! Later tiers override earlier ones key by key. Arrays are replaced, not
//! concatenated.

use serde_json::Value;

/// Deep merge two JSON values, with `overlay` taking precedence over `base`.
///
/// A null in `overlay` means "not specified" and keeps the base value.
///
/// # Example
/// ```
/// use serde_json::json;
/// use task_result_bridge::config::deep_merge;
///
/// let defaults = json!({"remote": {"timeout_secs": 30, "scheme": "https"}});
/// let project = json!({"remote": {"timeout_secs": 10}});
/// let merged = deep_merge(defaults, project);
/// assert_eq!(merged, json!({"remote": {"timeout_secs": 10, "scheme": "https"}}));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (key, overlay_value) in overlay_map {
                let merged_value = match base_map.remove(&key) {
                    Some(base_value) => deep_merge(base_value, overlay_value),
                    None => overlay_value,
                };
                base_map.insert(key, merged_value);
            }
            Value::Object(base_map)
        }
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Fold [`deep_merge`] over tiers ordered lowest to highest priority.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}
