//! Deterministic request-hash keys.

use serde_json::Value;

/// MD5 hex digest of the canonical JSON rendering of `params`.
///
/// Object keys are sorted recursively, so two parameter sets that
/// differ only in map ordering produce the same key. Array order is
/// significant and preserved (callers sort list parameters themselves
/// where order is not meaningful, e.g. GEOID lists).
#[must_use]
pub fn cache_key(params: &Value) -> String {
    let canonical = canonicalize(params).to_string();
    format!("{:x}", md5::compute(canonical.as_bytes()))
}

/// Rebuilds the value with every object's keys in sorted order.
fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: Vec<(&String, &Value)> = map.iter().collect();
            sorted.sort_by_key(|(k, _)| k.as_str());
            Value::Object(
                sorted
                    .into_iter()
                    .map(|(k, v)| (k.clone(), canonicalize(v)))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_is_stable_across_map_ordering() {
        let a = json!({"year": 2023, "geoids": ["37183", "37063"], "dataset": "acs/acs5"});
        let b = json!({"dataset": "acs/acs5", "geoids": ["37183", "37063"], "year": 2023});
        assert_eq!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn key_is_sensitive_to_values() {
        let a = json!({"year": 2023});
        let b = json!({"year": 2022});
        assert_ne!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn key_is_sensitive_to_array_order() {
        let a = json!({"geoids": ["37183", "37063"]});
        let b = json!({"geoids": ["37063", "37183"]});
        assert_ne!(cache_key(&a), cache_key(&b));
    }

    #[test]
    fn key_looks_like_md5() {
        let key = cache_key(&json!({"x": 1}));
        assert_eq!(key.len(), 32);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
