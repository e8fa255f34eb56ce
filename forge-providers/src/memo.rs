//! Memoization key for the backend-handle cache. Hashing requires a
//! canonical-ordered encoding: `options` is already a `BTreeMap` (sorted
//! keys) and we drop any value that is explicitly `null` before encoding so
//! an absent option and a `null` option hash identically.

use std::collections::BTreeMap;

use serde_json::Value;
use sha2::{Digest, Sha256};

pub fn cache_key(provider_id: &str, model_id: &str, options: &BTreeMap<String, Value>) -> String {
    let canonical: BTreeMap<&String, &Value> = options.iter().filter(|(_, v)| !v.is_null()).collect();
    let encoded = serde_json::to_string(&canonical).unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(provider_id.as_bytes());
    hasher.update(b"\u{0}");
    hasher.update(model_id.as_bytes());
    hasher.update(b"\u{0}");
    hasher.update(encoded.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_valued_option_hashes_same_as_absent() {
        let mut with_null = BTreeMap::new();
        with_null.insert("temperature".to_string(), Value::Null);
        let without = BTreeMap::new();
        assert_eq!(cache_key("openai", "gpt-5", &with_null), cache_key("openai", "gpt-5", &without));
    }

    #[test]
    fn key_order_does_not_affect_the_hash() {
        let mut a = BTreeMap::new();
        a.insert("b".to_string(), Value::from(1));
        a.insert("a".to_string(), Value::from(2));
        let mut b = BTreeMap::new();
        b.insert("a".to_string(), Value::from(2));
        b.insert("b".to_string(), Value::from(1));
        assert_eq!(cache_key("p", "m", &a), cache_key("p", "m", &b));
    }

    #[test]
    fn different_models_hash_differently() {
        let opts = BTreeMap::new();
        assert_ne!(cache_key("openai", "gpt-5", &opts), cache_key("openai", "gpt-5-mini", &opts));
    }
}
