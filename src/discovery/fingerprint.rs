//! Request fingerprinting.
//!
//! The fingerprint is a total function of every input that can influence
//! response bytes. It doubles as the cache key and, rendered as hex, as the
//! `version_info` field of responses.
//!
//! # Design Decisions
//! - XxHash64 with a fixed seed: deterministic across processes and restarts
//! - Set-like inputs (requested names) are sorted; list-like inputs
//!   (instances) keep their order
//! - Every field is fed with a tag byte and a length so adjacent fields
//!   cannot alias each other

use std::hash::Hasher;

use serde_json::Value;
use twox_hash::XxHash64;

const SEED: u64 = 0;

/// Hash raw bytes with the fixed seed.
pub fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = XxHash64::with_seed(SEED);
    hasher.write(bytes);
    hasher.finish()
}

/// Hash a structured value, canonicalizing object key order.
pub fn canonical_hash(value: &Value) -> u64 {
    let mut hasher = XxHash64::with_seed(SEED);
    feed_value(&mut hasher, value);
    hasher.finish()
}

fn feed_value(hasher: &mut XxHash64, value: &Value) {
    match value {
        Value::Null => hasher.write_u8(0),
        Value::Bool(b) => {
            hasher.write_u8(1);
            hasher.write_u8(*b as u8);
        }
        Value::Number(n) => {
            hasher.write_u8(2);
            feed_str(hasher, &n.to_string());
        }
        Value::String(s) => {
            hasher.write_u8(3);
            feed_str(hasher, s);
        }
        Value::Array(items) => {
            hasher.write_u8(4);
            hasher.write_u64(items.len() as u64);
            for item in items {
                feed_value(hasher, item);
            }
        }
        Value::Object(map) => {
            hasher.write_u8(5);
            hasher.write_u64(map.len() as u64);
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for key in keys {
                feed_str(hasher, key);
                feed_value(hasher, &map[key]);
            }
        }
    }
}

fn feed_str(hasher: &mut XxHash64, s: &str) {
    hasher.write_u64(s.len() as u64);
    hasher.write(s.as_bytes());
}

/// Everything that can influence the bytes of a discovery response.
pub struct FingerprintInputs<'a> {
    pub resource_type: &'a str,
    pub api_generation: &'a str,
    pub template_checksum: u64,
    pub instances_content_id: u64,
    pub node_match_value: &'a Value,
    pub requested_names: &'a [String],
    pub host_header: &'a str,
    pub context_checksum: u64,
    pub cipher_identity: &'a str,
    pub extra_keys: &'a [String],
}

impl FingerprintInputs<'_> {
    pub fn compute(&self) -> String {
        let mut hasher = XxHash64::with_seed(SEED);
        feed_str(&mut hasher, self.resource_type);
        feed_str(&mut hasher, self.api_generation);
        hasher.write_u64(self.template_checksum);
        hasher.write_u64(self.instances_content_id);
        feed_value(&mut hasher, self.node_match_value);

        let mut names: Vec<&String> = self.requested_names.iter().collect();
        names.sort();
        names.dedup();
        hasher.write_u64(names.len() as u64);
        for name in names {
            feed_str(&mut hasher, name);
        }

        feed_str(&mut hasher, self.host_header);
        hasher.write_u64(self.context_checksum);
        feed_str(&mut hasher, self.cipher_identity);
        for key in self.extra_keys {
            feed_str(&mut hasher, key);
        }
        format!("{:016x}", hasher.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_inputs<'a>(names: &'a [String], node: &'a Value) -> FingerprintInputs<'a> {
        FingerprintInputs {
            resource_type: "clusters",
            api_generation: "v3",
            template_checksum: 7,
            instances_content_id: 11,
            node_match_value: node,
            requested_names: names,
            host_header: "cp.internal",
            context_checksum: 13,
            cipher_identity: "disabled:0",
            extra_keys: &[],
        }
    }

    #[test]
    fn identical_inputs_identical_fingerprint() {
        let node = json!("T1");
        let names = vec!["a".to_string(), "b".to_string()];
        assert_eq!(
            base_inputs(&names, &node).compute(),
            base_inputs(&names, &node).compute()
        );
    }

    #[test]
    fn requested_name_order_is_canonicalized() {
        let node = json!("T1");
        let forward = vec!["a".to_string(), "b".to_string()];
        let reverse = vec!["b".to_string(), "a".to_string()];
        assert_eq!(
            base_inputs(&forward, &node).compute(),
            base_inputs(&reverse, &node).compute()
        );
    }

    #[test]
    fn instance_order_is_significant() {
        let forward = canonical_hash(&json!([{"name": "a"}, {"name": "b"}]));
        let reverse = canonical_hash(&json!([{"name": "b"}, {"name": "a"}]));
        assert_ne!(forward, reverse);
    }

    #[test]
    fn object_key_order_is_canonicalized() {
        let a: Value = serde_json::from_str(r#"{"x": 1, "y": 2}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"y": 2, "x": 1}"#).unwrap();
        assert_eq!(canonical_hash(&a), canonical_hash(&b));
    }

    #[test]
    fn any_field_change_moves_the_fingerprint() {
        let node = json!("T1");
        let names: Vec<String> = vec![];
        let base = base_inputs(&names, &node).compute();

        let mut changed = base_inputs(&names, &node);
        changed.template_checksum = 8;
        assert_ne!(base, changed.compute());

        let mut changed = base_inputs(&names, &node);
        changed.cipher_identity = "aesgcm:1";
        assert_ne!(base, changed.compute());

        let other_node = json!("T2");
        assert_ne!(base, base_inputs(&names, &other_node).compute());
    }
}
