//! Node-to-instance matching.
//!
//! # Responsibilities
//! - Extract the node key from a node descriptor (dotted paths supported)
//! - Select the instances whose source key matches
//! - Preserve source order within every scope
//!
//! # Design Decisions
//! - Wildcard `*` on either side matches anything non-empty
//! - Two collections match when they intersect
//! - An empty node value only matches in debug mode

use serde_json::Value;

use crate::sources::poller::{ScopeMap, Snapshot};
use crate::sources::Instance;

#[derive(Debug, thiserror::Error)]
#[error("failed to find key {key:?} in {subject}")]
pub struct MatchError {
    pub key: String,
    pub subject: &'static str,
}

pub struct NodeMatcher {
    enabled: bool,
    source_key: String,
    node_key: String,
    debug: bool,
}

impl NodeMatcher {
    pub fn new(enabled: bool, source_key: &str, node_key: &str, debug: bool) -> Self {
        Self {
            enabled,
            source_key: source_key.to_string(),
            node_key: node_key.to_string(),
            debug,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// The node-side match value, from the serialized node descriptor.
    pub fn extract_node_value(&self, node: &Value) -> Result<Value, MatchError> {
        lookup_path(node, &self.node_key).ok_or(MatchError {
            key: self.node_key.clone(),
            subject: "node descriptor",
        })
    }

    /// Every scope of the current generation, filtered down to the
    /// instances this node should see.
    pub fn select_scopes(
        &self,
        snapshot: &Snapshot,
        node_value: &Value,
    ) -> Result<ScopeMap, MatchError> {
        self.select_in(&snapshot.scopes, node_value)
    }

    /// Filter an arbitrary scope map (used by the admin raw dump).
    pub fn select_in(&self, scopes: &ScopeMap, node_value: &Value) -> Result<ScopeMap, MatchError> {
        let mut selected = ScopeMap::new();
        for (scope, instances) in scopes {
            if !self.enabled {
                selected.insert(scope.clone(), instances.clone());
                continue;
            }
            let mut kept = Vec::new();
            for instance in instances {
                let source_value =
                    lookup_path(&Value::Object(instance.clone()), &self.source_key).ok_or(
                        MatchError {
                            key: self.source_key.clone(),
                            subject: "instance",
                        },
                    )?;
                if self.matches(node_value, &source_value) {
                    kept.push(instance.clone());
                }
            }
            selected.insert(scope.clone(), kept);
        }
        Ok(selected)
    }

    /// Scope `resource_type` followed by scope `default`, in source order.
    pub fn select(
        &self,
        snapshot: &Snapshot,
        node_value: &Value,
        resource_type: &str,
    ) -> Result<Vec<Instance>, MatchError> {
        let scopes = self.select_scopes(snapshot, node_value)?;
        let mut out = Vec::new();
        if let Some(typed) = scopes.get(resource_type) {
            out.extend(typed.iter().cloned());
        }
        if resource_type != "default" {
            if let Some(default) = scopes.get("default") {
                out.extend(default.iter().cloned());
            }
        }
        Ok(out)
    }

    // Ordered by what is most commonly true, cheapest first.
    fn matches(&self, node_value: &Value, source_value: &Value) -> bool {
        contains(source_value, node_value)
            || node_value == source_value
            || is_wildcard(node_value)
            || is_wildcard(source_value)
            || intersects(node_value, source_value)
            || self.is_debug_request(node_value)
    }

    fn is_debug_request(&self, node_value: &Value) -> bool {
        self.debug && node_value.as_str() == Some("")
    }
}

fn lookup_path(value: &Value, dotted_path: &str) -> Option<Value> {
    let mut current = value;
    for segment in dotted_path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current.clone())
}

fn contains(container: &Value, item: &Value) -> bool {
    container
        .as_array()
        .map(|items| items.contains(item))
        .unwrap_or(false)
}

fn is_wildcard(value: &Value) -> bool {
    match value {
        Value::String(s) => s == "*",
        Value::Array(items) => items.iter().any(|i| i.as_str() == Some("*")),
        _ => false,
    }
}

fn intersects(a: &Value, b: &Value) -> bool {
    match (a.as_array(), b.as_array()) {
        (Some(left), Some(right)) => left.iter().any(|item| right.contains(item)),
        _ => false,
    }
}
