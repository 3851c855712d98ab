//! Instance transforms applied at ingestion time.
//!
//! # Responsibilities
//! - Define the per-instance `Modifier` and scope-wide `GlobalModifier` traits
//! - Maintain the explicit transform registry
//!
//! # Design Decisions
//! - Global transforms run before per-instance ones
//! - Transforms consume and return instances; nothing mutates the store
//! - Failure handling (drop vs roll back) belongs to the poller, not here

use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

use crate::sources::Instance;

#[derive(Debug, thiserror::Error)]
#[error("transform {modifier}: {reason}")]
pub struct TransformError {
    pub modifier: String,
    pub reason: String,
}

impl TransformError {
    pub fn new(modifier: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            modifier: modifier.into(),
            reason: reason.into(),
        }
    }
}

/// Maps one instance to one instance.
pub trait Modifier: Send + Sync {
    /// Whether this transform applies to the given instance.
    fn matches(&self, _instance: &Instance) -> bool {
        true
    }

    fn apply(&self, instance: Instance) -> Result<Instance, TransformError>;
}

/// Maps the entire instance set of a scope to a new set.
pub trait GlobalModifier: Send + Sync {
    fn apply(&self, instances: Vec<Instance>) -> Result<Vec<Instance>, TransformError>;
}

struct Registry {
    modifiers: HashMap<String, Arc<dyn Modifier>>,
    global_modifiers: HashMap<String, Arc<dyn GlobalModifier>>,
}

fn registry() -> &'static RwLock<Registry> {
    static REGISTRY: OnceLock<RwLock<Registry>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        RwLock::new(Registry {
            modifiers: HashMap::new(),
            global_modifiers: HashMap::new(),
        })
    })
}

/// Register a per-instance transform. Names must be unique.
pub fn register_modifier(name: &str, modifier: Arc<dyn Modifier>) -> Result<(), TransformError> {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    if reg.modifiers.contains_key(name) {
        return Err(TransformError::new(name, "modifier already registered"));
    }
    reg.modifiers.insert(name.to_string(), modifier);
    Ok(())
}

/// Register a scope-wide transform. Names must be unique.
pub fn register_global_modifier(
    name: &str,
    modifier: Arc<dyn GlobalModifier>,
) -> Result<(), TransformError> {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    if reg.global_modifiers.contains_key(name) {
        return Err(TransformError::new(name, "global modifier already registered"));
    }
    reg.global_modifiers.insert(name.to_string(), modifier);
    Ok(())
}

/// Resolve configured transform names, in configured order.
pub fn resolve_modifiers(names: &[String]) -> Result<Vec<(String, Arc<dyn Modifier>)>, TransformError> {
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    names
        .iter()
        .map(|name| {
            reg.modifiers
                .get(name)
                .cloned()
                .map(|m| (name.clone(), m))
                .ok_or_else(|| TransformError::new(name, "modifier not registered"))
        })
        .collect()
}

pub fn resolve_global_modifiers(
    names: &[String],
) -> Result<Vec<(String, Arc<dyn GlobalModifier>)>, TransformError> {
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    names
        .iter()
        .map(|name| {
            reg.global_modifiers
                .get(name)
                .cloned()
                .map(|m| (name.clone(), m))
                .ok_or_else(|| TransformError::new(name, "global modifier not registered"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Uppercase;

    impl Modifier for Uppercase {
        fn matches(&self, instance: &Instance) -> bool {
            instance.contains_key("name")
        }

        fn apply(&self, mut instance: Instance) -> Result<Instance, TransformError> {
            let name = instance["name"].as_str().unwrap_or_default().to_uppercase();
            instance.insert("name".into(), name.into());
            Ok(instance)
        }
    }

    #[test]
    fn registry_resolves_in_configured_order() {
        register_modifier("uppercase-test", Arc::new(Uppercase)).unwrap();
        let resolved = resolve_modifiers(&["uppercase-test".to_string()]).unwrap();
        assert_eq!(resolved.len(), 1);
        assert!(resolve_modifiers(&["missing".to_string()]).is_err());
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        register_modifier("dup-test", Arc::new(Uppercase)).unwrap();
        assert!(register_modifier("dup-test", Arc::new(Uppercase)).is_err());
    }
}
