//! Native template generators.
//!
//! A native template is a Rust function producing structured resources
//! directly, sidestepping render-then-parse on hot paths. Generators are
//! registered by name and referenced from config as `native://<name>`.

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use serde_json::{json, Value};

/// A registered generator: the callable plus the context identifiers it
/// reads, declared up front so context pruning works like the text kind.
#[derive(Clone, Copy)]
pub struct NativeTemplate {
    pub call: fn(&Value) -> Result<Vec<Value>, String>,
    pub referenced: &'static [&'static str],
}

fn registry() -> &'static RwLock<HashMap<String, NativeTemplate>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, NativeTemplate>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert(
            "eds".to_string(),
            NativeTemplate {
                call: eds_clusters,
                referenced: &["instances", "discovery_request"],
            },
        );
        RwLock::new(m)
    })
}

/// Register a generator. Names must be unique.
pub fn register(name: &str, template: NativeTemplate) -> Result<(), String> {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    if reg.contains_key(name) {
        return Err(format!("native template {name:?} already registered"));
    }
    reg.insert(name.to_string(), template);
    Ok(())
}

pub fn lookup(name: &str) -> Option<NativeTemplate> {
    registry()
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(name)
        .copied()
}

/// Built-in generator: one cluster per instance, with a load assignment
/// built from the instance's `endpoints` list.
fn eds_clusters(context: &Value) -> Result<Vec<Value>, String> {
    let instances = context
        .get("instances")
        .and_then(Value::as_array)
        .ok_or("context is missing the instances list")?;

    let mut resources = Vec::with_capacity(instances.len());
    for instance in instances {
        let name = instance
            .get("name")
            .and_then(Value::as_str)
            .ok_or("instance has no name")?;
        let endpoints = instance
            .get("endpoints")
            .and_then(Value::as_array)
            .map(|e| e.as_slice())
            .unwrap_or_default();
        resources.push(json!({
            "name": name,
            "type": "STRICT_DNS",
            "connect_timeout": "5.000s",
            "load_assignment": {
                "cluster_name": format!("{name}_cluster"),
                "endpoints": locality_lb_endpoints(endpoints)?,
            },
        }));
    }
    Ok(resources)
}

fn locality_lb_endpoints(upstreams: &[Value]) -> Result<Vec<Value>, String> {
    upstreams
        .iter()
        .map(|upstream| {
            let address = upstream
                .get("address")
                .and_then(Value::as_str)
                .ok_or("endpoint has no address")?;
            let port = upstream
                .get("port")
                .and_then(Value::as_u64)
                .ok_or("endpoint has no port")?;
            let region = upstream
                .get("region")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            Ok(json!({
                "locality": {"zone": region},
                "priority": 0,
                "lb_endpoints": [{
                    "endpoint": {
                        "address": {
                            "socket_address": {"address": address, "port_value": port}
                        }
                    }
                }],
            }))
        })
        .collect()
}
