//! Data sources feeding the instance store.
//!
//! # Responsibilities
//! - Define the `Source` extension trait
//! - Maintain the explicit source-type registry
//! - Construct configured sources at startup
//!
//! # Design Decisions
//! - Source types are registered by name, one call per extension
//! - Sources return plain instance lists; scope routing happens in the poller
//! - A source constructor failing is a startup error, never a runtime one

pub mod file;
pub mod inline;
pub mod poller;

use std::collections::HashMap;
use std::sync::{OnceLock, RwLock};

use async_trait::async_trait;

use crate::config::schema::ConfiguredSource;

/// One unit of upstream data: an opaque key-value map.
pub type Instance = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, thiserror::Error)]
#[error("source {name}: {reason}")]
pub struct SourceError {
    pub name: String,
    pub reason: String,
}

impl SourceError {
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// A pluggable data source. `get` is called once per poll cycle.
#[async_trait]
pub trait Source: Send + Sync {
    async fn get(&self) -> Result<Vec<Instance>, SourceError>;
}

pub type SourceFactory =
    Box<dyn Fn(&serde_json::Value) -> Result<Box<dyn Source>, SourceError> + Send + Sync>;

fn registry() -> &'static RwLock<HashMap<String, SourceFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, SourceFactory>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m: HashMap<String, SourceFactory> = HashMap::new();
        m.insert(
            "inline".into(),
            Box::new(|config| Ok(Box::new(inline::InlineSource::new(config)?) as Box<dyn Source>)),
        );
        m.insert(
            "file".into(),
            Box::new(|config| Ok(Box::new(file::FileSource::new(config)?) as Box<dyn Source>)),
        );
        RwLock::new(m)
    })
}

/// Register an additional source type. Names must be unique.
pub fn register_source(name: &str, factory: SourceFactory) -> Result<(), SourceError> {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    if reg.contains_key(name) {
        return Err(SourceError::new(name, "source type already registered"));
    }
    reg.insert(name.to_string(), factory);
    Ok(())
}

/// Instantiate a configured source through the registry.
pub fn build_source(configured: &ConfiguredSource) -> Result<Box<dyn Source>, SourceError> {
    let reg = registry().read().unwrap_or_else(|e| e.into_inner());
    let factory = reg.get(&configured.source_type).ok_or_else(|| {
        SourceError::new(
            &configured.source_type,
            "unknown source type; register it before loading config",
        )
    })?;
    factory(&configured.config)
}

/// Parse a structured document into an instance list.
pub(crate) fn instances_from_value(
    name: &str,
    value: serde_json::Value,
) -> Result<Vec<Instance>, SourceError> {
    let serde_json::Value::Array(items) = value else {
        return Err(SourceError::new(name, "expected a list of instances"));
    };
    items
        .into_iter()
        .map(|item| match item {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(SourceError::new(
                name,
                format!("instance must be an object, got: {other}"),
            )),
        })
        .collect()
}
