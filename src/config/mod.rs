//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! location specs (--config flag or REGENCY_CONFIG, comma separated)
//!     → loader.rs (fetch each document)
//!     → deep merge, later documents win
//!     → REGENCY_* environment overlay (document keys take precedence)
//!     → validation.rs (semantic checks)
//!     → AppConfig (validated, immutable)
//!     → shared via Arc to all subsystems
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{Loadable, LoadError, LoadedValue, Serialization};
pub use schema::AppConfig;

use serde_json::Value;

use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] LoadError),
    #[error("failed to parse config: {0}")]
    Parse(String),
    #[error("config validation failed: {}", format_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn format_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load, merge, overlay, and validate configuration from one or more
/// comma-separated location specs.
pub async fn load_config(specs: &str) -> Result<AppConfig, ConfigError> {
    let mut merged = Value::Object(serde_json::Map::new());
    for spec in specs.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let doc = load_document(spec).await?;
        merge_documents(&mut merged, doc);
    }
    overlay_env(&mut merged, |name| std::env::var(name).ok());

    let config: AppConfig =
        serde_json::from_value(merged).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

async fn load_document(spec: &str) -> Result<Value, ConfigError> {
    let mut loadable = Loadable::from_compact(spec)?;
    // A plain path with no scheme is a file reference, not an inline literal.
    if loadable.protocol == "inline" && looks_like_path(&loadable.path) {
        loadable.protocol = "file".to_string();
    }
    loadable.serialization = Serialization::String;
    let text = loadable.load().await?.into_text()?;

    if loadable.path.ends_with(".toml") {
        toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    } else {
        serde_yaml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

fn looks_like_path(s: &str) -> bool {
    s.starts_with('/') || s.starts_with("./") || std::path::Path::new(s).exists()
}

/// Deep merge: objects merge key-wise, anything else is replaced.
fn merge_documents(base: &mut Value, incoming: Value) {
    match (base, incoming) {
        (Value::Object(base_map), Value::Object(incoming_map)) => {
            for (key, value) in incoming_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_documents(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (base_slot, incoming) => *base_slot = incoming,
    }
}

/// Environment variables settable per configuration key. The document wins
/// where both exist; env fills the gaps.
const ENV_KEYS: &[(&str, &str)] = &[
    ("REGENCY_DEBUG", "debug"),
    ("REGENCY_AUTH_ENABLED", "authentication.enabled"),
    ("REGENCY_AUTH_PASSWORDS", "authentication.auth_passwords"),
    ("REGENCY_ENCRYPTION_KEY", "authentication.encryption_key"),
    ("REGENCY_SOURCES_REFRESH_RATE", "source_config.refresh_rate"),
    ("REGENCY_CACHE_STRATEGY", "source_config.cache_strategy"),
    ("REGENCY_NODE_MATCHING_ENABLED", "matching.enabled"),
    ("REGENCY_SOURCE_MATCH_KEY", "matching.source_key"),
    ("REGENCY_NODE_MATCH_KEY", "matching.node_key"),
    ("REGENCY_REFRESH_CONTEXT", "template_context.refresh"),
    ("REGENCY_CONTEXT_REFRESH_RATE", "template_context.refresh_rate"),
    ("REGENCY_CONTEXT_REFRESH_CRON", "template_context.refresh_cron"),
    ("REGENCY_DISCOVERY_CACHE_ENABLED", "discovery_cache.enabled"),
    ("REGENCY_DISCOVERY_CACHE_REDIS_HOST", "discovery_cache.remote.host"),
    ("REGENCY_DISCOVERY_CACHE_REDIS_PORT", "discovery_cache.remote.port"),
    ("REGENCY_DISCOVERY_CACHE_REDIS_PASSWORD", "discovery_cache.remote.password"),
    ("REGENCY_BIND_ADDRESS", "server.bind_address"),
    ("REGENCY_NO_CHANGE_STATUS", "server.no_change_status"),
    ("REGENCY_METRICS_ENABLED", "metrics.enabled"),
    ("REGENCY_METRICS_ADDRESS", "metrics.bind_address"),
];

fn overlay_env(doc: &mut Value, get: impl Fn(&str) -> Option<String>) {
    for (env_name, dotted_path) in ENV_KEYS {
        let Some(raw) = get(env_name) else { continue };
        if lookup(doc, dotted_path).is_some() {
            continue;
        }
        let value = coerce_env_value(env_name, &raw);
        insert(doc, dotted_path, value);
    }
}

fn coerce_env_value(env_name: &str, raw: &str) -> Value {
    if env_name.ends_with("_PASSWORDS") {
        return Value::Array(
            raw.split(',')
                .map(|s| Value::String(s.trim().to_string()))
                .collect(),
        );
    }
    // YAML scalar rules give numbers and booleans for free
    serde_yaml::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn lookup<'a>(doc: &'a Value, dotted_path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for segment in dotted_path.split('.') {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

fn insert(doc: &mut Value, dotted_path: &str, value: Value) {
    let mut current = doc;
    let segments: Vec<&str> = dotted_path.split('.').collect();
    for segment in &segments[..segments.len() - 1] {
        let Some(map) = current.as_object_mut() else { return };
        current = map
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(segments[segments.len() - 1].to_string(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_is_recursive_and_later_wins() {
        let mut base: Value = serde_yaml::from_str("a: {x: 1, y: 2}\nb: [1]\n").unwrap();
        let incoming: Value = serde_yaml::from_str("a: {y: 3}\nb: [2, 3]\n").unwrap();
        merge_documents(&mut base, incoming);
        assert_eq!(base["a"]["x"], 1);
        assert_eq!(base["a"]["y"], 3);
        assert_eq!(base["b"], serde_json::json!([2, 3]));
    }

    #[test]
    fn env_fills_missing_keys_only() {
        let mut doc: Value = serde_yaml::from_str("debug: false\n").unwrap();
        let fake_env = |name: &str| match name {
            "REGENCY_DEBUG" => Some("true".to_string()),
            "REGENCY_NODE_MATCH_KEY" => Some("metadata.team".to_string()),
            "REGENCY_SOURCES_REFRESH_RATE" => Some("5".to_string()),
            _ => None,
        };
        overlay_env(&mut doc, fake_env);
        // document wins
        assert_eq!(doc["debug"], false);
        // env fills gaps, with scalar coercion
        assert_eq!(doc["matching"]["node_key"], "metadata.team");
        assert_eq!(doc["source_config"]["refresh_rate"], 5);
    }

    #[test]
    fn password_env_splits_on_commas() {
        let mut doc = Value::Object(Default::default());
        overlay_env(&mut doc, |name| {
            (name == "REGENCY_AUTH_PASSWORDS").then(|| "s1, s2".to_string())
        });
        assert_eq!(
            doc["authentication"]["auth_passwords"],
            serde_json::json!(["s1", "s2"])
        );
    }

    #[tokio::test]
    async fn loads_and_merges_files() {
        let dir = tempfile::tempdir().unwrap();
        let common = dir.path().join("common.yaml");
        let env_specific = dir.path().join("dev.yaml");
        std::fs::write(
            &common,
            concat!(
                "sources:\n  - type: inline\n    config: {instances: []}\n",
                "templates:\n  default:\n    clusters: \"inline+jinja://x\"\n",
            ),
        )
        .unwrap();
        std::fs::write(&env_specific, "debug: true\n").unwrap();
        let spec = format!("file://{},file://{}", common.display(), env_specific.display());
        let config = load_config(&spec).await.unwrap();
        assert!(config.debug);
        assert_eq!(config.sources.len(), 1);
    }
}
