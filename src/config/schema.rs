//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the control
//! plane. All types derive Serde traits for deserialization from config files.
//!
//! Only the modern nested shape is accepted. The legacy flat spelling
//! (`auth_enabled`, `node_match_key`, ... at the top level) is deprecated
//! and rejected by the parser.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::loader::Loadable;
use crate::crypto::{CipherChain, CipherError, SchemeKind};

/// Root configuration for the control plane.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Data sources polled into the instance store.
    pub sources: Vec<ConfiguredSource>,

    /// Poller behaviour (refresh rate, failure policies, extra cache keys).
    pub source_config: SourcesConfig,

    /// Node-to-instance matching.
    pub matching: MatchingConfig,

    /// `version (or "default") → resource type → location spec`.
    pub templates: BTreeMap<String, BTreeMap<String, Loadable>>,

    /// Named values supplied to every template invocation.
    pub template_context: ContextConfig,

    /// Per-instance transform names, applied in order.
    pub modifiers: Vec<String>,

    /// Scope-wide transform names, applied before per-instance ones.
    pub global_modifiers: Vec<String>,

    /// Credential checking for discovery requests.
    pub authentication: AuthConfig,

    /// Two-tier response cache.
    pub discovery_cache: CacheConfig,

    /// HTTP server settings.
    pub server: ServerConfig,

    /// Admin/introspection surface.
    pub admin: AdminConfig,

    /// Observability settings.
    pub logging: LoggingConfig,
    pub metrics: MetricsConfig,

    /// Debug mode: verbose error bodies, empty node-match values allowed.
    pub debug: bool,
}

/// One configured data source: `(type, scope, config)`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ConfiguredSource {
    /// Registered source type name (`inline`, `file`, ...).
    #[serde(rename = "type")]
    pub source_type: String,

    /// Store scope receiving this source's instances.
    #[serde(default = "default_scope")]
    pub scope: String,

    /// Type-specific configuration.
    pub config: serde_json::Value,
}

fn default_scope() -> String {
    "default".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheStrategy {
    #[default]
    Content,
    /// Historical toggle. Accepted, but the poller always fingerprints
    /// content; configuring this only logs a deprecation warning.
    Context,
}

/// What to do when a transform fails mid-poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum TransformFailurePolicy {
    /// Drop the offending instance, keep the rest of the scope.
    #[default]
    DropInstance,
    /// Discard the scope's transformed output, keep its raw instances.
    RollbackScope,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Seconds between poll cycles.
    pub refresh_rate: u64,

    pub cache_strategy: CacheStrategy,

    /// Extra literal keys folded into every request fingerprint.
    pub extra_keys: Vec<String>,

    /// Consecutive poll failures before the circuit logs at error level.
    pub poll_failure_threshold: u32,

    pub transform_failure_policy: TransformFailurePolicy,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 30,
            cache_strategy: CacheStrategy::Content,
            extra_keys: Vec::new(),
            poll_failure_threshold: 5,
            transform_failure_policy: TransformFailurePolicy::DropInstance,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MatchingConfig {
    pub enabled: bool,

    /// Dotted path into each instance.
    pub source_key: String,

    /// Dotted path into the node descriptor.
    pub node_key: String,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            source_key: "service_clusters".to_string(),
            node_key: "cluster".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ContextConfig {
    /// `name → location spec` for every context entry.
    pub context: BTreeMap<String, Loadable>,

    /// Master switch for scheduled refresh.
    pub refresh: bool,

    /// Fixed interval in seconds. Mutually exclusive with `refresh_cron`.
    pub refresh_rate: Option<u64>,

    /// Five-field cron expression. Mutually exclusive with `refresh_rate`.
    pub refresh_cron: Option<String>,

    pub refresh_num_retries: u32,
    pub refresh_retry_interval_secs: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            context: BTreeMap::new(),
            refresh: false,
            refresh_rate: None,
            refresh_cron: None,
            refresh_num_retries: 3,
            refresh_retry_interval_secs: 10,
        }
    }
}

/// Either a single legacy token key or an ordered multi-scheme key list.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
pub enum EncryptionKeys {
    Single(String),
    Multi(Vec<EncryptionKeySpec>),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EncryptionKeySpec {
    #[serde(rename = "type")]
    pub scheme: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub enabled: bool,

    /// Plaintext allowlist that decrypted credentials must match.
    pub auth_passwords: Vec<String>,

    pub encryption_key: Option<EncryptionKeys>,
}

impl AuthConfig {
    /// Build the cipher chain this configuration describes.
    ///
    /// A bare string key is the legacy token scheme; the list form declares
    /// scheme and ordering explicitly, first key primary.
    pub fn cipher_chain(&self) -> Result<CipherChain, CipherError> {
        match &self.encryption_key {
            None => Ok(CipherChain::disabled()),
            Some(EncryptionKeys::Single(key)) => {
                CipherChain::from_keys(vec![(SchemeKind::Fernet, key.clone())])
            }
            Some(EncryptionKeys::Multi(specs)) => {
                let mut keys = Vec::with_capacity(specs.len());
                for spec in specs {
                    let kind = match spec.scheme.as_str() {
                        "aesgcm" => SchemeKind::AesGcm,
                        "fernet" => SchemeKind::Fernet,
                        other => {
                            return Err(CipherError::InvalidKey(format!(
                                "unknown encryption scheme {other:?}"
                            )))
                        }
                    };
                    keys.push((kind, spec.key.clone()));
                }
                CipherChain::from_keys(keys)
            }
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Entry bound for the in-process LRU tier.
    pub local_max_entries: u64,

    /// TTL applied to both tiers, in seconds.
    pub ttl_secs: u64,

    /// Optional shared key/value tier.
    pub remote: Option<RemoteCacheConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_max_entries: 2048,
            ttl_secs: 60,
            remote: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteCacheConfig {
    /// Only `redis` is built in.
    pub kind: String,
    pub host: String,
    pub port: u16,
    pub password: String,
    pub secure: bool,

    /// Per-operation deadline; overruns downgrade the request to local-only.
    pub op_timeout_ms: u64,
}

impl Default for RemoteCacheConfig {
    fn default() -> Self {
        Self {
            kind: "redis".to_string(),
            host: "localhost".to_string(),
            port: 6379,
            password: String::new(),
            secure: false,
            op_timeout_ms: 250,
        }
    }
}

impl RemoteCacheConfig {
    pub fn url(&self) -> String {
        let scheme = if self.secure { "rediss" } else { "redis" };
        if self.password.is_empty() {
            format!("{scheme}://{}:{}/", self.host, self.port)
        } else {
            format!("{scheme}://:{}@{}:{}/", self.password, self.host, self.port)
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Request deadline in seconds.
    pub request_timeout_secs: u64,

    /// Status code for the unchanged (empty body) response.
    pub no_change_status: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            no_change_status: 304,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mounts `/admin`, `/crypto`, and the health endpoints.
    pub enabled: bool,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    pub application: ApplicationLogConfig,
    pub access: AccessLogConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApplicationLogConfig {
    pub enabled: bool,
    /// JSON output for production; pretty format otherwise.
    pub json: bool,
    pub level: String,
}

impl Default for ApplicationLogConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            json: false,
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessLogConfig {
    pub enabled: bool,
}

impl Default for AccessLogConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Enable the Prometheus exposition endpoint.
    pub enabled: bool,
    pub bind_address: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl AppConfig {
    /// The effective configuration with secret material masked, for the
    /// admin config dump.
    pub fn show(&self) -> serde_json::Value {
        let mut doc = serde_json::to_value(self).unwrap_or_default();
        let redacted = serde_json::Value::String("redacted".to_string());
        if let Some(auth) = doc.get_mut("authentication") {
            if auth.get("encryption_key").map(|k| !k.is_null()).unwrap_or(false) {
                auth["encryption_key"] = redacted.clone();
            }
            if let Some(pw) = auth.get_mut("auth_passwords") {
                if let Some(list) = pw.as_array_mut() {
                    for item in list.iter_mut() {
                        *item = redacted.clone();
                    }
                }
            }
        }
        if let Some(remote) = doc
            .get_mut("discovery_cache")
            .and_then(|c| c.get_mut("remote"))
        {
            if remote.get("password").map(|p| p != "").unwrap_or(false) {
                remote["password"] = redacted;
            }
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_parses_with_defaults() {
        let cfg: AppConfig = serde_yaml::from_str(
            r#"
sources:
  - type: inline
    config:
      instances:
        - name: a
templates:
  default:
    clusters: "inline+jinja://{\"resources\": []}"
"#,
        )
        .unwrap();
        assert_eq!(cfg.source_config.refresh_rate, 30);
        assert!(cfg.matching.enabled);
        assert_eq!(cfg.matching.node_key, "cluster");
        assert_eq!(cfg.server.no_change_status, 304);
        assert_eq!(cfg.sources[0].scope, "default");
    }

    #[test]
    fn legacy_flat_keys_are_rejected() {
        let result: Result<AppConfig, _> = serde_yaml::from_str("auth_enabled: true\n");
        assert!(result.is_err());
    }

    #[test]
    fn single_key_builds_legacy_chain() {
        let auth: AuthConfig = serde_yaml::from_str(&format!(
            "enabled: true\nencryption_key: \"{}\"\nauth_passwords: [s1]\n",
            crate::crypto::FernetCipher::generate_key()
        ))
        .unwrap();
        let chain = auth.cipher_chain().unwrap();
        assert_eq!(chain.primary_scheme(), "fernet");
    }

    #[test]
    fn multi_scheme_keys_build_ordered_chain() {
        let auth: AuthConfig = serde_yaml::from_str(&format!(
            concat!(
                "enabled: true\n",
                "encryption_key:\n",
                "  - type: aesgcm\n    key: \"{}\"\n",
                "  - type: fernet\n    key: \"{}\"\n",
            ),
            CipherChain::generate_key(),
            crate::crypto::FernetCipher::generate_key(),
        ))
        .unwrap();
        let chain = auth.cipher_chain().unwrap();
        assert_eq!(chain.primary_scheme(), "aesgcm");
    }

    #[test]
    fn show_masks_secrets() {
        let mut cfg = AppConfig::default();
        cfg.authentication.enabled = true;
        cfg.authentication.auth_passwords = vec!["hunter2".into()];
        cfg.authentication.encryption_key = Some(EncryptionKeys::Single("key".into()));
        cfg.discovery_cache.remote = Some(RemoteCacheConfig {
            password: "redis-pass".into(),
            ..Default::default()
        });
        let doc = cfg.show();
        assert_eq!(doc["authentication"]["encryption_key"], "redacted");
        assert_eq!(doc["authentication"]["auth_passwords"][0], "redacted");
        assert_eq!(doc["discovery_cache"]["remote"]["password"], "redacted");
        assert!(doc.to_string().find("hunter2").is_none());
    }
}
