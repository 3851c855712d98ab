//! Template registry.
//!
//! # Responsibilities
//! - Load and compile every configured `(version, resource type)` template
//! - Select artifacts by exact version, longest dotted prefix, or `default`
//! - Expose source checksums and referenced identifiers for fingerprinting
//!
//! # Design Decisions
//! - Two template kinds: text (rendered then parsed) and native (a Rust
//!   generator producing structured resources directly). Native is the hot
//!   path; text is for user-authored templates.
//! - Artifacts are compiled once at startup into one shared environment
//!   and never change afterwards

pub mod native;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use minijinja::value::Object;
use minijinja::Environment;
use serde_json::Value;

use crate::config::loader::{Loadable, LoadError};
use crate::crypto::CipherChain;
use crate::discovery::fingerprint::hash_bytes;

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to load template: {0}")]
    Load(#[from] LoadError),
    #[error("template {name}: {reason}")]
    Compile { name: String, reason: String },
    #[error("template {name} failed to render: {reason}")]
    Render { name: String, reason: String },
    #[error("rendered output of {name} is not a structured document: {reason}")]
    Parse { name: String, reason: String },
    #[error("native template {0:?} is not registered")]
    NativeNotRegistered(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateKind {
    Text,
    Native,
}

/// A compiled template plus the metadata the engine fingerprints.
pub struct TemplateArtifact {
    pub kind: TemplateKind,
    /// Raw source for text templates; the generator name for native ones.
    pub source: String,
    /// Checksum over the source bytes, part of every fingerprint.
    pub checksum: u64,
    /// Free identifiers the template references, for context pruning.
    pub referenced: HashSet<String>,
    /// Key into the shared environment (text kind only).
    env_key: String,
}

/// What a render produced: text still needs parsing, native is structured.
pub enum Rendered {
    Text(String),
    Structured(Value),
}

pub struct TemplateRegistry {
    env: Environment<'static>,
    versions: BTreeMap<String, BTreeMap<String, Arc<TemplateArtifact>>>,
}

impl TemplateRegistry {
    pub async fn from_config(
        templates: &BTreeMap<String, BTreeMap<String, Loadable>>,
    ) -> Result<Self, TemplateError> {
        let mut env = Environment::new();
        let mut versions = BTreeMap::new();

        for (version, types) in templates {
            let mut artifacts = BTreeMap::new();
            for (resource_type, spec) in types {
                let env_key = format!("{version}/{resource_type}");
                let artifact = if spec.protocol == "native" {
                    Self::native_artifact(&spec.path, &env_key)?
                } else {
                    Self::text_artifact(spec, &env_key, &mut env).await?
                };
                artifacts.insert(resource_type.clone(), Arc::new(artifact));
            }
            versions.insert(version.clone(), artifacts);
        }

        Ok(Self { env, versions })
    }

    fn native_artifact(name: &str, env_key: &str) -> Result<TemplateArtifact, TemplateError> {
        let generator = native::lookup(name)
            .ok_or_else(|| TemplateError::NativeNotRegistered(name.to_string()))?;
        Ok(TemplateArtifact {
            kind: TemplateKind::Native,
            source: name.to_string(),
            checksum: hash_bytes(format!("native:{name}").as_bytes()),
            referenced: generator.referenced.iter().map(|s| s.to_string()).collect(),
            env_key: env_key.to_string(),
        })
    }

    async fn text_artifact(
        spec: &Loadable,
        env_key: &str,
        env: &mut Environment<'static>,
    ) -> Result<TemplateArtifact, TemplateError> {
        let source = spec.load().await?.into_text()?;
        env.add_template_owned(env_key.to_string(), source.clone())
            .map_err(|e| TemplateError::Compile {
                name: env_key.to_string(),
                reason: e.to_string(),
            })?;
        // Top-level names only; pruning works on entry names, not paths.
        let referenced = match env.get_template(env_key) {
            Ok(template) => template.undeclared_variables(false),
            Err(_) => HashSet::new(),
        };
        Ok(TemplateArtifact {
            kind: TemplateKind::Text,
            checksum: hash_bytes(source.as_bytes()),
            source,
            referenced,
            env_key: env_key.to_string(),
        })
    }

    /// Exact version, then longest dotted-prefix match, then `default`.
    /// Returns `None` when nothing in the chain carries the resource type.
    pub fn select(&self, version: &str, resource_type: &str) -> Option<Arc<TemplateArtifact>> {
        for candidate in self.version_chain(version) {
            if let Some(artifact) = self
                .versions
                .get(&candidate)
                .and_then(|types| types.get(resource_type))
            {
                return Some(artifact.clone());
            }
        }
        None
    }

    fn version_chain(&self, version: &str) -> Vec<String> {
        let mut chain = Vec::new();
        if self.versions.contains_key(version) {
            chain.push(version.to_string());
        }
        let mut prefixes: Vec<&String> = self
            .versions
            .keys()
            .filter(|key| key.as_str() != version && *key != "default")
            .filter(|key| prefix_matches(key, version))
            .collect();
        // longest prefix (most dotted components) first
        prefixes.sort_by_key(|key| std::cmp::Reverse(key.split('.').count()));
        chain.extend(prefixes.into_iter().cloned());
        chain.push("default".to_string());
        chain
    }

    /// Resource types configured for a given proxy version (with fallback).
    pub fn resource_types(&self, version: &str) -> Vec<String> {
        let mut types = BTreeSet::new();
        for candidate in self.version_chain(version) {
            if let Some(map) = self.versions.get(&candidate) {
                types.extend(map.keys().cloned());
            }
        }
        types.into_iter().collect()
    }

    /// Every configured resource type, across all versions.
    pub fn all_resource_types(&self) -> Vec<String> {
        let mut types = BTreeSet::new();
        for map in self.versions.values() {
            types.extend(map.keys().cloned());
        }
        types.into_iter().collect()
    }

    pub fn versions(&self) -> impl Iterator<Item = (&String, &BTreeMap<String, Arc<TemplateArtifact>>)> {
        self.versions.iter()
    }

    /// Invoke a template with the prepared context map. `cipher` is exposed
    /// to text templates as a `crypto` object with `encrypt`, `decrypt`,
    /// and `decryptable` methods.
    pub fn render(
        &self,
        artifact: &TemplateArtifact,
        context: &Value,
        cipher: Option<Arc<CipherChain>>,
    ) -> Result<Rendered, TemplateError> {
        match artifact.kind {
            TemplateKind::Native => {
                let generator = native::lookup(&artifact.source)
                    .ok_or_else(|| TemplateError::NativeNotRegistered(artifact.source.clone()))?;
                let resources = (generator.call)(context).map_err(|reason| TemplateError::Render {
                    name: artifact.source.clone(),
                    reason,
                })?;
                Ok(Rendered::Structured(
                    serde_json::json!({ "resources": resources }),
                ))
            }
            TemplateKind::Text => {
                let template =
                    self.env
                        .get_template(&artifact.env_key)
                        .map_err(|e| TemplateError::Render {
                            name: artifact.env_key.clone(),
                            reason: e.to_string(),
                        })?;
                let mut entries: Vec<(String, minijinja::Value)> = context
                    .as_object()
                    .map(|map| {
                        map.iter()
                            .map(|(k, v)| (k.clone(), minijinja::Value::from_serialize(v)))
                            .collect()
                    })
                    .unwrap_or_default();
                if let Some(chain) = cipher {
                    entries.push((
                        "crypto".to_string(),
                        minijinja::Value::from_object(CryptoHelper { chain }),
                    ));
                }
                let output = template
                    .render(minijinja::Value::from_iter(entries))
                    .map_err(|e| TemplateError::Render {
                        name: artifact.env_key.clone(),
                        reason: e.to_string(),
                    })?;
                Ok(Rendered::Text(output))
            }
        }
    }
}

/// Bridges the cipher chain into template expressions.
struct CryptoHelper {
    chain: Arc<CipherChain>,
}

impl std::fmt::Debug for CryptoHelper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CryptoHelper({})", self.chain.primary_scheme())
    }
}

impl Object for CryptoHelper {
    fn call_method(
        self: &Arc<Self>,
        _state: &minijinja::State<'_, '_>,
        method: &str,
        args: &[minijinja::Value],
    ) -> Result<minijinja::Value, minijinja::Error> {
        let arg = args.first().and_then(|v| v.as_str()).ok_or_else(|| {
            minijinja::Error::new(
                minijinja::ErrorKind::MissingArgument,
                "crypto methods take one string argument",
            )
        })?;
        match method {
            "encrypt" => self.chain.encrypt(arg).map(minijinja::Value::from).map_err(|e| {
                minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
            }),
            "decrypt" => self.chain.decrypt(arg).map(minijinja::Value::from).map_err(|e| {
                minijinja::Error::new(minijinja::ErrorKind::InvalidOperation, e.to_string())
            }),
            "decryptable" => Ok(minijinja::Value::from(self.chain.decryptable(arg))),
            other => Err(minijinja::Error::new(
                minijinja::ErrorKind::UnknownMethod,
                format!("crypto has no method {other:?}"),
            )),
        }
    }
}

fn prefix_matches(key: &str, version: &str) -> bool {
    let key_parts: Vec<&str> = key.split('.').collect();
    let version_parts: Vec<&str> = version.split('.').collect();
    if key_parts.len() > version_parts.len() {
        return false;
    }
    key_parts.iter().zip(&version_parts).all(|(k, v)| k == v)
}
