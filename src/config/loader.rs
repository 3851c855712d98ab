//! Location-spec resolution.
//!
//! # Responsibilities
//! - Parse compact (`proto+serializer://path`) and structured location specs
//! - Fetch bytes through a registered protocol implementation
//! - Deserialize per the requested serialization
//!
//! # Design Decisions
//! - Protocol implementations are registered explicitly, never discovered
//! - Template sources are syntax-checked at load time but compiled later,
//!   by the template registry, so checksums are taken over raw source bytes
//! - Process-embedded data is a named registry populated at startup

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// How fetched bytes are turned into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Serialization {
    Yaml,
    Json,
    /// Template source text. Syntax-checked on load, compiled by the registry.
    Jinja,
    String,
    Raw,
}

impl Serialization {
    fn parse(s: &str) -> Result<Self, LoadError> {
        match s {
            "yaml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "jinja" | "jinja2" => Ok(Self::Jinja),
            "string" => Ok(Self::String),
            "raw" => Ok(Self::Raw),
            other => Err(LoadError::BadLocation(format!(
                "unknown serialization {other:?}"
            ))),
        }
    }
}

/// A value produced by the loader.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadedValue {
    Structured(serde_json::Value),
    Text(String),
    Bytes(Vec<u8>),
}

impl LoadedValue {
    /// The structured form, parsing text as YAML if necessary.
    pub fn into_structured(self) -> Result<serde_json::Value, LoadError> {
        match self {
            LoadedValue::Structured(v) => Ok(v),
            LoadedValue::Text(s) => serde_yaml::from_str(&s).map_err(|e| LoadError::Decode {
                path: "<text>".into(),
                reason: e.to_string(),
            }),
            LoadedValue::Bytes(_) => Err(LoadError::Decode {
                path: "<bytes>".into(),
                reason: "raw bytes have no structured form".into(),
            }),
        }
    }

    pub fn into_text(self) -> Result<String, LoadError> {
        match self {
            LoadedValue::Text(s) => Ok(s),
            LoadedValue::Bytes(b) => String::from_utf8(b).map_err(|e| LoadError::Decode {
                path: "<bytes>".into(),
                reason: e.to_string(),
            }),
            LoadedValue::Structured(v) => Ok(v.to_string()),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("bad location: {0}")]
    BadLocation(String),
    #[error("failed to decode {path}: {reason}")]
    Decode { path: String, reason: String },
    #[error("i/o error reading {path}: {reason}")]
    Io { path: String, reason: String },
    #[error("unauthorized reading {0}")]
    Unauthorized(String),
}

/// Fetches raw bytes for one protocol scheme.
#[async_trait]
pub trait ProtocolLoader: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError>;
}

fn registry() -> &'static RwLock<HashMap<String, Arc<dyn ProtocolLoader>>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, Arc<dyn ProtocolLoader>>>> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut m: HashMap<String, Arc<dyn ProtocolLoader>> = HashMap::new();
        m.insert("file".into(), Arc::new(FileLoader));
        m.insert("http".into(), Arc::new(HttpLoader));
        m.insert("https".into(), Arc::new(HttpLoader));
        m.insert("env".into(), Arc::new(EnvLoader));
        m.insert("inline".into(), Arc::new(InlineLoader));
        m.insert("embedded".into(), Arc::new(EmbeddedLoader));
        #[cfg(feature = "s3")]
        m.insert("s3".into(), Arc::new(s3::S3Loader));
        RwLock::new(m)
    })
}

/// Register an additional protocol implementation. Names must be unique.
pub fn register_protocol(name: &str, loader: Box<dyn ProtocolLoader>) -> Result<(), LoadError> {
    let mut reg = registry().write().unwrap_or_else(|e| e.into_inner());
    if reg.contains_key(name) {
        return Err(LoadError::BadLocation(format!(
            "protocol {name:?} already registered"
        )));
    }
    reg.insert(name.to_string(), Arc::from(loader));
    Ok(())
}

fn embedded() -> &'static RwLock<HashMap<String, Vec<u8>>> {
    static EMBEDDED: OnceLock<RwLock<HashMap<String, Vec<u8>>>> = OnceLock::new();
    EMBEDDED.get_or_init(|| RwLock::new(HashMap::new()))
}

/// Register a named blob for the `embedded` protocol.
pub fn register_embedded(name: &str, data: impl Into<Vec<u8>>) {
    embedded()
        .write()
        .unwrap_or_else(|e| e.into_inner())
        .insert(name.to_string(), data.into());
}

/// A parsed location spec: `(protocol, serialization, path)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "LoadableRepr")]
pub struct Loadable {
    pub protocol: String,
    pub serialization: Serialization,
    pub path: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LoadableRepr {
    Compact(String),
    Full {
        protocol: String,
        serialization: Option<Serialization>,
        path: String,
    },
}

impl TryFrom<LoadableRepr> for Loadable {
    type Error = LoadError;

    fn try_from(repr: LoadableRepr) -> Result<Self, LoadError> {
        match repr {
            LoadableRepr::Compact(s) => Loadable::from_compact(&s),
            LoadableRepr::Full {
                protocol,
                serialization,
                path,
            } => Ok(Loadable {
                protocol,
                serialization: serialization.unwrap_or(Serialization::Yaml),
                path,
            }),
        }
    }
}

impl fmt::Display for Loadable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.path)
    }
}

impl Loadable {
    /// Parse the compact `<protocol>[+<serializer>]://<path>` form.
    ///
    /// A bare string with no scheme is an inline literal.
    pub fn from_compact(s: &str) -> Result<Self, LoadError> {
        let Some((scheme, path)) = s.split_once("://") else {
            return Ok(Loadable {
                protocol: "inline".into(),
                serialization: Serialization::String,
                path: s.to_string(),
            });
        };
        let (protocol, serialization) = match scheme.split_once('+') {
            Some((p, ser)) => (p.to_string(), Serialization::parse(ser)?),
            None => (scheme.to_string(), Serialization::Yaml),
        };
        // http loaders need the scheme preserved in the path
        let path = if protocol == "http" || protocol == "https" {
            format!("{protocol}://{path}")
        } else {
            path.to_string()
        };
        Ok(Loadable {
            protocol,
            serialization,
            path,
        })
    }

    pub async fn load(&self) -> Result<LoadedValue, LoadError> {
        let loader = {
            let reg = registry().read().unwrap_or_else(|e| e.into_inner());
            reg.get(&self.protocol)
                .ok_or_else(|| {
                    LoadError::BadLocation(format!("unknown protocol {:?}", self.protocol))
                })?
                .clone()
        };
        let bytes = loader.fetch(&self.path).await?;
        self.deserialize(bytes)
    }

    fn deserialize(&self, bytes: Vec<u8>) -> Result<LoadedValue, LoadError> {
        let decode = |reason: String| LoadError::Decode {
            path: self.path.clone(),
            reason,
        };
        match self.serialization {
            Serialization::Raw => Ok(LoadedValue::Bytes(bytes)),
            Serialization::String => {
                let s = String::from_utf8(bytes).map_err(|e| decode(e.to_string()))?;
                Ok(LoadedValue::Text(s))
            }
            Serialization::Jinja => {
                let s = String::from_utf8(bytes).map_err(|e| decode(e.to_string()))?;
                // Syntax check only; the registry compiles into its shared environment.
                let mut env = minijinja::Environment::new();
                env.add_template_owned("__check__".to_string(), s.clone())
                    .map_err(|e| decode(e.to_string()))?;
                Ok(LoadedValue::Text(s))
            }
            Serialization::Yaml => {
                let s = String::from_utf8(bytes).map_err(|e| decode(e.to_string()))?;
                let v: serde_json::Value =
                    serde_yaml::from_str(&s).map_err(|e| decode(e.to_string()))?;
                Ok(LoadedValue::Structured(v))
            }
            Serialization::Json => {
                let v: serde_json::Value =
                    serde_json::from_slice(&bytes).map_err(|e| decode(e.to_string()))?;
                Ok(LoadedValue::Structured(v))
            }
        }
    }
}

struct FileLoader;

#[async_trait]
impl ProtocolLoader for FileLoader {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        tokio::fs::read(path).await.map_err(|e| LoadError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })
    }
}

struct HttpLoader;

#[async_trait]
impl ProtocolLoader for HttpLoader {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        let io = |reason: String| LoadError::Io {
            path: path.to_string(),
            reason,
        };
        let response = reqwest::get(path).await.map_err(|e| io(e.to_string()))?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(LoadError::Unauthorized(path.to_string()));
        }
        let response = response.error_for_status().map_err(|e| io(e.to_string()))?;
        let body = response.bytes().await.map_err(|e| io(e.to_string()))?;
        Ok(body.to_vec())
    }
}

struct EnvLoader;

#[async_trait]
impl ProtocolLoader for EnvLoader {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        std::env::var(path)
            .map(String::into_bytes)
            .map_err(|_| LoadError::Io {
                path: path.to_string(),
                reason: "environment variable not set".into(),
            })
    }
}

struct InlineLoader;

#[async_trait]
impl ProtocolLoader for InlineLoader {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        Ok(path.as_bytes().to_vec())
    }
}

struct EmbeddedLoader;

#[async_trait]
impl ProtocolLoader for EmbeddedLoader {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
        embedded()
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(path)
            .cloned()
            .ok_or_else(|| LoadError::Io {
                path: path.to_string(),
                reason: "no embedded data registered under this name".into(),
            })
    }
}

#[cfg(feature = "s3")]
mod s3 {
    use super::*;

    pub(super) struct S3Loader;

    #[async_trait]
    impl ProtocolLoader for S3Loader {
        async fn fetch(&self, path: &str) -> Result<Vec<u8>, LoadError> {
            let io = |reason: String| LoadError::Io {
                path: path.to_string(),
                reason,
            };
            let (bucket, key) = path.split_once('/').ok_or_else(|| {
                LoadError::BadLocation(format!("s3 path {path:?} must be bucket/key"))
            })?;
            let config = aws_config::load_from_env().await;
            let client = aws_sdk_s3::Client::new(&config);
            let object = client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(|e| io(e.to_string()))?;
            let body = object.body.collect().await.map_err(|e| io(e.to_string()))?;
            Ok(body.into_bytes().to_vec())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compact_spec_with_serializer() {
        let l = Loadable::from_compact("file+json:///etc/instances.json").unwrap();
        assert_eq!(l.protocol, "file");
        assert_eq!(l.serialization, Serialization::Json);
        assert_eq!(l.path, "/etc/instances.json");
    }

    #[test]
    fn compact_spec_defaults_to_yaml() {
        let l = Loadable::from_compact("file:///etc/instances.yaml").unwrap();
        assert_eq!(l.serialization, Serialization::Yaml);
    }

    #[test]
    fn http_spec_keeps_scheme_in_path() {
        let l = Loadable::from_compact("https+json://config.internal/dev.json").unwrap();
        assert_eq!(l.protocol, "https");
        assert_eq!(l.path, "https://config.internal/dev.json");
    }

    #[test]
    fn bare_string_is_inline_literal() {
        let l = Loadable::from_compact("just a value").unwrap();
        assert_eq!(l.protocol, "inline");
        assert_eq!(l.serialization, Serialization::String);
    }

    #[test]
    fn structured_spec_deserializes() {
        let l: Loadable =
            serde_yaml::from_str("protocol: file\nserialization: jinja\npath: /etc/t.j2\n").unwrap();
        assert_eq!(l.protocol, "file");
        assert_eq!(l.serialization, Serialization::Jinja);
    }

    #[tokio::test]
    async fn unknown_protocol_is_bad_location() {
        let l = Loadable {
            protocol: "gopher".into(),
            serialization: Serialization::Raw,
            path: "x".into(),
        };
        assert!(matches!(l.load().await, Err(LoadError::BadLocation(_))));
    }

    #[tokio::test]
    async fn inline_yaml_loads_structured() {
        let l = Loadable {
            protocol: "inline".into(),
            serialization: Serialization::Yaml,
            path: "{a: 1}".into(),
        };
        let v = l.load().await.unwrap().into_structured().unwrap();
        assert_eq!(v["a"], 1);
    }

    #[tokio::test]
    async fn embedded_round_trip() {
        register_embedded("unit-test-blob", "hello".as_bytes());
        let l = Loadable {
            protocol: "embedded".into(),
            serialization: Serialization::String,
            path: "unit-test-blob".into(),
        };
        assert_eq!(l.load().await.unwrap().into_text().unwrap(), "hello");
    }

    #[tokio::test]
    async fn file_loader_reads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inst.yaml");
        std::fs::write(&path, "- name: a\n").unwrap();
        let l = Loadable::from_compact(&format!("file://{}", path.display())).unwrap();
        let v = l.load().await.unwrap().into_structured().unwrap();
        assert_eq!(v[0]["name"], "a");
    }

    #[tokio::test]
    async fn jinja_serialization_rejects_bad_syntax() {
        let l = Loadable {
            protocol: "inline".into(),
            serialization: Serialization::Jinja,
            path: "{% for %}".into(),
        };
        assert!(matches!(l.load().await, Err(LoadError::Decode { .. })));
    }
}
