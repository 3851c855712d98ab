//! Wire types for the poll-based discovery protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Locality {
    pub region: Option<String>,
    pub zone: Option<String>,
    pub sub_zone: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct SemanticVersion {
    pub major_number: u64,
    pub minor_number: u64,
    pub patch: u64,
}

impl std::fmt::Display for SemanticVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major_number, self.minor_number, self.patch)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct BuildVersion {
    pub version: SemanticVersion,
    pub metadata: serde_json::Map<String, Value>,
}

/// The proxy-identifying block inside a discovery request.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Node {
    /// Hostname.
    pub id: String,

    /// The service cluster configured by the proxy.
    pub cluster: String,

    /// Key/value metadata; carries the `auth` credential when auth is on.
    pub metadata: serde_json::Map<String, Value>,

    pub locality: Locality,

    /// Legacy build string: `<revision>/<version>/<flags>...`.
    pub build_version: Option<String>,

    pub user_agent_name: String,
    pub user_agent_version: String,
    pub user_agent_build_version: BuildVersion,
}

impl Default for Node {
    fn default() -> Self {
        Self {
            id: "-".to_string(),
            cluster: String::new(),
            metadata: serde_json::Map::new(),
            locality: Locality::default(),
            build_version: None,
            user_agent_name: "envoy".to_string(),
            user_agent_version: String::new(),
            user_agent_build_version: BuildVersion::default(),
        }
    }
}

impl Node {
    /// The proxy release this node runs, used for template selection.
    ///
    /// Prefers the structured user-agent version; falls back to the second
    /// segment of the legacy build string; `default` when neither parses.
    pub fn proxy_version(&self) -> String {
        let structured = self.user_agent_build_version.version.to_string();
        if structured != "0.0.0" {
            return structured;
        }
        if let Some(build) = &self.build_version {
            let mut parts = build.split('/');
            if let (Some(_revision), Some(version)) = (parts.next(), parts.next()) {
                if !version.is_empty() {
                    return version.to_string();
                }
            }
        }
        "default".to_string()
    }
}

/// A proxy's poll for one resource type.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DiscoveryRequest {
    pub node: Node,

    /// Version of the configuration the proxy currently holds.
    pub version_info: String,

    /// Requested resource names. Empty means everything.
    pub resource_names: Vec<String>,

    /// Discriminator URL for the requested type, if the proxy sent one.
    pub type_url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryResponse {
    pub version_info: String,
    pub resources: Vec<Value>,
}
