//! Synthesized discovery requests for the admin surface and health checks.

use serde_json::Value;

use crate::discovery::types::{DiscoveryRequest, Locality, Node};

pub struct MockRequest {
    pub service_cluster: String,
    pub resource_names: Vec<String>,
    pub version: String,
    pub metadata: serde_json::Map<String, Value>,
    pub region: Option<String>,
}

impl Default for MockRequest {
    fn default() -> Self {
        Self {
            // A wildcard cluster selects every instance
            service_cluster: "*".to_string(),
            resource_names: Vec::new(),
            version: "1.25.3".to_string(),
            metadata: serde_json::Map::new(),
            region: None,
        }
    }
}

impl MockRequest {
    pub fn build(self) -> DiscoveryRequest {
        DiscoveryRequest {
            node: Node {
                id: "mock".to_string(),
                cluster: self.service_cluster,
                metadata: self.metadata,
                locality: Locality {
                    zone: self.region,
                    ..Locality::default()
                },
                build_version: Some(format!("mock/{}/Clean/RELEASE", self.version)),
                ..Node::default()
            },
            version_info: String::new(),
            resource_names: self.resource_names,
            type_url: None,
        }
    }
}
