//! Shared fixtures for integration testing.

#![allow(dead_code)]

use std::sync::Arc;

use regency::cache::DiscoveryCache;
use regency::config::AppConfig;
use regency::context::TemplateContext;
use regency::discovery::types::{DiscoveryRequest, Node};
use regency::discovery::DiscoveryEngine;
use regency::http::server::AppState;
use regency::sources::poller::SourcePoller;
use regency::templates::TemplateRegistry;

/// A fully-assembled control plane, short of the TCP listener.
pub struct TestPlane {
    pub engine: Arc<DiscoveryEngine>,
    pub config: Arc<AppConfig>,
    pub poller: Arc<SourcePoller>,
}

impl TestPlane {
    pub fn state(&self) -> AppState {
        AppState {
            engine: self.engine.clone(),
            config: self.config.clone(),
        }
    }
}

pub async fn plane_from_yaml(yaml: &str) -> TestPlane {
    let config: AppConfig = serde_yaml::from_str(yaml).expect("test config must parse");
    build_plane(config).await
}

pub async fn build_plane(config: AppConfig) -> TestPlane {
    let cipher = Arc::new(config.authentication.cipher_chain().expect("cipher chain"));
    let poller = Arc::new(SourcePoller::new(&config).expect("poller"));
    poller.initial_load().await.expect("initial poll");
    let context = Arc::new(
        TemplateContext::from_config(&config.template_context)
            .await
            .expect("template context"),
    );
    let templates = TemplateRegistry::from_config(&config.templates)
        .await
        .expect("template registry");
    let cache = DiscoveryCache::from_config(&config.discovery_cache).await;
    let engine = Arc::new(DiscoveryEngine::new(
        &config,
        poller.clone(),
        context,
        templates,
        cache,
        cipher,
    ));
    TestPlane {
        engine,
        config: Arc::new(config),
        poller,
    }
}

/// A name-echoing clusters template: one resource per matched instance,
/// rendered in YAML flow style so the whole location string fits one line.
pub const NAME_TEMPLATE: &str = "inline+jinja://resources: [{% for instance in instances %}{name: {{ instance.name }}}{% if not loop.last %}, {% endif %}{% endfor %}]";

/// Baseline config: one inline instance in cluster T1, node matching on.
pub fn baseline_yaml() -> String {
    format!(
        r#"
sources:
  - type: inline
    config:
      instances:
        - name: a
          service_clusters: [T1]
          endpoints:
            - address: x
              port: 1
              region: r
templates:
  default:
    clusters: "{NAME_TEMPLATE}"
"#
    )
}

pub fn node(cluster: &str, version: &str) -> Node {
    Node {
        cluster: cluster.to_string(),
        build_version: Some(format!("testhash/{version}/Clean/RELEASE")),
        ..Node::default()
    }
}

pub fn request(cluster: &str, version: &str) -> DiscoveryRequest {
    DiscoveryRequest {
        node: node(cluster, version),
        version_info: String::new(),
        resource_names: Vec::new(),
        type_url: None,
    }
}

/// Resource names from a serialized discovery response body.
pub fn resource_names(body: &str) -> Vec<String> {
    let parsed: serde_json::Value = serde_json::from_str(body).expect("response body is JSON");
    parsed["resources"]
        .as_array()
        .expect("resources is a list")
        .iter()
        .map(|r| {
            r.get("name")
                .or_else(|| r.get("cluster_name"))
                .and_then(|n| n.as_str())
                .expect("resource has a name")
                .to_string()
        })
        .collect()
}
