//! Discovery engine: the per-request pipeline.
//!
//! # Data Flow
//! ```text
//! request → auth gate → template select → instance select (node matcher)
//!         → context build + prune → fingerprint
//!         → unchanged? / cache hit? / render → parse → filter → type URLs
//!         → version stamp → serialize → cache fill → response
//! ```
//!
//! # Design Decisions
//! - The engine never throws across its public surface: it returns a typed
//!   result and the HTTP wrapper owns status-code mapping
//! - One instance snapshot and one value per context entry are captured at
//!   request start; nothing re-reads mid-request
//! - Duplicate renders under concurrent misses are accepted in preference
//!   to lock contention

pub mod fingerprint;
pub mod resources;
pub mod types;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use crate::cache::{CachedResponse, DiscoveryCache};
use crate::config::schema::AppConfig;
use crate::context::TemplateContext;
use crate::crypto::CipherChain;
use crate::matching::{MatchError, NodeMatcher};
use crate::observability::stats;
use crate::sources::poller::SourcePoller;
use crate::templates::{Rendered, TemplateError, TemplateRegistry};

use fingerprint::{canonical_hash, FingerprintInputs};
use resources::{add_type_urls, filter_resources};
use types::{DiscoveryRequest, DiscoveryResponse};

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("no template configured for version {version:?}, type {resource_type:?}")]
    NotConfigured {
        version: String,
        resource_type: String,
    },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("node matched no instances; check that the node match key aligns with the source match key")]
    NoInstancesMatched,
    #[error("internal: {0}")]
    Internal(String),
}

impl From<MatchError> for DiscoveryError {
    fn from(e: MatchError) -> Self {
        DiscoveryError::Internal(e.to_string())
    }
}

/// What `discover` produced.
#[derive(Debug)]
pub enum DiscoveryOutcome {
    /// The proxy already holds the current configuration.
    Unchanged { version_info: String },
    /// A (possibly cached) serialized response.
    Fresh(Arc<CachedResponse>),
}

impl DiscoveryOutcome {
    pub fn version_info(&self) -> &str {
        match self {
            DiscoveryOutcome::Unchanged { version_info } => version_info,
            DiscoveryOutcome::Fresh(response) => &response.version_info,
        }
    }
}

/// Render variations used by the admin surface.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderMode {
    /// Admin requests bypass the auth gate.
    pub skip_auth: bool,
    /// Swap the cipher for the disabled suite so secrets render masked.
    pub hide_secrets: bool,
}

pub struct DiscoveryEngine {
    templates: TemplateRegistry,
    context: Arc<TemplateContext>,
    poller: Arc<SourcePoller>,
    matcher: NodeMatcher,
    cipher: Arc<CipherChain>,
    disabled_cipher: Arc<CipherChain>,
    cache: DiscoveryCache,
    auth_enabled: bool,
    passwords: Vec<String>,
    extra_keys: Vec<String>,
}

impl DiscoveryEngine {
    pub fn new(
        config: &AppConfig,
        poller: Arc<SourcePoller>,
        context: Arc<TemplateContext>,
        templates: TemplateRegistry,
        cache: DiscoveryCache,
        cipher: Arc<CipherChain>,
    ) -> Self {
        Self {
            templates,
            context,
            poller,
            matcher: NodeMatcher::new(
                config.matching.enabled,
                &config.matching.source_key,
                &config.matching.node_key,
                config.debug,
            ),
            cipher,
            disabled_cipher: Arc::new(CipherChain::disabled()),
            cache,
            auth_enabled: config.authentication.enabled,
            passwords: config.authentication.auth_passwords.clone(),
            extra_keys: config.source_config.extra_keys.clone(),
        }
    }

    pub fn templates(&self) -> &TemplateRegistry {
        &self.templates
    }

    pub fn poller(&self) -> &Arc<SourcePoller> {
        &self.poller
    }

    pub fn matcher(&self) -> &NodeMatcher {
        &self.matcher
    }

    pub fn context(&self) -> &Arc<TemplateContext> {
        &self.context
    }

    pub fn cipher(&self) -> &Arc<CipherChain> {
        &self.cipher
    }

    pub async fn discover(
        &self,
        request: &DiscoveryRequest,
        resource_type: &str,
        api_generation: &str,
        host_header: &str,
    ) -> Result<DiscoveryOutcome, DiscoveryError> {
        self.discover_with(request, resource_type, api_generation, host_header, RenderMode::default())
            .await
    }

    pub async fn discover_with(
        &self,
        request: &DiscoveryRequest,
        resource_type: &str,
        api_generation: &str,
        host_header: &str,
        mode: RenderMode,
    ) -> Result<DiscoveryOutcome, DiscoveryError> {
        stats::increment("discovery.rq_total");

        if self.auth_enabled && !mode.skip_auth {
            self.authenticate(request)?;
        }

        let version = request.node.proxy_version();
        let template = self.templates.select(&version, resource_type).ok_or_else(|| {
            DiscoveryError::NotConfigured {
                version: version.clone(),
                resource_type: resource_type.to_string(),
            }
        })?;

        // One snapshot per request; every read below observes this generation.
        let snapshot = self.poller.snapshot();
        let node_json = serde_json::to_value(&request.node)
            .map_err(|e| DiscoveryError::Internal(e.to_string()))?;
        // With matching off the node key is only a fingerprint input, so a
        // node that lacks it entirely is still servable.
        let node_value = if self.matcher.enabled() {
            self.matcher.extract_node_value(&node_json)?
        } else {
            self.matcher
                .extract_node_value(&node_json)
                .unwrap_or(Value::Null)
        };
        let scopes = self.matcher.select_scopes(&snapshot, &node_value)?;
        if scopes.values().map(Vec::len).sum::<usize>() == 0 {
            return Err(DiscoveryError::NoInstancesMatched);
        }

        let mut context_map: BTreeMap<String, Value> = self
            .context
            .current()
            .into_iter()
            .map(|(name, value)| (name, (*value).clone()))
            .collect();

        // Scope `default` feeds `instances` together with the typed scope;
        // named scopes are additionally visible under their own names.
        let mut instances: Vec<Value> = Vec::new();
        if let Some(typed) = scopes.get(resource_type) {
            instances.extend(typed.iter().cloned().map(Value::Object));
        }
        if let Some(default) = scopes.get("default").filter(|_| resource_type != "default") {
            instances.extend(default.iter().cloned().map(Value::Object));
        }
        context_map.insert("instances".to_string(), Value::Array(instances));
        for (scope, scoped) in &scopes {
            if scope != "default" {
                context_map.insert(
                    scope.clone(),
                    Value::Array(scoped.iter().cloned().map(Value::Object).collect()),
                );
            }
        }
        // The proxy's own version_info must not feed back into the
        // fingerprint, or unchanged-detection would never converge.
        let mut context_request = request.clone();
        context_request.version_info = String::new();
        context_map.insert(
            "discovery_request".to_string(),
            serde_json::to_value(&context_request)
                .map_err(|e| DiscoveryError::Internal(e.to_string()))?,
        );
        context_map.insert("host_header".to_string(), Value::String(host_header.to_string()));
        context_map.insert(
            "resource_names".to_string(),
            serde_json::to_value(&request.resource_names)
                .map_err(|e| DiscoveryError::Internal(e.to_string()))?,
        );

        // Prune to what the template actually references, so unrelated
        // context churn cannot move the fingerprint.
        context_map.retain(|name, _| template.referenced.contains(name));
        let wants_crypto = template.referenced.contains("crypto");

        let pruned = Value::Object(context_map.into_iter().collect());
        let context_checksum = canonical_hash(&pruned);

        // Secret-hiding renders fingerprint under the disabled suite's
        // identity so they can never collide with real cached responses.
        let cipher_identity = if mode.hide_secrets {
            self.disabled_cipher.identity()
        } else {
            self.cipher.identity()
        };
        let version_info = FingerprintInputs {
            resource_type,
            api_generation,
            template_checksum: template.checksum,
            instances_content_id: snapshot.content_id,
            node_match_value: &node_value,
            requested_names: &request.resource_names,
            host_header,
            context_checksum,
            cipher_identity: &cipher_identity,
            extra_keys: &self.extra_keys,
        }
        .compute();

        if request.version_info == version_info {
            stats::increment("discovery.unchanged");
            return Ok(DiscoveryOutcome::Unchanged { version_info });
        }

        if let Some(hit) = self.cache.get(&version_info).await {
            return Ok(DiscoveryOutcome::Fresh(hit));
        }

        let cipher = if wants_crypto {
            Some(if mode.hide_secrets {
                self.disabled_cipher.clone()
            } else {
                self.cipher.clone()
            })
        } else {
            None
        };

        let started = Instant::now();
        let rendered = self.templates.render(&template, &pruned, cipher)?;
        stats::timed("template.render_ms", started);

        let document = match rendered {
            Rendered::Structured(doc) => doc,
            Rendered::Text(text) => {
                serde_yaml::from_str::<Value>(&text).map_err(|e| TemplateError::Parse {
                    name: resource_type.to_string(),
                    reason: e.to_string(),
                })?
            }
        };
        let Some(Value::Array(generated)) = document.get("resources").cloned() else {
            return Err(TemplateError::Parse {
                name: resource_type.to_string(),
                reason: "rendered document has no resources list".to_string(),
            }
            .into());
        };

        let mut kept = filter_resources(generated, &request.resource_names)?;
        add_type_urls(api_generation, resource_type, &mut kept);

        let resource_count = kept.len();
        let body = serde_json::to_string(&DiscoveryResponse {
            version_info: version_info.clone(),
            resources: kept,
        })
        .map_err(|e| DiscoveryError::Internal(e.to_string()))?;

        let response = Arc::new(CachedResponse {
            version_info,
            body,
            resource_count,
        });
        self.cache.put(&response.version_info, response.clone()).await;
        Ok(DiscoveryOutcome::Fresh(response))
    }

    fn authenticate(&self, request: &DiscoveryRequest) -> Result<(), DiscoveryError> {
        if !self.cipher.key_available() {
            return Err(DiscoveryError::Internal(
                "authentication is enabled but no encryption key is loaded".to_string(),
            ));
        }
        let credential = request
            .node
            .metadata
            .get("auth")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                stats::increment("discovery.auth.failed");
                DiscoveryError::Unauthorized(format!(
                    "discovery request from {} is missing the auth field",
                    request.node.id
                ))
            })?;

        let started = Instant::now();
        let plaintext = self.cipher.decrypt(credential).map_err(|_| {
            stats::increment("discovery.auth.failed");
            DiscoveryError::Unauthorized("the credential provided was invalid".to_string())
        })?;
        stats::timed("discovery.auth.ms", started);

        if self.passwords.iter().any(|p| p == &plaintext) {
            stats::increment("discovery.auth.success");
            Ok(())
        } else {
            stats::increment("discovery.auth.failed");
            Err(DiscoveryError::Unauthorized(
                "the credential provided was invalid".to_string(),
            ))
        }
    }
}
