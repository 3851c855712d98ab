//! Read-only admin handlers.

use std::collections::BTreeMap;

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::admin::mock::MockRequest;
use crate::discovery::{DiscoveryOutcome, RenderMode};
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::observability::stats;
use crate::templates::TemplateKind;

const ADMIN_MODE: RenderMode = RenderMode {
    skip_auth: true,
    hide_secrets: true,
};

#[derive(Deserialize)]
pub struct XdsDumpParams {
    pub resource_type: String,
    #[serde(default = "wildcard")]
    pub service_cluster: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Comma-separated resource names.
    #[serde(default)]
    pub resource_names: String,
    /// JSON object of node metadata to emulate.
    #[serde(default)]
    pub metadata: String,
    #[serde(default)]
    pub region: Option<String>,
}

fn wildcard() -> String {
    "*".to_string()
}

fn default_version() -> String {
    "1.25.3".to_string()
}

/// Displays resources exactly as a proxy would receive them.
pub async fn xds_dump(
    State(state): State<AppState>,
    Query(params): Query<XdsDumpParams>,
) -> Response {
    let debug = state.config.debug;
    let metadata = if params.metadata.is_empty() {
        serde_json::Map::new()
    } else {
        match serde_json::from_str::<Value>(&params.metadata) {
            Ok(Value::Object(map)) => map,
            _ => {
                return ApiError::new(
                    StatusCode::BAD_REQUEST,
                    "invalid JSON in query parameter 'metadata'",
                    debug,
                )
                .into_response()
            }
        }
    };
    let request = MockRequest {
        service_cluster: params.service_cluster,
        resource_names: split_names(&params.resource_names),
        version: params.version,
        metadata,
        region: params.region,
    }
    .build();

    match state
        .engine
        .discover_with(&request, &params.resource_type, "v3", "admin", ADMIN_MODE)
        .await
    {
        Ok(DiscoveryOutcome::Fresh(response)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            response.body.clone(),
        )
            .into_response(),
        Ok(DiscoveryOutcome::Unchanged { .. }) => StatusCode::NOT_MODIFIED.into_response(),
        Err(e) => ApiError::from_discovery(e, debug).into_response(),
    }
}

#[derive(Deserialize)]
pub struct FetchResourceParams {
    #[serde(default)]
    pub resource_name: Option<String>,
    #[serde(default = "wildcard")]
    pub service_cluster: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub region: Option<String>,
}

/// Fetch resources of one type, optionally narrowed to a single name.
/// Same pipeline as discovery, filtered.
pub async fn fetch_resources(
    State(state): State<AppState>,
    axum::extract::Path(resource_type): axum::extract::Path<String>,
    Query(params): Query<FetchResourceParams>,
) -> Response {
    let debug = state.config.debug;
    let request = MockRequest {
        service_cluster: params.service_cluster,
        resource_names: params.resource_name.into_iter().collect(),
        version: params.version,
        region: params.region,
        ..MockRequest::default()
    }
    .build();

    match state
        .engine
        .discover_with(&request, &resource_type, "v3", "admin", ADMIN_MODE)
        .await
    {
        Ok(DiscoveryOutcome::Fresh(response)) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            response.body.clone(),
        )
            .into_response(),
        Ok(DiscoveryOutcome::Unchanged { .. }) => StatusCode::NOT_MODIFIED.into_response(),
        Err(e) => ApiError::from_discovery(e, debug).into_response(),
    }
}

fn split_names(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Deserialize)]
pub struct SourceDumpParams {
    #[serde(default = "wildcard")]
    pub service_cluster: String,
    /// `yes` (default) dumps post-transform instances, `no` the raw ones.
    #[serde(default = "yes")]
    pub modified: String,
}

fn yes() -> String {
    "yes".to_string()
}

/// Dump the instances this control plane has polled.
pub async fn source_dump(
    State(state): State<AppState>,
    Query(params): Query<SourceDumpParams>,
) -> Response {
    let debug = state.config.debug;
    let request = MockRequest {
        service_cluster: params.service_cluster,
        ..MockRequest::default()
    }
    .build();
    let node_json = match serde_json::to_value(&request.node) {
        Ok(v) => v,
        Err(e) => {
            return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), debug)
                .into_response()
        }
    };
    let matcher = state.engine.matcher();
    let node_value = match matcher.extract_node_value(&node_json) {
        Ok(v) => v,
        Err(e) => {
            return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), debug)
                .into_response()
        }
    };

    let snapshot = state.engine.poller().snapshot();
    let scopes = if params.modified == "no" {
        matcher.select_in(&snapshot.raw, &node_value)
    } else {
        matcher.select_in(&snapshot.scopes, &node_value)
    };
    match scopes {
        Ok(scopes) => Json(json!({
            "generation": snapshot.generation,
            "scopes": scopes,
        }))
        .into_response(),
        Err(e) => {
            ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string(), debug).into_response()
        }
    }
}

/// Per-(version, type) template metadata.
pub async fn templates_metadata(State(state): State<AppState>) -> Json<Value> {
    let mut versions = BTreeMap::new();
    for (version, types) in state.engine.templates().versions() {
        let mut out = BTreeMap::new();
        for (resource_type, artifact) in types {
            let mut referenced: Vec<&String> = artifact.referenced.iter().collect();
            referenced.sort();
            out.insert(
                resource_type.clone(),
                json!({
                    "kind": match artifact.kind {
                        TemplateKind::Text => "text",
                        TemplateKind::Native => "native",
                    },
                    "checksum": format!("{:016x}", artifact.checksum),
                    "source_len": artifact.source.len(),
                    "referenced": referenced,
                }),
            );
        }
        versions.insert(version.clone(), out);
    }
    Json(json!(versions))
}

/// The effective configuration, secrets masked.
pub async fn show_config(State(state): State<AppState>) -> Json<Value> {
    Json(state.config.show())
}

/// Snapshot of every counter emitted so far.
pub async fn show_stats() -> Json<Value> {
    Json(json!(stats::snapshot()))
}

#[derive(Deserialize)]
pub struct ResourceTypesParams {
    #[serde(default = "default_version")]
    pub version: String,
}

/// Resource types configured for a proxy version.
pub async fn resource_types(
    State(state): State<AppState>,
    Query(params): Query<ResourceTypesParams>,
) -> Json<Value> {
    Json(json!(state.engine.templates().resource_types(&params.version)))
}

pub async fn healthz() -> &'static str {
    "OK"
}

/// Renders every configured (version, type) pair against a synthesized
/// request. 200 only when everything renders.
pub async fn deepcheck(State(state): State<AppState>) -> Response {
    let debug = state.config.debug;
    let pairs: Vec<(String, Vec<String>)> = state
        .engine
        .templates()
        .versions()
        .map(|(version, types)| (version.clone(), types.keys().cloned().collect()))
        .collect();

    for (version, types) in pairs {
        for resource_type in types {
            let request = MockRequest {
                version: version.clone(),
                ..MockRequest::default()
            }
            .build();
            if let Err(e) = state
                .engine
                .discover_with(&request, &resource_type, "v3", "deepcheck", ADMIN_MODE)
                .await
            {
                return ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("deepcheck failed for ({version}, {resource_type}): {e}"),
                    debug,
                )
                .into_response();
            }
        }
    }
    "OK".into_response()
}

pub async fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
