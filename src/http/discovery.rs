//! The proxy-facing discovery endpoint.

use std::time::{Duration, Instant};

use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::discovery::types::DiscoveryRequest;
use crate::discovery::DiscoveryOutcome;
use crate::http::error::ApiError;
use crate::http::server::AppState;
use crate::observability::metrics;

pub const CLIENT_BUILD_HEADER: &str = "x-regency-client-build";
pub const REQUESTED_TYPE_HEADER: &str = "x-regency-requested-type";
pub const REQUESTED_RESOURCES_HEADER: &str = "x-regency-requested-resources";
pub const RESPONSE_VERSION_HEADER: &str = "x-regency-response-version";
pub const SERVER_VERSION_HEADER: &str = "x-regency-server-version";

/// `POST /{v2|v3}/discovery/{resource_type}`.
pub async fn discovery_handler(
    State(state): State<AppState>,
    Path((api_generation, resource_type)): Path<(String, String)>,
    headers: HeaderMap,
    Json(request): Json<DiscoveryRequest>,
) -> Response {
    let debug = state.config.debug;
    if api_generation != "v2" && api_generation != "v3" {
        return ApiError::new(
            StatusCode::NOT_FOUND,
            format!("unknown API generation {api_generation:?}"),
            debug,
        )
        .into_response();
    }

    let host_header = headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let started = Instant::now();
    let deadline = Duration::from_secs(state.config.server.request_timeout_secs);
    let outcome = match tokio::time::timeout(
        deadline,
        state
            .engine
            .discover(&request, &resource_type, &api_generation, &host_header),
    )
    .await
    {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(e)) => {
            let error = ApiError::from_discovery(e, debug);
            metrics::record_discovery(&resource_type, error.status.as_u16(), started);
            return error.into_response();
        }
        // The engine future is dropped here, so no cache write can happen
        // past the deadline.
        Err(_) => {
            metrics::record_discovery(&resource_type, 504, started);
            return ApiError::timeout(debug).into_response();
        }
    };

    let mut response_headers = extra_headers(&request, &resource_type, outcome.version_info());
    match outcome {
        DiscoveryOutcome::Unchanged { .. } => {
            let status = StatusCode::from_u16(state.config.server.no_change_status)
                .unwrap_or(StatusCode::NOT_MODIFIED);
            metrics::record_discovery(&resource_type, status.as_u16(), started);
            (status, response_headers).into_response()
        }
        DiscoveryOutcome::Fresh(response) => {
            response_headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            );
            metrics::record_discovery(&resource_type, 200, started);
            (StatusCode::OK, response_headers, response.body.clone()).into_response()
        }
    }
}

fn extra_headers(request: &DiscoveryRequest, resource_type: &str, version: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let mut put = |name: &'static str, value: String| {
        if let Ok(value) = HeaderValue::from_str(&value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    };
    put(CLIENT_BUILD_HEADER, request.node.proxy_version());
    put(REQUESTED_TYPE_HEADER, resource_type.to_string());
    let requested = if request.resource_names.is_empty() {
        "all".to_string()
    } else {
        request.resource_names.join(",")
    };
    put(REQUESTED_RESOURCES_HEADER, requested);
    put(RESPONSE_VERSION_HEADER, version.to_string());
    put(SERVER_VERSION_HEADER, env!("CARGO_PKG_VERSION").to_string());
    headers
}
