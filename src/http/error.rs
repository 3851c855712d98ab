//! Error-to-status mapping for the HTTP surface.
//!
//! The engine returns typed errors; this is the only place that knows
//! which status each kind maps to. Bodies carry a JSON `detail` field in
//! debug mode and stay terse otherwise.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::discovery::DiscoveryError;

pub struct ApiError {
    pub status: StatusCode,
    pub detail: String,
    pub debug: bool,
}

impl ApiError {
    pub fn new(status: StatusCode, detail: impl Into<String>, debug: bool) -> Self {
        Self {
            status,
            detail: detail.into(),
            debug,
        }
    }

    pub fn from_discovery(error: DiscoveryError, debug: bool) -> Self {
        let status = match &error {
            DiscoveryError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            DiscoveryError::NotConfigured { .. } => StatusCode::NOT_FOUND,
            DiscoveryError::NoInstancesMatched => StatusCode::BAD_REQUEST,
            DiscoveryError::Template(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DiscoveryError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, error.to_string(), debug)
    }

    pub fn timeout(debug: bool) -> Self {
        Self::new(
            StatusCode::GATEWAY_TIMEOUT,
            "request deadline exceeded",
            debug,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.debug {
            (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
        } else {
            let terse = self
                .status
                .canonical_reason()
                .unwrap_or("error")
                .to_string();
            (self.status, Json(serde_json::json!({ "detail": terse }))).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_the_error_taxonomy() {
        let debug = false;
        assert_eq!(
            ApiError::from_discovery(DiscoveryError::Unauthorized("x".into()), debug).status,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::from_discovery(
                DiscoveryError::NotConfigured {
                    version: "1.0".into(),
                    resource_type: "clusters".into()
                },
                debug
            )
            .status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from_discovery(DiscoveryError::NoInstancesMatched, debug).status,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::timeout(debug).status, StatusCode::GATEWAY_TIMEOUT);
    }
}
