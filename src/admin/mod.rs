//! Admin/introspection surface.
//!
//! Read-only views over instances, templates, config, and counters, plus
//! crypto helpers and health checks. Everything resource-shaped goes
//! through the discovery engine itself so these views are always faithful
//! to what a proxy would receive.

pub mod crypto;
pub mod handlers;
pub mod mock;

use axum::routing::{get, post};
use axum::Router;

use crate::http::server::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/admin/xds_dump", get(handlers::xds_dump))
        .route("/admin/resources/{resource_type}", get(handlers::fetch_resources))
        .route("/admin/source_dump", get(handlers::source_dump))
        .route("/admin/templates", get(handlers::templates_metadata))
        .route("/admin/config", get(handlers::show_config))
        .route("/admin/stats", get(handlers::show_stats))
        .route("/admin/resource_types", get(handlers::resource_types))
        .route("/healthz", get(handlers::healthz))
        .route("/deepcheck", get(handlers::deepcheck))
        .route("/version", get(handlers::version))
        .route("/crypto/encrypt", post(crypto::encrypt))
        .route("/crypto/decrypt", post(crypto::decrypt))
        .route("/crypto/decryptable", post(crypto::decryptable))
        .route("/crypto/generate_key", get(crypto::generate_key))
}
