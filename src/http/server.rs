//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with the discovery and admin surfaces
//! - Wire up middleware (tracing, request ID)
//! - Serve with graceful shutdown
//!
//! # Design Decisions
//! - One listener serves both proxies and operators; the admin surface is
//!   read-only and secrets are masked before they reach it
//! - Request deadlines are enforced per handler so timeouts map to 504

use std::sync::Arc;

use axum::routing::post;
use axum::{middleware, Router};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::trace::TraceLayer;

use crate::admin;
use crate::config::AppConfig;
use crate::discovery::DiscoveryEngine;
use crate::http::discovery::discovery_handler;
use crate::http::request::request_id_middleware;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<DiscoveryEngine>,
    pub config: Arc<AppConfig>,
}

/// HTTP server for the control plane.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    pub fn new(state: AppState) -> Self {
        Self {
            router: Self::build_router(state),
        }
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        let mut router = Router::new().route(
            "/{api_generation}/discovery/{resource_type}",
            post(discovery_handler),
        );
        if state.config.admin.enabled {
            router = router.merge(admin::router());
        }
        let access_logs = state.config.logging.access.enabled;
        let router = router
            .with_state(state)
            .layer(middleware::from_fn(request_id_middleware));
        if access_logs {
            router.layer(TraceLayer::new_for_http())
        } else {
            router
        }
    }

    /// Run the server, accepting connections on the given listener.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }

    /// The router, for driving the server in tests without a listener.
    pub fn into_router(self) -> Router {
        self.router
    }
}
