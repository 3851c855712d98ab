//! Regency control plane binary.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────────┐
//!                    │                  CONTROL PLANE                    │
//!                    │                                                   │
//!  Discovery poll    │  ┌─────────┐   ┌───────────┐   ┌─────────────┐   │
//!  ──────────────────┼─▶│  http   │──▶│ discovery │──▶│  templates  │   │
//!                    │  │ server  │   │  engine   │   │  + context  │   │
//!                    │  └─────────┘   └─────┬─────┘   └─────────────┘   │
//!                    │                      │                           │
//!                    │              ┌───────▼────────┐                  │
//!  Discovery reply   │              │ discovery cache│                  │
//!  ◀─────────────────┼──────────────│ (local+remote) │                  │
//!                    │              └────────────────┘                  │
//!                    │                                                   │
//!                    │  ┌────────────────────────────────────────────┐  │
//!                    │  │            Background tasks                 │  │
//!                    │  │  ┌──────────────┐   ┌────────────────────┐ │  │
//!                    │  │  │ source poller│   │ context refresher  │ │  │
//!                    │  │  └──────────────┘   └────────────────────┘ │  │
//!                    │  └────────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────────┘
//! ```
//!
//! Startup order matters: the instance store must hold a good generation
//! before the listener accepts traffic.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use regency::cache::DiscoveryCache;
use regency::config::{self, AppConfig};
use regency::context::TemplateContext;
use regency::discovery::DiscoveryEngine;
use regency::http::server::{AppState, HttpServer};
use regency::lifecycle::{signals, Shutdown};
use regency::observability::{logging, metrics};
use regency::sources::poller::SourcePoller;
use regency::templates::TemplateRegistry;

#[derive(Parser)]
#[command(name = "regency", version, about = "Poll-based xDS control plane")]
struct Args {
    /// Comma-separated config location specs (file paths or proto://path).
    #[arg(long, env = "REGENCY_CONFIG")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config: AppConfig = config::load_config(&args.config).await?;
    logging::init_logging(&config.logging);

    tracing::info!(
        sources = config.sources.len(),
        refresh_rate_secs = config.source_config.refresh_rate,
        matching_enabled = config.matching.enabled,
        auth_enabled = config.authentication.enabled,
        "configuration loaded"
    );

    if config.metrics.enabled {
        match config.metrics.bind_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.metrics.bind_address,
                error = %e,
                "failed to parse metrics address"
            ),
        }
    }

    let cipher = Arc::new(config.authentication.cipher_chain()?);
    if config.authentication.enabled && !cipher.key_available() {
        return Err("authentication is enabled but no usable encryption key was configured".into());
    }

    // The first poll must succeed before we serve anything.
    let poller = Arc::new(SourcePoller::new(&config)?);
    poller.initial_load().await?;

    let context = Arc::new(TemplateContext::from_config(&config.template_context).await?);
    let templates = TemplateRegistry::from_config(&config.templates).await?;
    let cache = DiscoveryCache::from_config(&config.discovery_cache).await;

    let config = Arc::new(config);
    let engine = Arc::new(DiscoveryEngine::new(
        &config,
        poller.clone(),
        context.clone(),
        templates,
        cache,
        cipher,
    ));

    let shutdown = Shutdown::new();
    tokio::spawn(poller.run(shutdown.subscribe()));
    if config.template_context.refresh {
        tokio::spawn(context.run(shutdown.subscribe()));
    }

    let listener = TcpListener::bind(&config.server.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "listening for discovery requests");

    let server = HttpServer::new(AppState {
        engine,
        config: config.clone(),
    });

    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_signal().await;
        shutdown.trigger();
    });

    server.run(listener, server_shutdown).await?;
    tracing::info!("shutdown complete");
    Ok(())
}
