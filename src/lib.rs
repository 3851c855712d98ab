//! Regency: a poll-based xDS control plane.
//!
//! Turns heterogeneous, continuously-changing upstream data into validated,
//! per-proxy configuration documents with strict cache/version semantics.

// Core pipeline
pub mod config;
pub mod context;
pub mod crypto;
pub mod discovery;
pub mod matching;
pub mod modifiers;
pub mod sources;
pub mod templates;

// Serving
pub mod admin;
pub mod cache;
pub mod http;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::AppConfig;
pub use discovery::DiscoveryEngine;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
