//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware, shutdown wiring)
//!     → request.rs (request ID)
//!     → discovery.rs (deadline, engine call, response headers)
//!     → error.rs (typed error → status mapping)
//! ```

pub mod discovery;
pub mod error;
pub mod request;
pub mod server;

pub use server::{AppState, HttpServer};
