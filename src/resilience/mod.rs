//! Resilience subsystem.
//!
//! # Design Decisions
//! - Background refreshers retry with jittered exponential backoff
//! - Request deadlines are enforced by the HTTP layer; nothing here blocks
//!   a request path

pub mod backoff;
