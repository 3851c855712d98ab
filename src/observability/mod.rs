//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (Prometheus exposition)
//!     → stats.rs (named counters, served at /admin/stats)
//!
//! Consumers:
//!     → Log aggregation (stdout, file, remote)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Operators reading counter snapshots
//! ```
//!
//! # Design Decisions
//! - Structured logging (JSON) for machine parsing
//! - Counters are cheap (atomic increments) and double-written to the
//!   metrics facade so both surfaces agree

pub mod logging;
pub mod metrics;
pub mod stats;
