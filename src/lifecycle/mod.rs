//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Initial source poll → Start background
//!     tasks → Bind listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Broadcast to tasks → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered startup: the instance store must hold a good generation
//!   before the listener accepts traffic
//! - Background tasks subscribe to one broadcast channel and exit cleanly

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
