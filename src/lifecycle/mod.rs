//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → broadcast to accept loop and connection handlers
//! ```
//!
//! # Design Decisions
//! - The signal source is separate from the coordinator so tests can trigger directly
//! - Ordered shutdown lives with the server that owns the subsystems

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};
