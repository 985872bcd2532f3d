//! Metric ingestion server.
//!
//! # Data Flow
//! ```text
//! Listener (semaphore-bounded accept)
//!     → connection task (TLS handshake with timeout)
//!     → ConnectionHandler (one line at a time)
//!         → protocol::parse → Authenticator → MetricCache → LogWriter
//!     → "ACK" / "ERROR: <reason>" on the same connection
//! ```
//!
//! # Shutdown Order
//! 1. stop accepting
//! 2. handlers finish their current line within the grace period, then are aborted
//! 3. the log queue drains (bounded)
//! 4. the log consumer is cancelled and awaited
//! 5. the listening socket is closed
//!
//! # Design Decisions
//! - Subsystems are built in `IngestServer::start` and passed by handle
//! - A failed line never closes the connection; only I/O errors and
//!   oversized lines do

pub mod handler;
pub mod runner;
pub mod state;

pub use handler::{ConnectionError, ConnectionHandler};
pub use runner::{IngestServer, RunningServer, ServerError};
pub use state::{ConnectionLimits, ServerState};
