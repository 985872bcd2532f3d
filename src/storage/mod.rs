//! Durable append-only metric log.
//!
//! # Data Flow
//! ```text
//! connection handler (accepted submission)
//!     → LogWriter::append (bounded queue, never waits for disk)
//!     → consumer task (single writer)
//!     → {directory}/metrics-YYYYMMDD.jsonl
//! ```
//!
//! # Design Decisions
//! - At-most-once: a failed write is logged and the entry dropped, never retried
//! - Only the consumer touches the file, so lines never interleave
//! - Shutdown waits for the queue to drain, bounded by a timeout

pub mod log_writer;

pub use log_writer::{log_file_name, DrainReport, LogEntry, LogWriter, LogWriterError, LogWriterHandle};
