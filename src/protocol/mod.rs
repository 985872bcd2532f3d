//! Line protocol codec.
//!
//! # Data Flow
//! ```text
//! raw line (UTF-8, no trailing newline)
//!     → message.rs   (JSON object, required fields, types, timestamp)
//!     → canonical.rs (signature-free payload, sorted keys, no whitespace)
//!     → Submission   (typed fields + canonical payload)
//!     → auth layer verifies signing.rs HMAC over the canonical payload
//! ```
//!
//! # Design Decisions
//! - The canonical payload is computed once at parse time and carried with
//!   the submission, so verification never re-serializes
//! - Agents and server share one canonicalizer and one signer

pub mod canonical;
pub mod message;
pub mod signing;
pub mod timestamp;

pub use canonical::{canonical_payload, SIGNATURE_FIELD};
pub use message::{encode_signed, parse, MetricMessage, ParseError, Submission};
pub use signing::{sign, signature_matches};
pub use timestamp::parse_timestamp;

/// The single line written back for every processed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Response {
    Ack,
    Error(String),
}

impl Response {
    /// Wire form, newline included.
    pub fn to_line(&self) -> String {
        match self {
            Response::Ack => "ACK\n".to_string(),
            Response::Error(reason) => format!("ERROR: {reason}\n"),
        }
    }

    /// Decode a response line as read by an agent.
    pub fn from_line(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        if line == "ACK" {
            Response::Ack
        } else {
            let reason = line.strip_prefix("ERROR: ").unwrap_or(line);
            Response::Error(reason.to_string())
        }
    }

    pub fn is_ack(&self) -> bool {
        matches!(self, Response::Ack)
    }
}
