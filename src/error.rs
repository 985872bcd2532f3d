//! Per-line error taxonomy.
//!
//! Every failure while handling one protocol line becomes an [`IngestError`].
//! Protocol, validation, auth and signature failures are answered with their
//! own message; internal failures only ever show a generic reason. None of
//! them close the connection.

use thiserror::Error;

use crate::auth::AuthError;
use crate::protocol::ParseError;

/// Reason shown to clients for failures they cannot act on.
pub const INTERNAL_REASON: &str = "Internal server error";

#[derive(Debug, Error)]
pub enum IngestError {
    /// Framing or JSON decoding failed.
    #[error("{0}")]
    Protocol(String),

    /// The JSON object is missing fields or has malformed ones.
    #[error(transparent)]
    Validation(ParseError),

    /// Credentials absent, or the token is unknown or outside its window.
    #[error(transparent)]
    Auth(AuthError),

    /// The HMAC does not match the canonical payload.
    #[error("{}", AuthError::InvalidSignature)]
    Signature,

    /// A bug surfaced while handling the line.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// Text after `ERROR: ` on the wire.
    pub fn client_reason(&self) -> String {
        match self {
            IngestError::Internal(_) => INTERNAL_REASON.to_string(),
            other => other.to_string(),
        }
    }

    /// Metric label for this failure class.
    pub fn outcome(&self) -> &'static str {
        match self {
            IngestError::Protocol(_) => "protocol_error",
            IngestError::Validation(_) => "validation_error",
            IngestError::Auth(_) => "auth_error",
            IngestError::Signature => "signature_error",
            IngestError::Internal(_) => "internal_error",
        }
    }
}

impl From<ParseError> for IngestError {
    fn from(e: ParseError) -> Self {
        if e.is_protocol() {
            IngestError::Protocol(e.to_string())
        } else {
            IngestError::Validation(e)
        }
    }
}

impl From<AuthError> for IngestError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidSignature => IngestError::Signature,
            other => IngestError::Auth(other),
        }
    }
}
