//! Token and signature verification.

use std::sync::Arc;

use thiserror::Error;

use crate::auth::registry::{token_hint, TokenLookup, TokenStore};
use crate::clock::Clock;
use crate::protocol::{signature_matches, Submission};

/// Authentication failures, in the order they are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuthError {
    /// Token or signature is empty.
    #[error("Missing token or signature")]
    MissingCredentials,

    /// Unknown token, expired, or not yet issued.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// HMAC mismatch over the canonical payload.
    #[error("Invalid signature")]
    InvalidSignature,
}

/// Verifies submissions against a [`TokenStore`].
#[derive(Clone)]
pub struct Authenticator {
    store: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
}

impl Authenticator {
    pub fn new(store: Arc<dyn TokenStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Owner of `token` if it exists and `issued_at <= now <= expires_at`.
    pub fn verify_token(&self, token: &str) -> Option<String> {
        self.check_token(self.store.snapshot().as_ref(), token)
    }

    /// Constant-time check of the hex HMAC-SHA256 of `payload` under the
    /// token's secret.
    pub fn verify_signature(&self, token: &str, payload: &str, signature: &str) -> bool {
        check_signature(self.store.snapshot().as_ref(), token, payload, signature)
    }

    fn check_token(&self, registry: &dyn TokenLookup, token: &str) -> Option<String> {
        let grant = registry.grant(token)?;
        let now = self.clock.now();

        if !grant.is_valid_at(now) {
            tracing::info!(
                token = %token_hint(token),
                user_id = %grant.user_id,
                issued_at = ?grant.issued_at,
                expires_at = %grant.expires_at,
                "Token outside its validity window"
            );
            return None;
        }

        Some(grant.user_id)
    }

    /// Run the ordered checks for one submission and return the owning user.
    ///
    /// 1. token and signature are non-empty
    /// 2. the token is valid now (the secret is never read otherwise)
    /// 3. the signature matches the canonical payload
    ///
    /// Both lookups use the same registry snapshot.
    pub fn authenticate(&self, submission: &Submission) -> Result<String, AuthError> {
        if submission.token.is_empty() || submission.signature.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let registry = self.store.snapshot();
        let user_id = self
            .check_token(registry.as_ref(), &submission.token)
            .ok_or(AuthError::InvalidToken)?;

        if !check_signature(
            registry.as_ref(),
            &submission.token,
            submission.canonical_payload(),
            &submission.signature,
        ) {
            return Err(AuthError::InvalidSignature);
        }

        Ok(user_id)
    }
}

fn check_signature(registry: &dyn TokenLookup, token: &str, payload: &str, signature: &str) -> bool {
    match registry.secret(token) {
        Some(secret) if !secret.is_empty() => signature_matches(&secret, payload, signature),
        _ => {
            tracing::warn!(token = %token_hint(token), "No secret for token");
            false
        }
    }
}
