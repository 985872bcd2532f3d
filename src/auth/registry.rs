//! Token registry: bearer tokens mapped to their owner and signing secret.
//!
//! The registry file is a JSON object keyed by token:
//!
//! ```json
//! {
//!   "T1": {
//!     "user_id": "alice",
//!     "secret": "s3cret",
//!     "issued_at": "2025-01-01T00:00:00Z",
//!     "expires_at": "2026-01-01T00:00:00Z"
//!   }
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::timestamp::serde_iso;

/// Errors raised while loading a registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read token registry {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("token registry is not a JSON object of records: {0}")]
    Parse(#[from] serde_json::Error),
}

/// One registry record.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TokenRecord {
    pub user_id: String,
    pub secret: String,
    /// Tokens are not valid before issuance; absent means no lower bound.
    #[serde(default, with = "serde_iso::option", skip_serializing_if = "Option::is_none")]
    pub issued_at: Option<DateTime<Utc>>,
    #[serde(with = "serde_iso")]
    pub expires_at: DateTime<Utc>,
}

impl TokenRecord {
    /// The secret-free part of the record.
    pub fn grant(&self) -> TokenGrant {
        TokenGrant {
            user_id: self.user_id.clone(),
            issued_at: self.issued_at,
            expires_at: self.expires_at,
        }
    }
}

impl fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRecord")
            .field("user_id", &self.user_id)
            .field("secret", &"[REDACTED]")
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Validity window and owner of a token, without its secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenGrant {
    pub user_id: String,
    pub issued_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl TokenGrant {
    /// `issued_at <= now <= expires_at`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if now > self.expires_at {
            return false;
        }
        self.issued_at.map_or(true, |issued| now >= issued)
    }
}

/// Read-only lookup of token records.
///
/// Validity and secrets are separate lookups so callers can refuse to touch
/// the secret of a token that failed validation.
pub trait TokenLookup: Send + Sync {
    /// Owner and validity window for `token`.
    fn grant(&self, token: &str) -> Option<TokenGrant>;

    /// HMAC secret for `token`.
    fn secret(&self, token: &str) -> Option<String>;
}

/// Source of registry snapshots.
///
/// Every lookup made for one submission goes through a single snapshot, so a
/// reload can never pair one registry's grant with another's secret.
pub trait TokenStore: Send + Sync {
    fn snapshot(&self) -> Arc<dyn TokenLookup>;
}

/// An immutable set of token records. Clones share the records.
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    records: Arc<HashMap<String, TokenRecord>>,
}

impl TokenRegistry {
    /// Build a registry from already-validated records.
    pub fn from_records(records: impl IntoIterator<Item = (String, TokenRecord)>) -> Self {
        Self {
            records: Arc::new(records.into_iter().collect()),
        }
    }

    /// Parse registry JSON. Malformed records are skipped with a warning so
    /// one bad entry does not lock every agent out.
    pub fn from_json_str(content: &str) -> Result<Self, RegistryError> {
        let raw: HashMap<String, serde_json::Value> = serde_json::from_str(content)?;
        let mut records = HashMap::with_capacity(raw.len());

        for (token, value) in raw {
            match serde_json::from_value::<TokenRecord>(value) {
                Ok(record) => {
                    records.insert(token, record);
                }
                Err(e) => {
                    tracing::warn!(token = %token_hint(&token), error = %e, "Skipping invalid token record");
                }
            }
        }

        Ok(Self {
            records: Arc::new(records),
        })
    }

    /// Read and parse a registry file.
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let content = std::fs::read_to_string(path).map_err(|source| RegistryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl TokenLookup for TokenRegistry {
    fn grant(&self, token: &str) -> Option<TokenGrant> {
        self.records.get(token).map(TokenRecord::grant)
    }

    fn secret(&self, token: &str) -> Option<String> {
        self.records.get(token).map(|r| r.secret.clone())
    }
}

/// File-backed registry that can be swapped atomically on reload.
pub struct FileTokenStore {
    path: PathBuf,
    current: ArcSwap<TokenRegistry>,
}

impl FileTokenStore {
    /// Load the registry at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, RegistryError> {
        let path = path.into();
        let registry = TokenRegistry::load(&path)?;
        tracing::info!(path = %path.display(), tokens = registry.len(), "Token registry loaded");
        Ok(Self {
            path,
            current: ArcSwap::from_pointee(registry),
        })
    }

    /// Re-read the file. On failure the current registry stays in place.
    pub fn reload(&self) -> Result<usize, RegistryError> {
        let registry = TokenRegistry::load(&self.path)?;
        let count = registry.len();
        self.current.store(Arc::new(registry));
        Ok(count)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.current.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TokenStore for TokenRegistry {
    fn snapshot(&self) -> Arc<dyn TokenLookup> {
        Arc::new(self.clone())
    }
}

impl TokenStore for FileTokenStore {
    fn snapshot(&self) -> Arc<dyn TokenLookup> {
        self.current.load_full()
    }
}

/// Short prefix of a token, safe to put in logs.
pub fn token_hint(token: &str) -> String {
    let prefix: String = token.chars().take(6).collect();
    format!("{prefix}...")
}
