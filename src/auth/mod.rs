//! Agent authentication subsystem.
//!
//! # Data Flow
//! ```text
//! token_registry.json
//!     → registry.rs (parse records, skip malformed ones)
//!     → FileTokenStore (ArcSwap snapshot, swapped by watcher.rs on change)
//!     → verifier.rs (ordered checks per submission)
//!         1. token + signature present
//!         2. token known and inside [issued_at, expires_at]
//!         3. HMAC-SHA256 over the canonical payload, constant-time compare
//! ```
//!
//! # Design Decisions
//! - The secret of a token is read only after the token passed validation
//! - Registry reads never block: handlers load the current snapshot
//! - A failed reload keeps the previous registry

pub mod registry;
pub mod verifier;
pub mod watcher;

pub use registry::{FileTokenStore, RegistryError, TokenGrant, TokenRecord, TokenLookup, TokenRegistry, TokenStore};
pub use verifier::{AuthError, Authenticator};
pub use watcher::RegistryWatcher;
