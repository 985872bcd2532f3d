//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ServerConfig / AgentConfig (validated, immutable)
//!     → handed to the server or agent at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; only the token registry hot-reloads
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_agent_config, load_config, ConfigError};
pub use schema::{
    AdminConfig, AgentConfig, AuthConfig, CacheConfig, ConnectionConfig, ListenerConfig,
    LogFormat, LogWriterConfig, ObservabilityConfig, ServerConfig, ShutdownConfig, TlsConfig,
};
pub use validation::{validate_agent_config, validate_config, ValidationError};
