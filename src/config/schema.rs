//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server
//! and the agent. All types derive Serde traits for deserialization from
//! TOML files, and every section has defaults so minimal files work.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration for the ingestion server.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address, TLS).
    pub listener: ListenerConfig,

    /// Token registry settings.
    pub auth: AuthConfig,

    /// Metric cache settings.
    pub cache: CacheConfig,

    /// Durable log writer settings.
    pub log_writer: LogWriterConfig,

    /// Per-connection limits and timeouts.
    pub connection: ConnectionConfig,

    /// Shutdown orchestration.
    pub shutdown: ShutdownConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Admin API for dashboards.
    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8888").
    pub bind_address: String,

    /// TLS certificate and key. Required unless `allow_plaintext` is set.
    pub tls: Option<TlsConfig>,

    /// Accept unencrypted connections when no TLS is configured.
    /// Intended for local development and tests.
    pub allow_plaintext: bool,

    /// Maximum concurrent connections (backpressure).
    pub max_connections: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8888".to_string(),
            tls: None,
            allow_plaintext: false,
            max_connections: 1024,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: PathBuf,

    /// Path to private key file (PEM).
    pub key_path: PathBuf,
}

/// Token registry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// JSON file mapping tokens to `{user_id, secret, issued_at, expires_at}`.
    pub registry_path: PathBuf,

    /// Reload the registry when the file changes.
    pub watch: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            registry_path: PathBuf::from("token_registry.json"),
            watch: true,
        }
    }
}

/// Metric cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Seconds an entry stays visible after its last update.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: crate::cache::DEFAULT_TTL_SECS,
        }
    }
}

/// Durable log writer configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LogWriterConfig {
    /// Directory holding `metrics-YYYYMMDD.jsonl` files.
    pub directory: PathBuf,

    /// Bounded queue capacity between handlers and the writer task.
    pub queue_capacity: usize,

    /// Maximum time to wait for the queue to drain on shutdown.
    pub drain_timeout_secs: u64,
}

impl Default for LogWriterConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("logs"),
            queue_capacity: 10_000,
            drain_timeout_secs: 5,
        }
    }
}

/// Per-connection limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Longest accepted line, newline excluded.
    pub max_line_bytes: usize,

    /// Close a connection after this long without a complete line.
    pub idle_timeout_secs: u64,

    /// Abort TLS handshakes that take longer than this.
    pub handshake_timeout_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            max_line_bytes: 64 * 1024,
            idle_timeout_secs: 300,
            handshake_timeout_secs: 10,
        }
    }
}

/// Shutdown orchestration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShutdownConfig {
    /// Time connections get to finish their current line.
    pub grace_period_secs: u64,
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            grace_period_secs: 5,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter directive.
    pub log_level: String,

    /// Human-readable or JSON log lines.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Enable the admin API.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,

    /// Admin API bind address.
    pub bind_address: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: String::new(),
            bind_address: "127.0.0.1:8081".to_string(),
        }
    }
}

/// Root configuration for an agent.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Server address (e.g., "metrics.example.com:8888").
    pub server_address: String,

    /// Name checked against the server certificate. Defaults to the host
    /// part of `server_address`.
    pub server_name: Option<String>,

    /// CA or self-signed server certificate (PEM) to trust.
    pub ca_cert_path: Option<PathBuf>,

    /// Connect without TLS.
    pub allow_plaintext: bool,

    /// Agent identity; used in metric uris.
    pub user_id: String,

    /// Bearer token from the server's registry.
    pub token: String,

    /// HMAC secret paired with `token`.
    pub secret: String,

    /// Seconds between collection rounds.
    pub interval_secs: u64,

    /// Log level for the agent process.
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_address: "localhost:8888".to_string(),
            server_name: None,
            ca_cert_path: None,
            allow_plaintext: false,
            user_id: String::new(),
            token: String::new(),
            secret: String::new(),
            interval_secs: 10,
            log_level: "info".to_string(),
        }
    }
}
