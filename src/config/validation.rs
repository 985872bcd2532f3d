//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, capacities > 0)
//! - Check addresses parse and TLS material is configured
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServerConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;
use std::net::SocketAddr;

use crate::config::schema::{AgentConfig, ServerConfig};

/// A single semantic problem, tagged with the offending field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn check_addr(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            field,
            format!("'{}' is not a socket address", value),
        ));
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::new(field, "must be greater than 0"));
    }
}

/// Check a server configuration.
pub fn validate_config(config: &ServerConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_addr(&mut errors, "listener.bind_address", &config.listener.bind_address);
    if config.listener.tls.is_none() && !config.listener.allow_plaintext {
        errors.push(ValidationError::new(
            "listener.tls",
            "TLS is required unless listener.allow_plaintext is set",
        ));
    }
    check_positive(&mut errors, "listener.max_connections", config.listener.max_connections as u64);

    if config.auth.registry_path.as_os_str().is_empty() {
        errors.push(ValidationError::new("auth.registry_path", "must not be empty"));
    }

    check_positive(&mut errors, "cache.ttl_secs", config.cache.ttl_secs);

    if config.log_writer.directory.as_os_str().is_empty() {
        errors.push(ValidationError::new("log_writer.directory", "must not be empty"));
    }
    check_positive(&mut errors, "log_writer.queue_capacity", config.log_writer.queue_capacity as u64);

    check_positive(&mut errors, "connection.max_line_bytes", config.connection.max_line_bytes as u64);
    check_positive(&mut errors, "connection.idle_timeout_secs", config.connection.idle_timeout_secs);
    check_positive(
        &mut errors,
        "connection.handshake_timeout_secs",
        config.connection.handshake_timeout_secs,
    );

    if config.observability.metrics_enabled {
        check_addr(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    if config.admin.enabled {
        check_addr(&mut errors, "admin.bind_address", &config.admin.bind_address);
        if config.admin.api_key.is_empty() {
            errors.push(ValidationError::new(
                "admin.api_key",
                "must be set when the admin API is enabled",
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Check an agent configuration.
pub fn validate_agent_config(config: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.server_address.rsplit_once(':').is_none() {
        errors.push(ValidationError::new("server_address", "expected host:port"));
    }
    for (field, value) in [
        ("user_id", &config.user_id),
        ("token", &config.token),
        ("secret", &config.secret),
    ] {
        if value.is_empty() {
            errors.push(ValidationError::new(field, "must not be empty"));
        }
    }
    check_positive(&mut errors, "interval_secs", config.interval_secs);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
