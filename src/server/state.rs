//! Shared server state.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::auth::Authenticator;
use crate::cache::MetricCache;
use crate::config::ConnectionConfig;
use crate::net::ConnectionTracker;
use crate::storage::LogWriter;

/// Everything a connection handler or admin request needs, built once at
/// startup and shared by handle.
pub struct ServerState {
    pub auth: Authenticator,
    pub cache: Arc<MetricCache>,
    pub log: LogWriter,
    pub tracker: ConnectionTracker,
    pub limits: ConnectionLimits,
    pub started_at: Instant,
}

impl ServerState {
    pub fn new(
        auth: Authenticator,
        cache: Arc<MetricCache>,
        log: LogWriter,
        limits: ConnectionLimits,
    ) -> Self {
        Self {
            auth,
            cache,
            log,
            tracker: ConnectionTracker::new(),
            limits,
            started_at: Instant::now(),
        }
    }
}

/// Per-connection limits, resolved from [`ConnectionConfig`].
#[derive(Debug, Clone, Copy)]
pub struct ConnectionLimits {
    pub max_line_bytes: usize,
    pub idle_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl From<&ConnectionConfig> for ConnectionLimits {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            max_line_bytes: config.max_line_bytes,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            handshake_timeout: Duration::from_secs(config.handshake_timeout_secs),
        }
    }
}

impl Default for ConnectionLimits {
    fn default() -> Self {
        Self::from(&ConnectionConfig::default())
    }
}
