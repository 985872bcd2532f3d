//! Telemetry ingestion server.
//!
//! Agents push signed metric readings over a TLS line protocol; the server
//! authenticates each line, keeps the latest value per uri in a TTL cache
//! and appends accepted readings to daily JSONL files.
//!
//! # Architecture Overview
//!
//! ```text
//!     Agent (collectors → signed lines)
//!     ─────────────────────────────────┐
//!                                      ▼
//!  ┌────────────────────────────────────────────────────────────┐
//!  │  net::Listener ──▶ TLS handshake ──▶ server::ConnectionHandler │
//!  │                                        │                   │
//!  │             protocol::parse ◀──────────┘                   │
//!  │                    │                                       │
//!  │             auth::Authenticator (token window, HMAC)       │
//!  │                    │                                       │
//!  │        ┌───────────┴────────────┐                          │
//!  │        ▼                        ▼                          │
//!  │  cache::MetricCache      storage::LogWriter ──▶ metrics-YYYYMMDD.jsonl
//!  │        │                                                   │
//!  │        ▼                                                   │
//!  │  admin API (snapshot, get, status)                         │
//!  │                                                            │
//!  │  Cross-cutting: config, observability, lifecycle           │
//!  └────────────────────────────────────────────────────────────┘
//! ```

// Wire format and trust
pub mod auth;
pub mod protocol;

// State
pub mod cache;
pub mod storage;

// Serving
pub mod admin;
pub mod net;
pub mod server;

// Pushing
pub mod agent;

// Cross-cutting concerns
pub mod clock;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod observability;

pub use config::{AgentConfig, ServerConfig};
pub use error::IngestError;
pub use lifecycle::Shutdown;
pub use server::{IngestServer, RunningServer, ServerError};
