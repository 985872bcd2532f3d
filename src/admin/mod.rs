//! Read-only admin API for dashboards.
//!
//! # Routes
//! ```text
//! GET /admin/status          → server status counters
//! GET /admin/snapshot        → uri → {value, timestamp} for live metrics
//! GET /admin/metric?uri=...  → one entry, 404 when absent or expired
//! ```
//!
//! Every route requires `Authorization: Bearer <admin.api_key>`.

pub mod auth;
pub mod handlers;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower_http::trace::TraceLayer;

use self::auth::{admin_auth_middleware, AdminKey};
use self::handlers::*;
use crate::server::ServerState;

pub fn setup_admin_router(state: Arc<ServerState>, api_key: &str) -> Router {
    Router::new()
        .route("/admin/status", get(get_status))
        .route("/admin/snapshot", get(get_snapshot))
        .route("/admin/metric", get(get_metric))
        .layer(middleware::from_fn_with_state(
            AdminKey(Arc::from(api_key)),
            admin_auth_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
