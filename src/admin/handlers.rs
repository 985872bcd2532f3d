use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntry;
use crate::server::ServerState;

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub uptime_secs: u64,
    pub active_connections: u64,
    pub cached_metrics: usize,
    pub pending_log_entries: usize,
    pub written_log_entries: u64,
    pub dropped_log_entries: u64,
}

#[derive(Debug, Deserialize)]
pub struct MetricQuery {
    pub uri: String,
}

pub async fn get_status(State(state): State<Arc<ServerState>>) -> Json<SystemStatus> {
    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        active_connections: state.tracker.active_count(),
        cached_metrics: state.cache.len(),
        pending_log_entries: state.log.pending(),
        written_log_entries: state.log.written(),
        dropped_log_entries: state.log.dropped(),
    })
}

pub async fn get_snapshot(State(state): State<Arc<ServerState>>) -> Json<BTreeMap<String, CacheEntry>> {
    Json(state.cache.snapshot())
}

pub async fn get_metric(
    State(state): State<Arc<ServerState>>,
    Query(query): Query<MetricQuery>,
) -> Result<Json<CacheEntry>, StatusCode> {
    state.cache.get(&query.uri).map(Json).ok_or(StatusCode::NOT_FOUND)
}
