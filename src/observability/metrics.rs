//! Metrics collection and exposition.
//!
//! # Metrics
//! - `ingest_messages_total` (counter): processed lines by `outcome`
//! - `ingest_line_duration_seconds` (histogram): per-line processing time
//! - `ingest_connections_total` (counter): accepted connections
//! - `ingest_connections_active` (gauge): open connections
//! - `metric_cache_entries` (gauge): cached uris after the last mutation or sweep
//! - `log_writer_entries_total` (counter): log entries by `result` (written, dropped)
//! - `log_writer_queue_depth` (gauge): entries waiting for the consumer
//! - `token_registry_reloads_total` (counter): registry reloads by `result`

use std::net::SocketAddr;
use std::time::Instant;

use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus recorder and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Prometheus exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install Prometheus exporter"),
    }
}

/// Record the outcome of one protocol line.
pub fn record_message(outcome: &'static str, start: Instant) {
    ::metrics::counter!("ingest_messages_total", "outcome" => outcome).increment(1);
    ::metrics::histogram!("ingest_line_duration_seconds").record(start.elapsed().as_secs_f64());
}

pub fn record_connection_opened() {
    ::metrics::counter!("ingest_connections_total").increment(1);
    ::metrics::gauge!("ingest_connections_active").increment(1.0);
}

pub fn record_connection_closed() {
    ::metrics::gauge!("ingest_connections_active").decrement(1.0);
}

pub fn record_cache_size(entries: usize) {
    ::metrics::gauge!("metric_cache_entries").set(entries as f64);
}

pub fn record_log_entry(result: &'static str) {
    ::metrics::counter!("log_writer_entries_total", "result" => result).increment(1);
}

pub fn record_queue_depth(depth: usize) {
    ::metrics::gauge!("log_writer_queue_depth").set(depth as f64);
}

pub fn record_registry_reload(result: &'static str) {
    ::metrics::counter!("token_registry_reloads_total", "result" => result).increment(1);
}
