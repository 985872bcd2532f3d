//! Metric agent: collect locally, sign, push to the server.
//!
//! # Data Flow
//! ```text
//! every interval_secs:
//!     CollectorRegistry::collect_all → (name, value) samples
//!     → MetricMessage (uri = /agent/{user_id}/{name}, one ts per round)
//!     → signed line over AgentClient (TLS or plaintext)
//!     → one ACK / ERROR per line
//! ```
//!
//! # Design Decisions
//! - One connection per round; a failed round is logged and retried next interval
//! - A rejected metric does not abort the rest of the round

pub mod client;
pub mod collector;

use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::config::AgentConfig;
use crate::lifecycle::Shutdown;
use crate::protocol::{MetricMessage, Response};

pub use client::{AgentClient, AgentError};
pub use collector::{metric_uri, Collector, CollectorRegistry, Sample};

/// Outcome counts for one push round.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PushReport {
    pub accepted: usize,
    pub rejected: usize,
    pub skipped: usize,
}

pub struct Agent {
    config: AgentConfig,
    collectors: CollectorRegistry,
    clock: Arc<dyn Clock>,
}

impl Agent {
    pub fn new(config: AgentConfig, collectors: CollectorRegistry) -> Self {
        Self {
            config,
            collectors,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Signed messages for the current samples. Non-finite values are dropped.
    pub fn messages(&self, samples: &[Sample]) -> (Vec<MetricMessage>, usize) {
        let ts = self.clock.now();
        let mut skipped = 0;
        let messages = samples
            .iter()
            .filter_map(|(name, value)| {
                let message = MetricMessage::new(
                    metric_uri(&self.config.user_id, name),
                    ts,
                    *value,
                    self.config.token.clone(),
                );
                if message.is_none() {
                    tracing::warn!(metric = %name, value, "Skipping non-finite value");
                    skipped += 1;
                }
                message
            })
            .collect();
        (messages, skipped)
    }

    /// Collect once and push every sample over a fresh connection.
    pub async fn push_once(&self) -> Result<PushReport, AgentError> {
        let samples = self.collectors.collect_all();
        let (messages, skipped) = self.messages(&samples);
        let mut report = PushReport {
            skipped,
            ..PushReport::default()
        };
        if messages.is_empty() {
            return Ok(report);
        }

        let mut client = AgentClient::connect(&self.config).await?;
        for message in &messages {
            match client.send_metric(message, &self.config.secret).await? {
                Response::Ack => report.accepted += 1,
                Response::Error(reason) => {
                    report.rejected += 1;
                    tracing::warn!(uri = %message.uri, reason = %reason, "Metric rejected");
                }
            }
        }
        client.close().await;

        tracing::info!(
            accepted = report.accepted,
            rejected = report.rejected,
            skipped = report.skipped,
            "Metrics pushed"
        );
        Ok(report)
    }

    /// Push every `interval_secs` until shutdown.
    pub async fn run(&self, shutdown: Shutdown) {
        let mut shutdown_rx = shutdown.subscribe();
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while !shutdown.is_triggered() {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                _ = interval.tick() => {
                    if let Err(e) = self.push_once().await {
                        tracing::error!(error = %e, "Push failed, retrying next interval");
                    }
                }
            }
        }
        tracing::info!("Agent stopped");
    }
}
