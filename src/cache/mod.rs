//! In-memory metric cache.
//!
//! # Data Flow
//! ```text
//! accepted submission
//!     → MetricCache::update (upsert, arrival time recorded)
//!
//! dashboard / admin API
//!     → MetricCache::snapshot (purge expired, copy)
//!     → MetricCache::get (single uri, expired entries hidden)
//! ```
//!
//! # Design Decisions
//! - Recency is by arrival, not by the agent's event timestamp
//! - Expired entries are removed only by a snapshot sweep

pub mod metric_cache;

pub use metric_cache::{CacheEntry, MetricCache, DEFAULT_TTL_SECS};
