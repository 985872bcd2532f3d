//! Latest-value metric cache with TTL expiry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Number;

use crate::clock::Clock;
use crate::observability::metrics;

/// Default time-to-live for cached metrics.
pub const DEFAULT_TTL_SECS: u64 = 300;

/// Latest known value for one uri.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub value: Number,
    /// Event time reported by the agent.
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Slot {
    entry: CacheEntry,
    /// Server time of the last update; expiry is measured from here.
    arrived_at: DateTime<Utc>,
}

/// Thread-safe uri → latest value map.
///
/// One mutex covers every read and write, so a snapshot is a consistent
/// point-in-time view and never sees a half-written entry.
pub struct MetricCache {
    entries: Mutex<HashMap<String, Slot>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MetricCache {
    /// Create an empty cache whose entries live for `ttl_secs` after arrival.
    pub fn new(ttl_secs: u64, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: Duration::seconds(ttl_secs.min(i64::MAX as u64) as i64),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        // A panic while holding the lock cannot leave a slot half-written:
        // every mutation is a single insert or retain.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn is_expired(&self, slot: &Slot, now: DateTime<Utc>) -> bool {
        now - slot.arrived_at > self.ttl
    }

    /// Upsert the value for `uri`. Last arrival wins regardless of `ts`.
    pub fn update(&self, uri: &str, value: Number, ts: DateTime<Utc>) {
        let arrived_at = self.clock.now();
        let mut entries = self.lock();
        entries.insert(
            uri.to_string(),
            Slot {
                entry: CacheEntry { value, timestamp: ts },
                arrived_at,
            },
        );
        metrics::record_cache_size(entries.len());
    }

    /// Purge expired entries, then copy what remains, ordered by uri.
    pub fn snapshot(&self) -> BTreeMap<String, CacheEntry> {
        let now = self.clock.now();
        let mut entries = self.lock();

        let before = entries.len();
        entries.retain(|_, slot| !self.is_expired(slot, now));
        if entries.len() != before {
            tracing::debug!(purged = before - entries.len(), "Expired cache entries purged");
        }
        metrics::record_cache_size(entries.len());

        entries
            .iter()
            .map(|(uri, slot)| (uri.clone(), slot.entry.clone()))
            .collect()
    }

    /// The entry for `uri` if it has not expired.
    pub fn get(&self, uri: &str) -> Option<CacheEntry> {
        let now = self.clock.now();
        self.lock()
            .get(uri)
            .filter(|slot| !self.is_expired(slot, now))
            .map(|slot| slot.entry.clone())
    }

    /// Number of stored entries, expired or not.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn cache(ttl: u64) -> (MetricCache, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        (MetricCache::new(ttl, clock.clone()), clock)
    }

    fn num(v: f64) -> Number {
        Number::from_f64(v).unwrap()
    }

    #[test]
    fn update_then_get() {
        let (cache, _) = cache(DEFAULT_TTL_SECS);
        assert!(cache.get("/agent/alice/cpu").is_none());

        cache.update("/agent/alice/cpu", num(42.5), start());
        let entry = cache.get("/agent/alice/cpu").unwrap();
        assert_eq!(entry.value, num(42.5));
        assert_eq!(entry.timestamp, start());
    }

    #[test]
    fn last_arrival_wins_even_with_older_timestamp() {
        let (cache, _) = cache(DEFAULT_TTL_SECS);
        cache.update("/u", num(1.0), start());
        cache.update("/u", num(2.0), start() - Duration::hours(1));

        let entry = cache.get("/u").unwrap();
        assert_eq!(entry.value, num(2.0));
        assert_eq!(entry.timestamp, start() - Duration::hours(1));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn ttl_boundary() {
        let ttl = 300;
        let (cache, clock) = cache(ttl);
        cache.update("/u", num(1.0), start());

        clock.set(start() + Duration::seconds(ttl as i64 - 1));
        assert!(cache.get("/u").is_some());
        assert!(cache.snapshot().contains_key("/u"));

        clock.set(start() + Duration::seconds(ttl as i64 + 1));
        assert!(cache.get("/u").is_none());
        assert!(!cache.snapshot().contains_key("/u"));
    }

    #[test]
    fn get_does_not_purge_but_snapshot_does() {
        let (cache, clock) = cache(10);
        cache.update("/old", num(1.0), start());
        clock.advance(Duration::seconds(8));
        cache.update("/fresh", num(2.0), start());
        clock.advance(Duration::seconds(5));

        assert!(cache.get("/old").is_none());
        assert_eq!(cache.len(), 2);

        let snapshot = cache.snapshot();
        assert_eq!(snapshot.keys().collect::<Vec<_>>(), vec!["/fresh"]);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn update_refreshes_expiry() {
        let (cache, clock) = cache(10);
        cache.update("/u", num(1.0), start());
        clock.advance(Duration::seconds(9));
        cache.update("/u", num(2.0), start());
        clock.advance(Duration::seconds(9));
        assert_eq!(cache.get("/u").unwrap().value, num(2.0));
    }

    #[test]
    fn snapshot_is_sorted_and_serializable() {
        let (cache, _) = cache(DEFAULT_TTL_SECS);
        cache.update("/b", Number::from(7), start());
        cache.update("/a", num(0.5), start());

        let json = serde_json::to_string(&cache.snapshot()).unwrap();
        assert_eq!(
            json,
            r#"{"/a":{"value":0.5,"timestamp":"2025-01-01T00:00:00Z"},"/b":{"value":7,"timestamp":"2025-01-01T00:00:00Z"}}"#
        );
    }

    #[test]
    fn concurrent_updates_keep_one_entry_per_uri() {
        let (cache, _) = cache(DEFAULT_TTL_SECS);
        let cache = Arc::new(cache);

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        cache.update(&format!("/u{}", i % 10), Number::from(t * 1000 + i), start());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(cache.snapshot().len(), 10);
    }
}
