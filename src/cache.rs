//! Time-bounded cache shared by the market data gateway.
//!
//! One freshness window applies uniformly to every entry regardless of
//! logical type. There is no eviction beyond overwrite — the key space is
//! bounded by the scan universe × expirations × contract sides, so
//! unbounded growth is not a concern.
//!
//! Two callers that miss on the same key concurrently will both refetch
//! and both `put`; last writer wins. That duplicate work is accepted —
//! `put` has overwrite semantics, so it never produces a wrong value.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A cached value stamped with its fetch time.
struct CacheEntry<V> {
    value: V,
    fetched_at: Instant,
}

/// Key→value store where reads only return entries younger than the
/// freshness window.
pub struct TimedCache<K, V> {
    ttl: Duration,
    entries: Mutex<HashMap<K, CacheEntry<V>>>,
}

impl<K: Eq + Hash, V: Clone> TimedCache<K, V> {
    /// Create a cache with the given freshness window.
    pub fn new(ttl: Duration) -> Self {
        TimedCache {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Return the cached value iff it is still fresh
    /// (`now - fetched_at < ttl`). A stale entry reads as absent; the
    /// caller is expected to refetch and overwrite it.
    pub fn get(&self, key: &K) -> Option<V> {
        let entries = self.entries.lock().unwrap();
        let entry = entries.get(key)?;
        if entry.fetched_at.elapsed() < self.ttl {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    /// Insert or overwrite unconditionally, stamping the current time.
    pub fn put(&self, key: K, value: V) {
        let mut entries = self.entries.lock().unwrap();
        entries.insert(
            key,
            CacheEntry {
                value,
                fetched_at: Instant::now(),
            },
        );
    }

    /// Number of entries held, fresh or stale.
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
