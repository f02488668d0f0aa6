//! Bounded, time-boxed per-entity result cache.
//!
//! Keys carry the snapshot version a value was computed against, so a value
//! from a superseded snapshot can never be served. Capacity and TTL eviction
//! are left to `moka`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use moka::sync::Cache;
use scbdb_core::CacheSettings;

use crate::types::{EchoResult, TradingSignal};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueryKind {
    /// Echo for one `(delta, horizon)`; delta keyed by its bit pattern.
    Echo { delta_bits: u64, horizon: usize },
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity_id: String,
    pub snapshot_version: u64,
    pub query: QueryKind,
}

impl CacheKey {
    #[must_use]
    pub fn echo(entity_id: &str, delta: f64, horizon: usize, snapshot_version: u64) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            snapshot_version,
            query: QueryKind::Echo {
                delta_bits: delta.to_bits(),
                horizon,
            },
        }
    }

    #[must_use]
    pub fn signal(entity_id: &str, snapshot_version: u64) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            snapshot_version,
            query: QueryKind::Signal,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Echo(EchoResult),
    Signal(TradingSignal),
}

pub struct ResultCache {
    /// `None` when `ttl_secs` is zero: nothing is stored, every lookup misses.
    store: Option<Cache<CacheKey, CachedValue>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    #[must_use]
    pub fn new(settings: &CacheSettings) -> Self {
        let store = (settings.ttl_secs > 0).then(|| {
            Cache::builder()
                .max_capacity(settings.max_entries)
                .time_to_live(Duration::from_secs(settings.ttl_secs))
                .build()
        });
        Self {
            store,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Fetch a value and count the lookup towards the hit rate.
    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let found = self.peek(key);
        if found.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(entity_id = %key.entity_id, snapshot_version = key.snapshot_version, "cache hit");
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(entity_id = %key.entity_id, snapshot_version = key.snapshot_version, "cache miss");
        }
        found
    }

    /// Fetch a value without touching the hit-rate counters.
    pub fn peek(&self, key: &CacheKey) -> Option<CachedValue> {
        self.store.as_ref().and_then(|store| store.get(key))
    }

    pub fn insert(&self, key: CacheKey, value: CachedValue) {
        if let Some(store) = &self.store {
            store.insert(key, value);
        }
    }

    /// Drop everything; called when the active snapshot is superseded.
    pub fn invalidate_all(&self) {
        if let Some(store) = &self.store {
            store.invalidate_all();
            store.run_pending_tasks();
        }
    }

    /// Live entries after pending evictions have been applied.
    #[must_use]
    pub fn len(&self) -> usize {
        self.store.as_ref().map_or(0, |store| {
            store.run_pending_tasks();
            usize::try_from(store.entry_count()).unwrap_or(usize::MAX)
        })
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hits over total lookups; `0.0` before any lookup.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            return 0.0;
        }
        hits as f64 / total as f64
    }
}
