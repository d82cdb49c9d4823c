//! Result cache counters

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free usage counters, updated from any thread holding the cache
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    inserts: AtomicU64,
    unavailable: AtomicU64,
}

/// Point-in-time copy of [`CacheStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Entries pushed out by capacity
    pub evictions: u64,
    /// Entries written
    pub inserts: u64,
    /// Operations that gave up waiting for the guard
    pub unavailable: u64,
}

impl StatsSnapshot {
    /// Hits over hits plus misses, 0.0 before the first lookup
    pub fn hit_ratio(&self) -> f64 {
        match self.hits + self.misses {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }
}

impl fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "hits={} misses={} ratio={:.2} inserts={} evictions={} unavailable={}",
            self.hits,
            self.misses,
            self.hit_ratio(),
            self.inserts,
            self.evictions,
            self.unavailable
        )
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn read(counter: &AtomicU64) -> u64 {
    counter.load(Ordering::Relaxed)
}

impl CacheStats {
    /// All counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_hit(&self) {
        bump(&self.hits);
    }

    pub(crate) fn record_miss(&self) {
        bump(&self.misses);
    }

    pub(crate) fn record_eviction(&self) {
        bump(&self.evictions);
    }

    pub(crate) fn record_insert(&self) {
        bump(&self.inserts);
    }

    pub(crate) fn record_unavailable(&self) {
        bump(&self.unavailable);
    }

    /// Lookups answered from the cache
    pub fn hits(&self) -> u64 {
        read(&self.hits)
    }

    /// Lookups that found nothing
    pub fn misses(&self) -> u64 {
        read(&self.misses)
    }

    /// Entries pushed out by capacity
    pub fn evictions(&self) -> u64 {
        read(&self.evictions)
    }

    /// Entries written
    pub fn inserts(&self) -> u64 {
        read(&self.inserts)
    }

    /// Operations that timed out on the cache guard
    pub fn unavailable(&self) -> u64 {
        read(&self.unavailable)
    }

    /// Copy every counter
    ///
    /// Counters are read one by one, so a snapshot taken under load may mix
    /// values from slightly different instants.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            hits: self.hits(),
            misses: self.misses(),
            evictions: self.evictions(),
            inserts: self.inserts(),
            unavailable: self.unavailable(),
        }
    }

    /// Hits over hits plus misses, 0.0 before the first lookup
    pub fn hit_ratio(&self) -> f64 {
        self.snapshot().hit_ratio()
    }

    /// Zero every counter
    pub fn reset(&self) {
        for counter in [
            &self.hits,
            &self.misses,
            &self.evictions,
            &self.inserts,
            &self.unavailable,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}
