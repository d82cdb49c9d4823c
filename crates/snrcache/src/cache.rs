//! Thread-safe result cache shared between query engines

use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::CacheError;
use crate::lru::LruCache;
use crate::stats::CacheStats;

/// Default number of cached result sets
pub const DEFAULT_CAPACITY: usize = 100;

/// Default time to wait for the cache guard before falling through
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(50);

/// Exclusive hold on a [`ResultCache`], released on drop
#[doc(hidden)]
pub struct HeldGuard<'a, V> {
    _guard: MutexGuard<'a, LruCache<String, V>>,
}

/// Bounded LRU store mapping canonical query keys to opaque result values
///
/// A single mutex guards the LRU list; the critical section is map and list
/// bookkeeping only. Values are cloned out on `get`, so `V` is usually an
/// `Arc` around the real payload.
///
/// The cache knows nothing about the data the values were computed from.
/// Callers must `clear` it (or fold a data version into the key) whenever that
/// data changes.
pub struct ResultCache<V> {
    /// LRU list of cached values
    lru: Mutex<LruCache<String, V>>,

    /// Cache statistics
    stats: CacheStats,

    /// How long `get`/`put` wait for the guard
    lock_timeout: Duration,
}

impl<V: Clone> ResultCache<V> {
    /// Create a cache holding at most `capacity` entries
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of entries (must be non-zero)
    /// * `lock_timeout` - How long lookups wait before reporting the cache unavailable
    pub fn new(capacity: usize, lock_timeout: Duration) -> Self {
        Self {
            lru: Mutex::new(LruCache::new(capacity)),
            stats: CacheStats::new(),
            lock_timeout,
        }
    }

    /// Create a cache with the default capacity and lock timeout
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_LOCK_TIMEOUT)
    }

    /// Look up a key, refreshing its recency on a hit
    ///
    /// # Returns
    /// * `Ok(Some(value))` on a hit, `Ok(None)` on a miss
    /// * `Err(CacheError::Unavailable)` if the guard could not be taken in time
    pub fn get(&self, key: &str) -> Result<Option<V>, CacheError> {
        let mut lru = self.lock()?;
        match lru.get(key) {
            Some(value) => {
                self.stats.record_hit();
                Ok(Some(value.clone()))
            }
            None => {
                self.stats.record_miss();
                Ok(None)
            }
        }
    }

    /// Insert or replace a value, evicting the least recently used entry if full
    pub fn put(&self, key: String, value: V) -> Result<(), CacheError> {
        let mut lru = self.lock()?;
        if lru.put(key, value).is_some() {
            self.stats.record_eviction();
        }
        self.stats.record_insert();
        Ok(())
    }

    /// Remove every entry
    ///
    /// Waits for the guard without a timeout: a purge must never be skipped.
    pub fn clear(&self) {
        self.lru.lock().clear();
    }

    /// Check whether a key is cached without touching its recency
    pub fn contains(&self, key: &str) -> bool {
        self.lru.lock().contains(key)
    }

    /// Cached keys from most to least recently used
    pub fn keys(&self) -> Vec<String> {
        self.lru.lock().keys()
    }

    /// Get cache statistics
    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Get current cache size
    pub fn len(&self) -> usize {
        self.lru.lock().len()
    }

    /// Check if the cache holds no entries
    pub fn is_empty(&self) -> bool {
        self.lru.lock().is_empty()
    }

    /// Get cache capacity
    pub fn capacity(&self) -> usize {
        self.lru.lock().capacity()
    }

    /// Take the guard and keep it until the returned value is dropped
    ///
    /// While held, `get` and `put` from any thread time out with
    /// `CacheError::Unavailable`. `clear`, `len` and the other inspectors
    /// block, so do not call them while holding it.
    #[doc(hidden)]
    pub fn hold_guard(&self) -> HeldGuard<'_, V> {
        HeldGuard {
            _guard: self.lru.lock(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, V>>, CacheError> {
        match self.lru.try_lock_for(self.lock_timeout) {
            Some(guard) => Ok(guard),
            None => {
                self.stats.record_unavailable();
                Err(CacheError::Unavailable)
            }
        }
    }
}
