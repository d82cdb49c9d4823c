//! Shared scan plumbing: cancellable linear scan and the cache-or-scan path

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use snrcache::ResultCache;
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::dispatch::CancelToken;
use crate::error::Result;
use crate::record::{Record, Records};
use crate::stats::ScanMetrics;

/// Cache of result sets shared by the filter and search engines
pub type SharedCache = Arc<GenerationCache>;

/// Build a shared cache sized and timed by `config`
pub fn new_shared_cache(config: &CacheConfig) -> SharedCache {
    Arc::new(GenerationCache::new(ResultCache::new(
        config.capacity,
        config.lock_timeout(),
    )))
}

/// Result cache paired with the newest data set generation queried through it
///
/// Every engine sharing the cache reports the generation it is about to
/// query. Only the first report of a newer generation purges; reports of the
/// current or an older generation leave the cache alone.
pub struct GenerationCache {
    results: ResultCache<Records>,
    newest: AtomicU64,
}

impl GenerationCache {
    /// Wrap `results`, starting at generation 0
    pub fn new(results: ResultCache<Records>) -> Self {
        Self {
            results,
            newest: AtomicU64::new(0),
        }
    }

    /// Note a query against `generation`
    ///
    /// # Returns
    /// * `true` if the generation was new and the cache was purged
    pub fn observe(&self, generation: u64) -> bool {
        let previous = self.newest.fetch_max(generation, Ordering::AcqRel);
        if generation <= previous {
            return false;
        }
        info!(
            "Data set changed (generation {} -> {}), purging result cache",
            previous, generation
        );
        self.results.clear();
        true
    }

    /// Newest generation observed so far
    pub fn generation(&self) -> u64 {
        self.newest.load(Ordering::Acquire)
    }

    /// The underlying result cache
    pub fn results(&self) -> &ResultCache<Records> {
        &self.results
    }
}

/// Prefix a canonical query key with the data set generation
pub(crate) fn generation_key(generation: u64, canonical: &str) -> String {
    format!("g{}|{}", generation, canonical)
}

/// Collect the records matching `predicate`, preserving source order
///
/// The token is checked every `check_interval` records.
pub(crate) fn scan_records<P>(
    records: &[Record],
    token: &CancelToken,
    check_interval: usize,
    predicate: P,
) -> Result<Vec<Record>>
where
    P: Fn(&Record) -> bool,
{
    let mut matched = Vec::new();
    for chunk in records.chunks(check_interval.max(1)) {
        token.check()?;
        matched.extend(chunk.iter().filter(|r| predicate(r)).copied());
    }
    Ok(matched)
}

/// Serve `key` from the cache, or run `scan` and remember its result
///
/// Cache trouble is logged and otherwise ignored: the query falls through to
/// an uncached scan.
pub(crate) fn cached_or_scan<F>(
    cache: Option<&ResultCache<Records>>,
    key: String,
    metrics: &ScanMetrics,
    scan: F,
) -> Result<Records>
where
    F: FnOnce() -> Result<Vec<Record>>,
{
    if let Some(cache) = cache {
        match cache.get(&key) {
            Ok(Some(records)) => {
                debug!("Cache hit: {} ({} records)", key, records.len());
                metrics.record_cached();
                return Ok(records);
            }
            Ok(None) => debug!("Cache miss: {}", key),
            Err(e) => warn!("{}; scanning without cache for {}", e, key),
        }
    }

    let start = Instant::now();
    let records = Arc::new(scan()?);
    let elapsed = start.elapsed();
    metrics.record_scan(elapsed);
    debug!("Scanned {} matches in {:?}", records.len(), elapsed);

    if let Some(cache) = cache {
        if let Err(e) = cache.put(key, Arc::clone(&records)) {
            warn!("{}; result not cached", e);
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::time::Duration;

    fn records() -> Vec<Record> {
        (0..10).map(|i| Record::new(i, 0, 0, i as f64)).collect()
    }

    #[test]
    fn test_scan_preserves_order() {
        let data = records();
        let matched =
            scan_records(&data, &CancelToken::new(), 3, |r| r.pre % 2 == 1).unwrap();

        let pres: Vec<i32> = matched.iter().map(|r| r.pre).collect();
        assert_eq!(pres, vec![1, 3, 5, 7, 9]);
    }

    #[test]
    fn test_scan_stops_when_cancelled() {
        let token = CancelToken::new();
        token.cancel();

        let err = scan_records(&records(), &token, 4, |_| true).unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[test]
    fn test_cached_or_scan_hits_second_time() {
        let cache = ResultCache::new(4, Duration::from_millis(10));
        let metrics = ScanMetrics::new();

        let first = cached_or_scan(Some(&cache), "k".into(), &metrics, || Ok(records())).unwrap();
        let second = cached_or_scan(Some(&cache), "k".into(), &metrics, || {
            panic!("should have been served from cache")
        })
        .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(metrics.scans(), 1);
        assert_eq!(metrics.cached(), 1);
    }

    #[test]
    fn test_cached_or_scan_without_cache_always_scans() {
        let metrics = ScanMetrics::new();

        cached_or_scan(None, "k".into(), &metrics, || Ok(records())).unwrap();
        cached_or_scan(None, "k".into(), &metrics, || Ok(records())).unwrap();

        assert_eq!(metrics.scans(), 2);
    }

    #[test]
    fn test_scan_error_is_not_cached() {
        let cache = ResultCache::new(4, Duration::from_millis(10));
        let metrics = ScanMetrics::new();

        let result = cached_or_scan(Some(&cache), "k".into(), &metrics, || Err(Error::Cancelled));

        assert!(result.is_err());
        assert!(!cache.contains("k"));
    }

    #[test]
    fn test_observe_purges_only_on_newer_generation() {
        let shared = GenerationCache::new(ResultCache::new(4, Duration::from_millis(10)));
        shared.results().put("g0|a".into(), Arc::new(records())).unwrap();

        assert!(!shared.observe(0));
        assert_eq!(shared.results().len(), 1);

        assert!(shared.observe(2));
        assert!(shared.results().is_empty());
        shared.results().put("g2|a".into(), Arc::new(records())).unwrap();

        // A slower reader still holding generation 1 must not purge generation 2 results
        assert!(!shared.observe(1));
        assert!(!shared.observe(2));
        assert!(shared.results().contains("g2|a"));
        assert_eq!(shared.generation(), 2);
    }

    #[test]
    fn test_generation_key() {
        assert_eq!(generation_key(3, "filter|pre=*"), "g3|filter|pre=*");
    }
}
