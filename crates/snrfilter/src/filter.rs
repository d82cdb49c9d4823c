//! Range filter engine
//!
//! Applies [`FilterCriteria`] to the full data set. Results are cached under
//! `g<generation>|<canonical key>`; statistics are recomputed from the result
//! on every call.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::criteria::{FilterCriteria, Range};
use crate::dispatch::CancelToken;
use crate::error::Result;
use crate::record::{DataProvider, Dataset, Record, Records};
use crate::scan::{cached_or_scan, generation_key, scan_records, SharedCache};
use crate::stats::{FilterStats, ScanMetrics};

/// Filtering operations exposed to the UI boundary
pub trait Filtering {
    /// Filter the full data set, returning matches in source order plus statistics
    fn apply_filter(&self, criteria: &FilterCriteria) -> Result<(Records, FilterStats)>;

    /// Forget the active filter; the shared cache is left alone
    fn clear_filter(&self);

    /// Statistics of the most recently applied filter, or of the whole data set
    fn get_filter_statistics(&self) -> FilterStats;
}

struct ActiveFilter {
    criteria: FilterCriteria,
    stats: FilterStats,
    generation: u64,
}

/// Cached range filter over a [`DataProvider`]
pub struct FilterEngine {
    data: Arc<dyn DataProvider>,
    cache: SharedCache,
    cache_enabled: bool,
    check_interval: usize,
    active: Mutex<Option<ActiveFilter>>,
    metrics: ScanMetrics,
}

impl FilterEngine {
    /// Create a filter engine
    ///
    /// # Arguments
    /// * `data` - Provider of the data set to filter
    /// * `cache` - Result cache, usually shared with the search engine
    /// * `config` - Engine configuration
    pub fn new(data: Arc<dyn DataProvider>, cache: SharedCache, config: &EngineConfig) -> Self {
        Self {
            data,
            cache,
            cache_enabled: config.cache.enabled,
            check_interval: config.dispatch.cancel_check_interval,
            active: Mutex::new(None),
            metrics: ScanMetrics::new(),
        }
    }

    /// `apply_filter` with a cancellation token polled during the scan
    pub fn apply_filter_with(
        &self,
        criteria: &FilterCriteria,
        token: &CancelToken,
    ) -> Result<(Records, FilterStats)> {
        let (dataset, records) = self.filter_records(criteria, token)?;
        let stats = FilterStats::compute(&records, dataset.len());
        debug!(
            "Filter {} matched {}/{} records",
            criteria, stats.filtered_count, stats.total_count
        );

        *self.active.lock() = Some(ActiveFilter {
            criteria: *criteria,
            stats: stats.clone(),
            generation: dataset.generation(),
        });

        Ok((records, stats))
    }

    /// Criteria of the active filter, if one is applied
    pub fn active_criteria(&self) -> Option<FilterCriteria> {
        self.active.lock().as_ref().map(|active| active.criteria)
    }

    /// The `n` matching records with the highest SNR, best first
    ///
    /// Does not change the active filter.
    pub fn top_by_snr(
        &self,
        criteria: &FilterCriteria,
        n: usize,
        token: &CancelToken,
    ) -> Result<Vec<Record>> {
        let (_, records) = self.filter_records(criteria, token)?;
        let mut ranked: Vec<Record> = records.iter().copied().collect();
        ranked.sort_by(|a, b| b.snr.total_cmp(&a.snr));
        ranked.truncate(n);
        Ok(ranked)
    }

    /// Criteria worth offering to the user, derived from the data distribution
    ///
    /// A "high SNR" range keeping roughly the best `target_count` records
    /// (only when the data set is larger than that), then the interquartile
    /// range of pre, main and post.
    pub fn suggest_filters(&self, target_count: usize) -> Vec<FilterCriteria> {
        let dataset = self.data.snapshot();
        let records = dataset.records();
        if records.is_empty() {
            return Vec::new();
        }

        let mut suggestions = Vec::new();

        if target_count > 0 && records.len() > target_count {
            let mut snr: Vec<f64> = records.iter().map(|r| r.snr).filter(|v| !v.is_nan()).collect();
            snr.sort_by(|a, b| b.total_cmp(a));
            if let (Some(&max), Some(&threshold)) = (snr.first(), snr.get(target_count - 1)) {
                suggestions.push(FilterCriteria::new().snr(threshold, max));
            }
        }

        let quartiles = |mut values: Vec<i32>| {
            values.sort_unstable();
            (values[values.len() / 4], values[3 * values.len() / 4])
        };
        let (lo, hi) = quartiles(records.iter().map(|r| r.pre).collect());
        suggestions.push(FilterCriteria::new().pre(lo, hi));
        let (lo, hi) = quartiles(records.iter().map(|r| r.main).collect());
        suggestions.push(FilterCriteria::new().main(lo, hi));
        let (lo, hi) = quartiles(records.iter().map(|r| r.post).collect());
        suggestions.push(FilterCriteria::new().post(lo, hi));

        suggestions
    }

    /// Move the SNR lower bound so about `target_count` records match
    ///
    /// The criteria come back unchanged when the current match count is
    /// already within 10% of the target, when no SNR range is set, or when
    /// nothing matches. Otherwise the lower bound becomes the SNR of the
    /// `target_count`-th best record among those passing every other bound
    /// and the SNR maximum. Does not change the active filter.
    pub fn optimize_filter(
        &self,
        criteria: &FilterCriteria,
        target_count: usize,
        token: &CancelToken,
    ) -> Result<FilterCriteria> {
        let (dataset, current) = self.filter_records(criteria, token)?;
        let count = current.len();
        if count.abs_diff(target_count) as f64 <= target_count as f64 * 0.1 {
            return Ok(*criteria);
        }
        let Some(snr) = criteria.snr_range else {
            return Ok(*criteria);
        };
        if current.is_empty() || target_count == 0 {
            return Ok(*criteria);
        }

        let others = FilterCriteria {
            snr_range: None,
            ..*criteria
        };
        let mut values: Vec<f64> =
            scan_records(dataset.records(), token, self.check_interval, |r| {
                r.snr <= snr.max && others.matches(r)
            })?
            .iter()
            .map(|r| r.snr)
            .collect();
        if values.len() <= target_count {
            return Ok(*criteria);
        }
        values.sort_by(|a, b| b.total_cmp(a));
        let threshold = values[target_count - 1];
        debug!(
            "Optimized {} for {} records: snr min {} -> {}",
            criteria, target_count, snr.min, threshold
        );

        Ok(FilterCriteria {
            snr_range: Some(Range::new(threshold, snr.max)),
            ..*criteria
        })
    }

    /// Purge the shared result cache
    pub fn clear_cache(&self) {
        self.cache.results().clear();
        info!("Result cache cleared");
    }

    /// Query counters
    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    fn filter_records(
        &self,
        criteria: &FilterCriteria,
        token: &CancelToken,
    ) -> Result<(Arc<Dataset>, Records)> {
        criteria.validate()?;
        let dataset = self.data.snapshot();
        self.cache.observe(dataset.generation());

        if criteria.is_empty() {
            self.metrics.record_cached();
            return Ok((Arc::clone(&dataset), Arc::clone(dataset.records())));
        }

        let key = generation_key(dataset.generation(), &criteria.canonical_key());
        let cache = self.cache_enabled.then(|| self.cache.results());
        let records = cached_or_scan(cache, key, &self.metrics, || {
            scan_records(dataset.records(), token, self.check_interval, |r| {
                criteria.matches(r)
            })
        })?;
        Ok((dataset, records))
    }
}

impl Filtering for FilterEngine {
    fn apply_filter(&self, criteria: &FilterCriteria) -> Result<(Records, FilterStats)> {
        self.apply_filter_with(criteria, &CancelToken::new())
    }

    fn clear_filter(&self) {
        if self.active.lock().take().is_some() {
            debug!("Active filter cleared");
        }
    }

    fn get_filter_statistics(&self) -> FilterStats {
        let dataset = self.data.snapshot();
        if let Some(active) = self.active.lock().as_ref() {
            if active.generation == dataset.generation() {
                return active.stats.clone();
            }
        }
        FilterStats::compute(dataset.records(), dataset.len())
    }
}
