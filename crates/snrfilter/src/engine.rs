//! Async front door over the filter and search engines
//!
//! Owns the shared result cache and the scan pool. Validation happens on the
//! caller's task so bad input fails fast; scans go to the pool and the caller
//! only waits when it awaits the returned handle.

use std::path::Path;
use std::sync::Arc;

use snrcache::CacheStats;
use tracing::info;

use crate::config::EngineConfig;
use crate::criteria::{FilterCriteria, SearchMode, SearchParams};
use crate::dispatch::{ScanHandle, ScanPool};
use crate::error::Result;
use crate::export;
use crate::filter::{FilterEngine, Filtering};
use crate::parser::{parse_filter, parse_query};
use crate::record::{DataProvider, Record, Records};
use crate::scan::{new_shared_cache, SharedCache};
use crate::search::{score_matches, ScoredMatch, SearchEngine, SearchHistoryEntry, Searching};
use crate::stats::{FilterStats, ScanMetrics};

/// Filter and search engines sharing one cache and one worker pool
pub struct SnrEngine {
    data: Arc<dyn DataProvider>,
    cache: SharedCache,
    filter: Arc<FilterEngine>,
    search: Arc<SearchEngine>,
    pool: ScanPool,
    config: EngineConfig,
}

impl SnrEngine {
    /// Build the engines over `data`
    ///
    /// Must be called from within a Tokio runtime before any scan is
    /// submitted.
    pub fn new(data: Arc<dyn DataProvider>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let cache = new_shared_cache(&config.cache);
        let filter = Arc::new(FilterEngine::new(Arc::clone(&data), Arc::clone(&cache), &config));
        let search = Arc::new(SearchEngine::new(Arc::clone(&data), Arc::clone(&cache), &config));
        let pool = ScanPool::new(&config.dispatch);
        info!(
            "Engine ready: {} records, cache capacity {}{}, {} workers",
            data.snapshot().len(),
            config.cache.capacity,
            if config.cache.enabled { "" } else { " (disabled)" },
            pool.workers()
        );
        Ok(Self {
            data,
            cache,
            filter,
            search,
            pool,
            config,
        })
    }

    /// Queue a filter; invalid criteria are rejected before anything is queued
    pub fn submit_filter(
        &self,
        criteria: FilterCriteria,
    ) -> Result<ScanHandle<(Records, FilterStats)>> {
        criteria.validate()?;
        let filter = Arc::clone(&self.filter);
        Ok(self
            .pool
            .submit(move |token| filter.apply_filter_with(&criteria, token)))
    }

    /// Queue a search; invalid parameters are rejected before anything is queued
    ///
    /// The history position is taken now, so history follows submission order
    /// even when a later search finishes first.
    pub fn submit_search(&self, params: SearchParams) -> Result<ScanHandle<Records>> {
        params.validate()?;
        let search = Arc::clone(&self.search);
        let ticket = search.reserve_history();
        Ok(self
            .pool
            .submit(move |token| search.search_with_ticket(&params, token, ticket)))
    }

    /// Filter the data set and make the result the active filter
    pub async fn apply_filter(&self, criteria: FilterCriteria) -> Result<(Records, FilterStats)> {
        self.submit_filter(criteria)?.await
    }

    /// Parse `field=min..max` tokens and apply them
    ///
    /// Returns `Ok(None)` when the text holds no usable constraint.
    pub async fn apply_filter_str(&self, input: &str) -> Result<Option<(Records, FilterStats)>> {
        match parse_filter(input) {
            Some(criteria) => self.apply_filter(criteria).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run several filters concurrently, results in input order
    pub async fn apply_filters(
        &self,
        criteria: Vec<FilterCriteria>,
    ) -> Vec<Result<(Records, FilterStats)>> {
        let handles: Vec<_> = criteria.into_iter().map(|c| self.submit_filter(c)).collect();
        collect_in_order(handles).await
    }

    /// Exact search
    pub async fn search_exact(&self, params: SearchParams) -> Result<Records> {
        self.submit_search(params.mode(SearchMode::Exact))?.await
    }

    /// Fuzzy search
    pub async fn search_fuzzy(&self, params: SearchParams) -> Result<Records> {
        self.submit_search(params.mode(SearchMode::Fuzzy))?.await
    }

    /// Fuzzy search with a closeness score per match, in source order
    pub async fn search_fuzzy_scored(&self, params: SearchParams) -> Result<Vec<ScoredMatch>> {
        let params = params.mode(SearchMode::Fuzzy);
        let records = self.submit_search(params)?.await?;
        Ok(score_matches(&params, &records))
    }

    /// Parse a query line and search in the mode it names (exact by default)
    ///
    /// Returns `Ok(None)` when the text holds no usable target.
    pub async fn search_str(&self, input: &str) -> Result<Option<Records>> {
        match parse_query(input, self.search.new_params()) {
            Some(params) => self.submit_search(params)?.await.map(Some),
            None => Ok(None),
        }
    }

    /// Run several searches concurrently, each in its own mode, results in input order
    pub async fn search_batch(&self, params: Vec<SearchParams>) -> Vec<Result<Records>> {
        let handles: Vec<_> = params.into_iter().map(|p| self.submit_search(p)).collect();
        collect_in_order(handles).await
    }

    /// Criteria with the SNR lower bound moved toward `target_count` matches
    pub async fn optimize_filter(
        &self,
        criteria: FilterCriteria,
        target_count: usize,
    ) -> Result<FilterCriteria> {
        criteria.validate()?;
        let filter = Arc::clone(&self.filter);
        self.pool
            .submit(move |token| filter.optimize_filter(&criteria, target_count, token))
            .await
    }

    /// Best `n` records by SNR among those matching `criteria`
    pub async fn top_by_snr(&self, criteria: FilterCriteria, n: usize) -> Result<Vec<Record>> {
        criteria.validate()?;
        let filter = Arc::clone(&self.filter);
        self.pool
            .submit(move |token| filter.top_by_snr(&criteria, n, token))
            .await
    }

    /// Forget the active filter
    pub fn clear_filter(&self) {
        self.filter.clear_filter();
    }

    /// Statistics of the active filter, or of the full data set
    pub fn get_filter_statistics(&self) -> FilterStats {
        self.filter.get_filter_statistics()
    }

    /// Criteria of the active filter
    pub fn active_filter(&self) -> Option<FilterCriteria> {
        self.filter.active_criteria()
    }

    /// Filter ideas derived from the data distribution
    pub fn suggest_filters(&self, target_count: usize) -> Vec<FilterCriteria> {
        self.filter.suggest_filters(target_count)
    }

    /// Completions for a partially typed `field=value` token
    pub fn get_search_suggestions(&self, partial: &str) -> Vec<String> {
        self.search.get_search_suggestions(partial)
    }

    /// Search history, oldest first
    pub fn get_search_history(&self) -> Vec<SearchHistoryEntry> {
        self.search.get_search_history()
    }

    /// Append to search history
    pub fn add_to_history(&self, params: SearchParams) {
        self.search.add_to_history(params);
    }

    /// Empty the search history
    pub fn clear_history(&self) {
        self.search.clear_history();
    }

    /// Search parameters seeded with the configured default tolerance
    pub fn new_search_params(&self) -> SearchParams {
        self.search.new_params()
    }

    /// Write records to a `.csv` or `.json` file
    pub fn export(&self, records: &[Record], path: &Path) -> Result<()> {
        export::export(records, path)
    }

    /// Purge the shared result cache
    pub fn clear_cache(&self) {
        self.filter.clear_cache();
    }

    /// Shared cache counters
    pub fn cache_stats(&self) -> &CacheStats {
        self.cache.results().stats()
    }

    /// Number of cached result sets
    pub fn cache_len(&self) -> usize {
        self.cache.results().len()
    }

    /// Filter query counters
    pub fn filter_metrics(&self) -> &ScanMetrics {
        self.filter.metrics()
    }

    /// Search query counters
    pub fn search_metrics(&self) -> &ScanMetrics {
        self.search.metrics()
    }

    /// Current record count
    pub fn record_count(&self) -> usize {
        self.data.snapshot().len()
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The underlying filter engine
    pub fn filter_engine(&self) -> &FilterEngine {
        &self.filter
    }

    /// The underlying search engine
    pub fn search_engine(&self) -> &SearchEngine {
        &self.search
    }

    /// Stop accepting scans; queued scans fail
    pub fn shutdown(&self) {
        self.pool.close();
        info!("Engine shut down");
    }
}

/// Await already-submitted scans; they run concurrently on the pool
async fn collect_in_order<T>(handles: Vec<Result<ScanHandle<T>>>) -> Vec<Result<T>> {
    let mut results = Vec::with_capacity(handles.len());
    for handle in handles {
        results.push(match handle {
            Ok(handle) => handle.await,
            Err(e) => Err(e),
        });
    }
    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::record::SharedDataset;

    fn scenario() -> Vec<Record> {
        vec![
            Record::new(1, 1, 1, 10.0),
            Record::new(1, 2, 1, 10.05),
            Record::new(2, 2, 2, 20.0),
        ]
    }

    fn engine_with(config: EngineConfig) -> (Arc<SharedDataset>, SnrEngine) {
        let provider = Arc::new(SharedDataset::new(scenario()));
        let engine = SnrEngine::new(provider.clone(), config).unwrap();
        (provider, engine)
    }

    fn engine() -> SnrEngine {
        engine_with(EngineConfig::default()).1
    }

    #[tokio::test]
    async fn test_apply_filter_scenario() {
        let engine = engine();

        let (records, stats) = engine
            .apply_filter(FilterCriteria::new().pre(1, 1).snr(9.5, 10.1))
            .await
            .unwrap();

        assert_eq!(*records, scenario()[..2].to_vec());
        assert_eq!(stats.filtered_count, 2);
        assert_eq!(engine.get_filter_statistics(), stats);
    }

    #[tokio::test]
    async fn test_invalid_filter_fails_fast() {
        let engine = engine();

        let err = engine
            .apply_filter(FilterCriteria::new().snr(2.0, 1.0))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidCriteria { .. }));
        assert_eq!(engine.filter_metrics().queries(), 0);
    }

    #[tokio::test]
    async fn test_search_modes() {
        let engine = engine();

        let fuzzy = engine
            .search_fuzzy(SearchParams::new().snr(10.0).tolerance(0.1))
            .await
            .unwrap();
        let exact = engine.search_exact(SearchParams::new().pre(2)).await.unwrap();

        assert_eq!(fuzzy.len(), 2);
        assert_eq!(*exact, vec![Record::new(2, 2, 2, 20.0)]);
        assert_eq!(engine.get_search_history().len(), 2);
    }

    #[tokio::test]
    async fn test_string_queries() {
        let engine = engine();

        let found = engine.search_str("snr=10 tol=0.1 mode=fuzzy").await.unwrap().unwrap();
        assert_eq!(found.len(), 2);

        let (filtered, _) = engine.apply_filter_str("main=2").await.unwrap().unwrap();
        assert_eq!(filtered.len(), 2);

        assert!(engine.search_str("pre=oops").await.unwrap().is_none());
        assert!(engine.apply_filter_str("snr=1..x").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_queries_share_cache() {
        let engine = engine();
        let criteria = FilterCriteria::new().main(2, 2);

        let results = engine.apply_filters(vec![criteria; 8]).await;
        let first = results[0].as_ref().unwrap().0.clone();
        for result in &results {
            assert_eq!(result.as_ref().unwrap().0, first);
        }

        engine.apply_filter(criteria).await.unwrap();
        assert!(engine.filter_metrics().cached() >= 1);
        assert_eq!(engine.filter_metrics().queries(), 9);
    }

    #[tokio::test]
    async fn test_search_batch_keeps_order_and_errors() {
        let engine = engine();

        let results = engine
            .search_batch(vec![
                SearchParams::new().pre(2),
                SearchParams::new(),
                SearchParams::new().snr(10.0).tolerance(0.1).mode(SearchMode::Fuzzy),
            ])
            .await;

        assert_eq!(results[0].as_ref().unwrap().len(), 1);
        assert!(matches!(results[1], Err(Error::EmptySearchParams)));
        assert_eq!(results[2].as_ref().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_scored_fuzzy_and_optimize() {
        let engine = engine();

        let scored = engine
            .search_fuzzy_scored(SearchParams::new().snr(10.0).tolerance(0.1))
            .await
            .unwrap();
        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].score, 1.0);
        assert!(scored[1].score < 1.0);

        let optimized = engine
            .optimize_filter(FilterCriteria::new().snr(0.0, 30.0), 1)
            .await
            .unwrap();
        assert_eq!(optimized, FilterCriteria::new().snr(20.0, 30.0));
    }

    #[tokio::test]
    async fn test_top_by_snr() {
        let engine = engine();

        let top = engine.top_by_snr(FilterCriteria::new(), 2).await.unwrap();

        assert_eq!(top[0].snr, 20.0);
        assert_eq!(top[1].snr, 10.05);
    }

    #[tokio::test]
    async fn test_data_replacement_invalidates_results() {
        let (provider, engine) = engine_with(EngineConfig::default());
        let criteria = FilterCriteria::new().pre(2, 2);

        engine.apply_filter(criteria).await.unwrap();
        provider.replace(vec![Record::new(2, 0, 0, 1.0), Record::new(2, 9, 9, 2.0)]);
        let (records, stats) = engine.apply_filter(criteria).await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(stats.total_count, 2);
        assert_eq!(engine.record_count(), 2);
    }

    #[tokio::test]
    async fn test_disabled_cache_always_scans() {
        let mut config = EngineConfig::default();
        config.cache.enabled = false;
        let (_, engine) = engine_with(config);
        let params = SearchParams::new().post(1);

        engine.search_exact(params).await.unwrap();
        engine.search_exact(params).await.unwrap();

        assert_eq!(engine.search_metrics().scans(), 2);
        assert_eq!(engine.cache_len(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_refuses_scans() {
        let engine = engine();
        engine.shutdown();

        let err = engine.search_exact(SearchParams::new().pre(1)).await.unwrap_err();
        assert!(matches!(err, Error::ScanFailure(_)));

        // The refused search must not hold back later history entries
        engine.add_to_history(SearchParams::new().pre(5));
        assert_eq!(engine.get_search_history().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_history_follows_submission_order() {
        let data: Vec<Record> = (0..200_000)
            .map(|i| Record::new(i % 7, i % 11, 0, f64::from(i)))
            .collect();
        let engine = SnrEngine::new(Arc::new(SharedDataset::new(data)), EngineConfig::default())
            .unwrap();
        engine.search_exact(SearchParams::new().pre(1)).await.unwrap();
        engine.clear_history();

        // pre=2 needs a full scan while pre=1 is answered from the cache
        let results = engine
            .search_batch(vec![SearchParams::new().pre(2), SearchParams::new().pre(1)])
            .await;

        assert!(results.iter().all(|r| r.is_ok()));
        let pres: Vec<Option<i32>> = engine
            .get_search_history()
            .iter()
            .map(|entry| entry.params.pre_value)
            .collect();
        assert_eq!(pres, vec![Some(2), Some(1)]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = EngineConfig::default();
        config.dispatch.workers = 0;
        let provider = Arc::new(SharedDataset::new(scenario()));

        assert!(matches!(
            SnrEngine::new(provider, config),
            Err(Error::Config(_))
        ));
    }
}
