//! Exact and fuzzy search engine with history and input suggestions

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::criteria::{Field, SearchMode, SearchParams};
use crate::dispatch::CancelToken;
use crate::error::Result;
use crate::parser::{parse_partial, PartialToken, Radix};
use crate::record::{DataProvider, Record, Records, ValueIndex};
use crate::scan::{cached_or_scan, generation_key, scan_records, SharedCache};
use crate::stats::ScanMetrics;

/// Search operations exposed to the UI boundary
pub trait Searching {
    /// Records whose fields equal every target exactly
    fn search_exact(&self, params: &SearchParams) -> Result<Records>;

    /// Records matching integer targets exactly and SNR within tolerance
    fn search_fuzzy(&self, params: &SearchParams) -> Result<Records>;

    /// Completions for a partially typed `field=value` token
    fn get_search_suggestions(&self, partial: &str) -> Vec<String>;

    /// Append to history, dropping the oldest entry when full
    fn add_to_history(&self, params: SearchParams);

    /// History, oldest first
    fn get_search_history(&self) -> Vec<SearchHistoryEntry>;

    /// Empty the history
    fn clear_history(&self);
}

/// One executed search
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    /// Parameters as executed
    pub params: SearchParams,
    /// Mode the search ran in
    pub mode: SearchMode,
}

/// Bounded, append-only search history
///
/// Entries appear in the order their positions were reserved, not the order
/// they were resolved. A concurrent search that finishes early waits in
/// `pending` until every earlier reservation is committed or released.
#[derive(Debug)]
pub struct SearchHistory {
    entries: VecDeque<SearchHistoryEntry>,
    limit: usize,
    next_slot: u64,
    next_commit: u64,
    discard_below: u64,
    pending: BTreeMap<u64, Option<SearchHistoryEntry>>,
}

impl SearchHistory {
    /// Create a history keeping at most `limit` entries
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
            next_slot: 0,
            next_commit: 0,
            discard_below: 0,
            pending: BTreeMap::new(),
        }
    }

    /// Claim the next position in the history
    pub fn reserve(&mut self) -> u64 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    /// Fill a reserved position with `params`, or release it with `None`
    ///
    /// Resolved positions are appended once all earlier ones are resolved.
    /// Positions reserved before the last `clear` are dropped.
    pub fn resolve(&mut self, slot: u64, params: Option<SearchParams>) {
        if slot < self.next_commit || slot >= self.next_slot {
            return;
        }
        let entry = params
            .filter(|_| slot >= self.discard_below)
            .map(|params| SearchHistoryEntry {
                params,
                mode: params.mode,
            });
        self.pending.insert(slot, entry);

        while let Some(resolved) = self.pending.remove(&self.next_commit) {
            self.next_commit += 1;
            if let Some(entry) = resolved {
                self.append(entry);
            }
        }
    }

    /// Append an entry behind every outstanding reservation
    pub fn push(&mut self, params: SearchParams) {
        let slot = self.reserve();
        self.resolve(slot, Some(params));
    }

    fn append(&mut self, entry: SearchHistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    /// Entries oldest first
    pub fn entries(&self) -> Vec<SearchHistoryEntry> {
        self.entries.iter().copied().collect()
    }

    /// Entries newest first
    pub fn iter_newest(&self) -> impl Iterator<Item = &SearchHistoryEntry> {
        self.entries.iter().rev()
    }

    /// Remove all entries, including those of searches still in flight
    pub fn clear(&mut self) {
        self.entries.clear();
        self.discard_below = self.next_slot;
        for entry in self.pending.values_mut() {
            *entry = None;
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the history is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn limit(&self) -> usize {
        self.limit
    }
}

/// A fuzzy match and how close it came to the targets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredMatch {
    /// The matching record
    pub record: Record,
    /// Mean closeness over the targeted fields, from 0.0 to 1.0
    ///
    /// Each integer target that matches counts 1.0. The SNR target counts
    /// `1 - |snr - target| / tolerance`, or 1.0 on an exact hit when the
    /// tolerance is zero.
    pub score: f64,
    /// Targeted fields the record satisfied, in pre/main/post/snr order
    pub matched_fields: Vec<Field>,
}

/// Score `records` against the targets in `params`, keeping their order
pub fn score_matches(params: &SearchParams, records: &[Record]) -> Vec<ScoredMatch> {
    records.iter().map(|record| score_match(params, *record)).collect()
}

fn score_match(params: &SearchParams, record: Record) -> ScoredMatch {
    let mut targets = 0usize;
    let mut total = 0.0;
    let mut matched_fields = Vec::new();

    let int_targets = [
        (Field::Pre, params.pre_value, record.pre),
        (Field::Main, params.main_value, record.main),
        (Field::Post, params.post_value, record.post),
    ];
    for (field, target, actual) in int_targets {
        let Some(target) = target else { continue };
        targets += 1;
        if actual == target {
            total += 1.0;
            matched_fields.push(field);
        }
    }

    if let Some(target) = params.snr_value {
        targets += 1;
        let diff = (record.snr - target).abs();
        if diff <= params.tolerance {
            total += if params.tolerance > 0.0 {
                1.0 - diff / params.tolerance
            } else {
                1.0
            };
            matched_fields.push(Field::Snr);
        }
    }

    let score = if targets == 0 { 0.0 } else { total / targets as f64 };
    ScoredMatch {
        record,
        score,
        matched_fields,
    }
}

/// Reserved history position for a search that has not finished
///
/// Dropping the ticket without calling `commit` releases the position, so a
/// cancelled or failed search never holds back later entries.
pub struct HistoryTicket {
    history: Arc<Mutex<SearchHistory>>,
    slot: Option<u64>,
}

impl HistoryTicket {
    /// Record `params` at the reserved position
    pub fn commit(mut self, params: SearchParams) {
        if let Some(slot) = self.slot.take() {
            self.history.lock().resolve(slot, Some(params));
        }
    }
}

impl Drop for HistoryTicket {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            self.history.lock().resolve(slot, None);
        }
    }
}

/// Cached exact/fuzzy search over a [`DataProvider`]
pub struct SearchEngine {
    data: Arc<dyn DataProvider>,
    cache: SharedCache,
    cache_enabled: bool,
    check_interval: usize,
    history: Arc<Mutex<SearchHistory>>,
    max_suggestions: usize,
    default_tolerance: f64,
    metrics: ScanMetrics,
}

impl SearchEngine {
    /// Create a search engine
    ///
    /// # Arguments
    /// * `data` - Provider of the data set to search
    /// * `cache` - Result cache, usually shared with the filter engine
    /// * `config` - Engine configuration
    pub fn new(data: Arc<dyn DataProvider>, cache: SharedCache, config: &EngineConfig) -> Self {
        Self {
            data,
            cache,
            cache_enabled: config.cache.enabled,
            check_interval: config.dispatch.cancel_check_interval,
            history: Arc::new(Mutex::new(SearchHistory::new(config.search.history_limit))),
            max_suggestions: config.search.max_suggestions,
            default_tolerance: config.search.default_tolerance,
            metrics: ScanMetrics::new(),
        }
    }

    /// Empty parameters carrying the configured default tolerance
    pub fn new_params(&self) -> SearchParams {
        SearchParams::new().tolerance(self.default_tolerance)
    }

    /// Reserve the next history position for a search about to be queued
    pub fn reserve_history(&self) -> HistoryTicket {
        HistoryTicket {
            slot: Some(self.history.lock().reserve()),
            history: Arc::clone(&self.history),
        }
    }

    /// Run a search in `params.mode`, recording it in history on success
    pub fn search_with(&self, params: &SearchParams, token: &CancelToken) -> Result<Records> {
        self.search_with_ticket(params, token, self.reserve_history())
    }

    /// `search_with`, recording into a position reserved earlier
    pub fn search_with_ticket(
        &self,
        params: &SearchParams,
        token: &CancelToken,
        ticket: HistoryTicket,
    ) -> Result<Records> {
        params.validate()?;
        let dataset = self.data.snapshot();
        let generation = dataset.generation();
        self.cache.observe(generation);

        let key = generation_key(generation, &params.canonical_key());
        let cache = self.cache_enabled.then(|| self.cache.results());
        let records = cached_or_scan(cache, key, &self.metrics, || {
            scan_records(dataset.records(), token, self.check_interval, |r| {
                params.matches(r)
            })
        })?;
        debug!("Search {} ({}) matched {} records", params, params.mode, records.len());

        ticket.commit(*params);
        Ok(records)
    }

    /// Fuzzy search, each match carrying its closeness score
    ///
    /// Matches keep source order; sort by `score` to rank them.
    pub fn search_fuzzy_scored(
        &self,
        params: &SearchParams,
        token: &CancelToken,
    ) -> Result<Vec<ScoredMatch>> {
        let params = params.mode(SearchMode::Fuzzy);
        let records = self.search_with(&params, token)?;
        Ok(score_matches(&params, &records))
    }

    /// Query counters
    pub fn metrics(&self) -> &ScanMetrics {
        &self.metrics
    }

    fn history_values(&self, field: Field) -> Vec<Candidate> {
        self.history
            .lock()
            .iter_newest()
            .filter_map(|entry| {
                let p = &entry.params;
                match field {
                    Field::Pre => p.pre_value.map(Candidate::Int),
                    Field::Main => p.main_value.map(Candidate::Int),
                    Field::Post => p.post_value.map(Candidate::Int),
                    Field::Snr => p.snr_value.map(Candidate::Float),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
enum Candidate {
    Int(i32),
    Float(f64),
}

impl Candidate {
    fn render(self, radix: Radix) -> String {
        match (self, radix) {
            (Candidate::Int(v), Radix::Hex) if v < 0 => format!("-0x{:x}", v.unsigned_abs()),
            (Candidate::Int(v), Radix::Hex) => format!("0x{:x}", v),
            (Candidate::Int(v), Radix::Decimal) => v.to_string(),
            (Candidate::Float(v), _) => format!("{:?}", v),
        }
    }
}

fn index_values(index: &ValueIndex, field: Field) -> Vec<Candidate> {
    match field {
        Field::Pre => index.pre().iter().copied().map(Candidate::Int).collect(),
        Field::Main => index.main().iter().copied().map(Candidate::Int).collect(),
        Field::Post => index.post().iter().copied().map(Candidate::Int).collect(),
        Field::Snr => index.snr().iter().copied().map(Candidate::Float).collect(),
    }
}

fn complete(token: &PartialToken, candidates: Vec<Candidate>, limit: usize) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for candidate in candidates {
        if out.len() >= limit {
            break;
        }
        let literal = candidate.render(token.radix);
        if !literal.starts_with(&token.prefix) {
            continue;
        }
        let suggestion = format!("{}={}", token.field, literal);
        if !out.contains(&suggestion) {
            out.push(suggestion);
        }
    }
    out
}

impl Searching for SearchEngine {
    fn search_exact(&self, params: &SearchParams) -> Result<Records> {
        self.search_with(&params.mode(SearchMode::Exact), &CancelToken::new())
    }

    fn search_fuzzy(&self, params: &SearchParams) -> Result<Records> {
        self.search_with(&params.mode(SearchMode::Fuzzy), &CancelToken::new())
    }

    /// Previously searched values come first (newest first), then distinct
    /// values from the data set index in ascending order. Never scans records.
    fn get_search_suggestions(&self, partial: &str) -> Vec<String> {
        let Some(token) = parse_partial(partial) else {
            return Vec::new();
        };
        let dataset = self.data.snapshot();
        let mut candidates = self.history_values(token.field);
        candidates.extend(index_values(dataset.index(), token.field));
        complete(&token, candidates, self.max_suggestions)
    }

    fn add_to_history(&self, params: SearchParams) {
        self.history.lock().push(params);
    }

    fn get_search_history(&self) -> Vec<SearchHistoryEntry> {
        self.history.lock().entries()
    }

    fn clear_history(&self) {
        self.history.lock().clear();
        info!("Search history cleared");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::parser::{parse_assignment, FieldValue};
    use crate::record::{Record, SharedDataset};
    use crate::scan::GenerationCache;
    use snrcache::ResultCache;
    use std::time::Duration;

    fn scenario() -> Vec<Record> {
        vec![
            Record::new(1, 1, 1, 10.0),
            Record::new(1, 2, 1, 10.05),
            Record::new(2, 2, 2, 20.0),
        ]
    }

    fn engine_with(records: Vec<Record>, config: &EngineConfig) -> SearchEngine {
        let provider = Arc::new(SharedDataset::new(records));
        let cache = Arc::new(GenerationCache::new(ResultCache::new(8, Duration::from_millis(10))));
        SearchEngine::new(provider, cache, config)
    }

    fn engine() -> SearchEngine {
        engine_with(scenario(), &EngineConfig::default())
    }

    #[test]
    fn test_fuzzy_scenario() {
        let engine = engine();

        let records = engine
            .search_fuzzy(&SearchParams::new().snr(10.0).tolerance(0.1))
            .unwrap();

        assert_eq!(*records, scenario()[..2].to_vec());
    }

    #[test]
    fn test_exact_scenario() {
        let engine = engine();

        let records = engine.search_exact(&SearchParams::new().pre(2)).unwrap();

        assert_eq!(*records, vec![Record::new(2, 2, 2, 20.0)]);
    }

    #[test]
    fn test_exact_ignores_configured_tolerance() {
        let engine = engine();

        let records = engine
            .search_exact(&SearchParams::new().snr(10.0).tolerance(0.1))
            .unwrap();

        assert_eq!(*records, vec![Record::new(1, 1, 1, 10.0)]);
    }

    #[test]
    fn test_fuzzy_boundary_matches() {
        let engine = engine_with(
            vec![Record::new(0, 0, 0, 9.5), Record::new(0, 0, 0, 10.75)],
            &EngineConfig::default(),
        );

        let records = engine
            .search_fuzzy(&SearchParams::new().snr(10.0).tolerance(0.5))
            .unwrap();

        assert_eq!(*records, vec![Record::new(0, 0, 0, 9.5)]);
    }

    #[test]
    fn test_fuzzy_without_snr_is_exact_on_integers() {
        let engine = engine();

        let fuzzy = engine.search_fuzzy(&SearchParams::new().main(2)).unwrap();
        let exact = engine.search_exact(&SearchParams::new().main(2)).unwrap();

        assert_eq!(fuzzy, exact);
        assert_eq!(fuzzy.len(), 2);
    }

    #[test]
    fn test_empty_params_rejected() {
        let engine = engine();

        assert!(matches!(
            engine.search_exact(&SearchParams::new()),
            Err(Error::EmptySearchParams)
        ));
        assert!(matches!(
            engine.search_fuzzy(&SearchParams::new().tolerance(1.0)),
            Err(Error::EmptySearchParams)
        ));
        assert!(engine.get_search_history().is_empty());
    }

    #[test]
    fn test_repeated_search_is_cached() {
        let engine = engine();
        let params = SearchParams::new().post(1);

        engine.search_exact(&params).unwrap();
        engine.search_exact(&params).unwrap();
        engine.search_fuzzy(&params).unwrap();

        assert_eq!(engine.metrics().scans(), 2);
        assert_eq!(engine.metrics().cached(), 1);
    }

    #[test]
    fn test_search_succeeds_while_cache_is_held() {
        let engine = engine();

        let records = {
            let _held = engine.cache.results().hold_guard();
            engine.search_exact(&SearchParams::new().pre(2)).unwrap()
        };

        assert_eq!(*records, vec![Record::new(2, 2, 2, 20.0)]);
        assert_eq!(engine.cache.results().stats().unavailable(), 2);
        assert_eq!(engine.get_search_history().len(), 1);

        // Guard released: the same search is cached normally again
        engine.search_exact(&SearchParams::new().pre(2)).unwrap();
        engine.search_exact(&SearchParams::new().pre(2)).unwrap();
        assert_eq!(engine.metrics().scans(), 2);
        assert_eq!(engine.metrics().cached(), 1);
    }

    #[test]
    fn test_fuzzy_scores() {
        let engine = engine();
        let params = SearchParams::new().pre(1).snr(10.0).tolerance(0.1);

        let scored = engine.search_fuzzy_scored(&params, &CancelToken::new()).unwrap();

        assert_eq!(scored.len(), 2);
        assert_eq!(scored[0].record, Record::new(1, 1, 1, 10.0));
        assert_eq!(scored[0].score, 1.0);
        assert_eq!(scored[0].matched_fields, vec![Field::Pre, Field::Snr]);
        assert_eq!(scored[1].record, Record::new(1, 2, 1, 10.05));
        assert!((scored[1].score - 0.75).abs() < 1e-9);

        // Same result set as the unscored search, served from the cache
        let plain = engine.search_fuzzy(&params).unwrap();
        let records: Vec<Record> = scored.iter().map(|m| m.record).collect();
        assert_eq!(*plain, records);
        assert_eq!(engine.metrics().cached(), 1);
        assert_eq!(engine.get_search_history()[0].mode, SearchMode::Fuzzy);
    }

    #[test]
    fn test_score_with_zero_tolerance() {
        let params = SearchParams::new().snr(20.0).tolerance(0.0);
        let records = [Record::new(0, 0, 0, 20.0), Record::new(0, 0, 0, 20.5)];

        let scored = score_matches(&params, &records);

        assert_eq!(scored[0].score, 1.0);
        assert_eq!(scored[0].matched_fields, vec![Field::Snr]);
        assert_eq!(scored[1].score, 0.0);
        assert!(scored[1].matched_fields.is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut config = EngineConfig::default();
        config.search.history_limit = 3;
        let engine = engine_with(scenario(), &config);

        for pre in 0..4 {
            engine.search_exact(&SearchParams::new().pre(pre)).unwrap();
        }

        let pres: Vec<Option<i32>> = engine
            .get_search_history()
            .iter()
            .map(|entry| entry.params.pre_value)
            .collect();
        assert_eq!(pres, vec![Some(1), Some(2), Some(3)]);
    }

    #[test]
    fn test_history_records_mode() {
        let engine = engine();

        engine.search_fuzzy(&SearchParams::new().snr(20.0)).unwrap();
        engine.add_to_history(SearchParams::new().pre(9));

        let history = engine.get_search_history();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].mode, SearchMode::Fuzzy);
        assert_eq!(history[1].mode, SearchMode::Exact);

        engine.clear_history();
        assert!(engine.get_search_history().is_empty());
    }

    #[test]
    fn test_history_keeps_reservation_order() {
        let mut history = SearchHistory::new(10);
        let first = history.reserve();
        let second = history.reserve();

        history.resolve(second, Some(SearchParams::new().pre(2)));
        assert!(history.is_empty());

        history.resolve(first, Some(SearchParams::new().pre(1)));
        let pres: Vec<Option<i32>> = history.entries().iter().map(|e| e.params.pre_value).collect();
        assert_eq!(pres, vec![Some(1), Some(2)]);
    }

    #[test]
    fn test_released_slot_does_not_block_history() {
        let engine = engine();

        let abandoned = engine.reserve_history();
        engine.search_exact(&SearchParams::new().pre(2)).unwrap();
        assert!(engine.get_search_history().is_empty());

        drop(abandoned);
        assert_eq!(engine.get_search_history().len(), 1);
    }

    #[test]
    fn test_failed_search_releases_its_slot() {
        let engine = engine();
        let token = CancelToken::new();
        token.cancel();

        let err = engine
            .search_with(&SearchParams::new().pre(1), &token)
            .unwrap_err();
        engine.search_exact(&SearchParams::new().pre(2)).unwrap();

        assert!(matches!(err, Error::Cancelled));
        let history = engine.get_search_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].params.pre_value, Some(2));
    }

    #[test]
    fn test_clear_drops_in_flight_entries() {
        let engine = engine();

        let ticket = engine.reserve_history();
        engine.clear_history();
        ticket.commit(SearchParams::new().pre(1));
        engine.add_to_history(SearchParams::new().pre(2));

        let history = engine.get_search_history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].params.pre_value, Some(2));
    }

    #[test]
    fn test_suggestions_from_index() {
        let engine = engine_with(
            vec![
                Record::new(4097, 0, 0, 26.0),
                Record::new(4112, 0, 0, 26.5),
                Record::new(8193, 0, 0, 30.25),
            ],
            &EngineConfig::default(),
        );

        assert_eq!(
            engine.get_search_suggestions("pre=0x10"),
            vec!["pre=0x1001".to_string(), "pre=0x1010".to_string()]
        );
        assert_eq!(engine.get_search_suggestions("PRE=81"), vec!["pre=8193".to_string()]);
        assert_eq!(
            engine.get_search_suggestions("snr=26."),
            vec!["snr=26.0".to_string(), "snr=26.5".to_string()]
        );
    }

    #[test]
    fn test_negative_suggestions_parse_back() {
        let engine = engine_with(
            vec![
                Record::new(-1, 0, 0, -2.5),
                Record::new(-16, 0, 0, 1e-7),
                Record::new(i32::MIN, 0, 0, 0.0),
                Record::new(31, 0, 0, 0.0),
            ],
            &EngineConfig::default(),
        );

        let hex = engine.get_search_suggestions("pre=-0x");
        assert_eq!(hex, vec!["pre=-0x80000000", "pre=-0x10", "pre=-0x1"]);
        assert_eq!(engine.get_search_suggestions("pre=0x"), vec!["pre=0x1f"]);

        for partial in ["pre=-0x", "pre=0x", "pre=", "pre=-", "snr="] {
            for suggestion in engine.get_search_suggestions(partial) {
                assert!(
                    parse_assignment(&suggestion).is_some(),
                    "{} does not parse back",
                    suggestion
                );
            }
        }
        assert_eq!(
            parse_assignment("pre=-0x80000000"),
            Some((Field::Pre, FieldValue::Int(i32::MIN)))
        );
    }

    #[test]
    fn test_suggestions_prefer_history() {
        let engine = engine();
        engine.add_to_history(SearchParams::new().main(2));

        let suggestions = engine.get_search_suggestions("main=");

        assert_eq!(suggestions, vec!["main=2".to_string(), "main=1".to_string()]);
    }

    #[test]
    fn test_suggestions_respect_limit() {
        let mut config = EngineConfig::default();
        config.search.max_suggestions = 2;
        let data: Vec<Record> = (10..20).map(|i| Record::new(i, 0, 0, 0.0)).collect();
        let engine = engine_with(data, &config);

        assert_eq!(
            engine.get_search_suggestions("pre=1"),
            vec!["pre=10".to_string(), "pre=11".to_string()]
        );
    }

    #[test]
    fn test_suggestions_tolerate_garbage() {
        let engine = engine();

        assert!(engine.get_search_suggestions("pre=12zz").is_empty());
        assert!(engine.get_search_suggestions("snr=0x").is_empty());
        assert!(engine.get_search_suggestions("bogus").is_empty());
        assert!(engine.get_search_suggestions("").is_empty());
    }

    #[test]
    fn test_new_params_uses_configured_tolerance() {
        let mut config = EngineConfig::default();
        config.search.default_tolerance = 0.25;
        let engine = engine_with(scenario(), &config);

        assert_eq!(engine.new_params().tolerance, 0.25);
    }
}
