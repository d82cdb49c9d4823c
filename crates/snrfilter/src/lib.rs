//! # snrfilter
//!
//! Range filtering and exact/fuzzy search over SNR measurement records.
//!
//! ## Pieces
//! - **FilterEngine**: inclusive range filters plus result statistics
//! - **SearchEngine**: point search, bounded history, input suggestions
//! - **SnrEngine**: async front door running scans on a bounded worker pool
//! - **Cache**: one [`snrcache::ResultCache`] shared by both engines, keyed by
//!   data generation and canonical query
//!
//! ```no_run
//! use std::sync::Arc;
//! use snrfilter::{EngineConfig, FilterCriteria, Record, SharedDataset, SnrEngine};
//!
//! # async fn demo() -> snrfilter::Result<()> {
//! let data = Arc::new(SharedDataset::new(vec![Record::new(1, 1, 1, 10.0)]));
//! let engine = SnrEngine::new(data, EngineConfig::default())?;
//! let (records, stats) = engine.apply_filter(FilterCriteria::new().pre(1, 1)).await?;
//! assert_eq!(records.len(), stats.filtered_count);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]

mod config;
mod criteria;
mod dispatch;
mod engine;
mod error;
mod export;
mod filter;
mod parser;
mod record;
mod scan;
mod search;
mod stats;

pub use config::{CacheConfig, DispatchConfig, EngineConfig, SearchConfig};
pub use criteria::{Field, FilterCriteria, Range, SearchMode, SearchParams, DEFAULT_TOLERANCE};
pub use dispatch::{CancelToken, ScanHandle, ScanPool};
pub use engine::SnrEngine;
pub use error::{Error, Result};
pub use export::{export, CsvExporter, ExportFormat, Exporter, JsonExporter};
pub use filter::{FilterEngine, Filtering};
pub use parser::{
    parse_assignment, parse_filter, parse_int, parse_partial, parse_query, FieldValue,
    PartialToken, Radix,
};
pub use record::{DataProvider, Dataset, Record, Records, SharedDataset, ValueIndex};
pub use scan::{new_shared_cache, GenerationCache, SharedCache};
pub use search::{
    score_matches, HistoryTicket, ScoredMatch, SearchEngine, SearchHistory, SearchHistoryEntry,
    Searching,
};
pub use stats::{FilterStats, ScanMetrics, SnrSummary};
