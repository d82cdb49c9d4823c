//! Measurement records and the read-only data set the engines scan
//!
//! ```text
//!  DataProvider ──snapshot()──▶ Arc<Dataset>
//!                                 ├─ records: Arc<Vec<Record>>   (scan input)
//!                                 ├─ generation: u64             (cache key prefix)
//!                                 └─ index: ValueIndex           (suggestion source)
//! ```

use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Ordered, shareable result sequence
pub type Records = Arc<Vec<Record>>;

/// One measurement row: three configuration parameters and the SNR they produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Pre-cursor tap setting
    pub pre: i32,
    /// Main tap setting
    pub main: i32,
    /// Post-cursor tap setting
    pub post: i32,
    /// Signal-to-noise ratio
    pub snr: f64,
}

impl Record {
    /// Create a record
    pub const fn new(pre: i32, main: i32, post: i32, snr: f64) -> Self {
        Self { pre, main, post, snr }
    }
}

/// Sign-aware hex, so negative values read back as `-0x..`
struct Hex(i32);

impl fmt::Display for Hex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 < 0 {
            write!(f, "-0x{:x}", self.0.unsigned_abs())
        } else {
            write!(f, "0x{:x}", self.0)
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pre={} ({}) main={} ({}) post={} ({}) snr={}",
            self.pre,
            Hex(self.pre),
            self.main,
            Hex(self.main),
            self.post,
            Hex(self.post),
            self.snr
        )
    }
}

/// Sorted distinct values per field, built once per data set
#[derive(Debug, Clone, Default)]
pub struct ValueIndex {
    pre: Vec<i32>,
    main: Vec<i32>,
    post: Vec<i32>,
    snr: Vec<f64>,
}

impl ValueIndex {
    fn build(records: &[Record]) -> Self {
        let pre: BTreeSet<i32> = records.iter().map(|r| r.pre).collect();
        let main: BTreeSet<i32> = records.iter().map(|r| r.main).collect();
        let post: BTreeSet<i32> = records.iter().map(|r| r.post).collect();

        let mut snr: Vec<f64> = records.iter().map(|r| r.snr).filter(|v| !v.is_nan()).collect();
        snr.sort_by(f64::total_cmp);
        snr.dedup_by(|a, b| a.to_bits() == b.to_bits());

        Self {
            pre: pre.into_iter().collect(),
            main: main.into_iter().collect(),
            post: post.into_iter().collect(),
            snr,
        }
    }

    /// Distinct pre values, ascending
    pub fn pre(&self) -> &[i32] {
        &self.pre
    }

    /// Distinct main values, ascending
    pub fn main(&self) -> &[i32] {
        &self.main
    }

    /// Distinct post values, ascending
    pub fn post(&self) -> &[i32] {
        &self.post
    }

    /// Distinct SNR values, ascending (NaN excluded)
    pub fn snr(&self) -> &[f64] {
        &self.snr
    }
}

/// Immutable snapshot of the full record collection
#[derive(Debug, Clone)]
pub struct Dataset {
    records: Records,
    generation: u64,
    index: ValueIndex,
}

impl Dataset {
    /// Build a data set at generation 0
    pub fn new(records: Vec<Record>) -> Self {
        Self::with_generation(records, 0)
    }

    /// Build a data set tagged with an explicit generation number
    pub fn with_generation(records: Vec<Record>, generation: u64) -> Self {
        let index = ValueIndex::build(&records);
        Self {
            records: Arc::new(records),
            generation,
            index,
        }
    }

    /// All records in source order
    pub fn records(&self) -> &Records {
        &self.records
    }

    /// Generation tag, bumped every time the provider swaps data
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Distinct-value index
    pub fn index(&self) -> &ValueIndex {
        &self.index
    }

    /// Number of records
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the data set holds no records
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Owner of the current data set; engines only ever read snapshots
pub trait DataProvider: Send + Sync {
    /// Current data set
    fn snapshot(&self) -> Arc<Dataset>;
}

/// In-memory provider whose contents can be replaced wholesale
pub struct SharedDataset {
    current: RwLock<Arc<Dataset>>,
    next_generation: AtomicU64,
}

impl SharedDataset {
    /// Wrap an initial record collection
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            current: RwLock::new(Arc::new(Dataset::with_generation(records, 0))),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Install a new record collection under a fresh generation
    ///
    /// # Returns
    /// * The generation number of the installed data set
    pub fn replace(&self, records: Vec<Record>) -> u64 {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        *self.current.write() = Arc::new(Dataset::with_generation(records, generation));
        generation
    }
}

impl DataProvider for SharedDataset {
    fn snapshot(&self) -> Arc<Dataset> {
        Arc::clone(&self.current.read())
    }
}
