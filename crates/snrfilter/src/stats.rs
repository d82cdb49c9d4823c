//! Result-set statistics and engine counters

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::record::Record;

/// SNR moments over a result set
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SnrSummary {
    /// Arithmetic mean
    pub mean: f64,
    /// Smallest value
    pub min: f64,
    /// Largest value
    pub max: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

/// Summary of a filtered result, always derived from the records it describes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    /// Records in the data set before filtering
    pub total_count: usize,
    /// Records that matched
    pub filtered_count: usize,
    /// `filtered_count / total_count * 100`, or 0 for an empty data set
    pub percentage: f64,
    /// Realized pre range over the matches
    pub pre_range: Option<(i32, i32)>,
    /// Realized main range over the matches
    pub main_range: Option<(i32, i32)>,
    /// Realized post range over the matches
    pub post_range: Option<(i32, i32)>,
    /// SNR moments over the matches
    pub snr: Option<SnrSummary>,
    /// Distinct pre values among the matches
    pub unique_pre: usize,
    /// Distinct main values among the matches
    pub unique_main: usize,
    /// Distinct post values among the matches
    pub unique_post: usize,
    /// First match with the highest SNR
    pub best: Option<Record>,
    /// First match with the lowest SNR
    pub worst: Option<Record>,
}

fn int_span(values: impl Iterator<Item = i32>) -> Option<(i32, i32)> {
    values.fold(None, |acc, v| match acc {
        None => Some((v, v)),
        Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
    })
}

impl FilterStats {
    /// Compute statistics for `records` drawn from a data set of `total_count` rows
    pub fn compute(records: &[Record], total_count: usize) -> Self {
        let filtered_count = records.len();
        let percentage = if total_count == 0 {
            0.0
        } else {
            filtered_count as f64 / total_count as f64 * 100.0
        };

        let mut best: Option<Record> = None;
        let mut worst: Option<Record> = None;
        for record in records {
            if best.map_or(true, |b| record.snr > b.snr) {
                best = Some(*record);
            }
            if worst.map_or(true, |w| record.snr < w.snr) {
                worst = Some(*record);
            }
        }

        Self {
            total_count,
            filtered_count,
            percentage,
            pre_range: int_span(records.iter().map(|r| r.pre)),
            main_range: int_span(records.iter().map(|r| r.main)),
            post_range: int_span(records.iter().map(|r| r.post)),
            snr: snr_summary(records),
            unique_pre: records.iter().map(|r| r.pre).collect::<BTreeSet<_>>().len(),
            unique_main: records.iter().map(|r| r.main).collect::<BTreeSet<_>>().len(),
            unique_post: records.iter().map(|r| r.post).collect::<BTreeSet<_>>().len(),
            best,
            worst,
        }
    }

    /// Whether nothing matched
    pub fn is_empty_result(&self) -> bool {
        self.filtered_count == 0
    }
}

fn snr_summary(records: &[Record]) -> Option<SnrSummary> {
    if records.is_empty() {
        return None;
    }
    let n = records.len() as f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for record in records {
        min = min.min(record.snr);
        max = max.max(record.snr);
        sum += record.snr;
    }
    let mean = sum / n;
    let variance = records
        .iter()
        .map(|r| {
            let d = r.snr - mean;
            d * d
        })
        .sum::<f64>()
        / n;

    Some(SnrSummary {
        mean,
        min,
        max,
        std_dev: variance.sqrt(),
    })
}

/// Per-engine query counters
#[derive(Debug, Default)]
pub struct ScanMetrics {
    queries: AtomicU64,
    scans: AtomicU64,
    cached: AtomicU64,
    scan_micros: AtomicU64,
}

impl ScanMetrics {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a query answered from the cache
    pub fn record_cached(&self) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.cached.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a query answered by a full scan
    pub fn record_scan(&self, elapsed: Duration) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.scans.fetch_add(1, Ordering::Relaxed);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.scan_micros.fetch_add(micros, Ordering::Relaxed);
    }

    /// Queries answered in total
    pub fn queries(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    /// Full scans executed
    pub fn scans(&self) -> u64 {
        self.scans.load(Ordering::Relaxed)
    }

    /// Queries answered from the cache
    pub fn cached(&self) -> u64 {
        self.cached.load(Ordering::Relaxed)
    }

    /// Cumulative scan time in microseconds
    pub fn scan_micros(&self) -> u64 {
        self.scan_micros.load(Ordering::Relaxed)
    }

    /// Mean scan time in microseconds (0 before the first scan)
    pub fn average_scan_micros(&self) -> f64 {
        let scans = self.scans();
        if scans == 0 {
            0.0
        } else {
            self.scan_micros() as f64 / scans as f64
        }
    }

    /// Reset all counters
    pub fn reset(&self) {
        self.queries.store(0, Ordering::Relaxed);
        self.scans.store(0, Ordering::Relaxed);
        self.cached.store(0, Ordering::Relaxed);
        self.scan_micros.store(0, Ordering::Relaxed);
    }
}
