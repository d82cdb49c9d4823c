//! Filter criteria and search parameters
//!
//! Both are plain value types. Equality and hashing go through the canonical
//! cache key, so two values with the same bounds always land on the same cache
//! entry regardless of how they were built.

use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::record::Record;

/// Default SNR tolerance for searches
pub const DEFAULT_TOLERANCE: f64 = 1e-6;

/// A record field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Field {
    /// Pre-cursor tap
    Pre,
    /// Main tap
    Main,
    /// Post-cursor tap
    Post,
    /// Signal-to-noise ratio
    Snr,
}

impl Field {
    /// All fields in export order
    pub const ALL: [Field; 4] = [Field::Pre, Field::Main, Field::Post, Field::Snr];

    /// Lowercase field name
    pub fn name(self) -> &'static str {
        match self {
            Field::Pre => "pre",
            Field::Main => "main",
            Field::Post => "post",
            Field::Snr => "snr",
        }
    }

    /// Parse a field name, ignoring case
    pub fn from_name(name: &str) -> Option<Self> {
        Field::ALL
            .into_iter()
            .find(|field| field.name().eq_ignore_ascii_case(name))
    }

    /// Whether the field holds an integer parameter
    pub fn is_integer(self) -> bool {
        !matches!(self, Field::Snr)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Closed interval `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Range<T> {
    /// Inclusive lower bound
    pub min: T,
    /// Inclusive upper bound
    pub max: T,
}

impl<T: PartialOrd + Copy> Range<T> {
    /// Create a range; bounds are checked when the criteria is applied
    pub fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    /// Inclusive containment test
    pub fn contains(&self, value: T) -> bool {
        self.min <= value && value <= self.max
    }

    /// `false` when `min > max` or the bounds are unordered (NaN)
    pub fn is_valid(&self) -> bool {
        self.min <= self.max
    }
}

fn int_key(range: &Option<Range<i32>>) -> String {
    match range {
        Some(r) => format!("{}..{}", r.min, r.max),
        None => "*".to_string(),
    }
}

fn float_key(range: &Option<Range<f64>>) -> String {
    match range {
        Some(r) => format!("{:?}..{:?}", r.min, r.max),
        None => "*".to_string(),
    }
}

fn value_key<T: fmt::Debug>(value: &Option<T>) -> String {
    match value {
        Some(v) => format!("{:?}", v),
        None => "*".to_string(),
    }
}

/// Range constraints over record fields; an absent range leaves the field free
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FilterCriteria {
    /// Allowed pre values
    pub pre_range: Option<Range<i32>>,
    /// Allowed main values
    pub main_range: Option<Range<i32>>,
    /// Allowed post values
    pub post_range: Option<Range<i32>>,
    /// Allowed SNR values
    pub snr_range: Option<Range<f64>>,
}

impl FilterCriteria {
    /// Empty criteria, matching everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Constrain pre to `[min, max]`
    pub fn pre(mut self, min: i32, max: i32) -> Self {
        self.pre_range = Some(Range::new(min, max));
        self
    }

    /// Constrain main to `[min, max]`
    pub fn main(mut self, min: i32, max: i32) -> Self {
        self.main_range = Some(Range::new(min, max));
        self
    }

    /// Constrain post to `[min, max]`
    pub fn post(mut self, min: i32, max: i32) -> Self {
        self.post_range = Some(Range::new(min, max));
        self
    }

    /// Constrain SNR to `[min, max]`
    pub fn snr(mut self, min: f64, max: f64) -> Self {
        self.snr_range = Some(Range::new(min, max));
        self
    }

    /// No range configured on any field
    pub fn is_empty(&self) -> bool {
        !self.has_parameter_filter() && !self.has_snr_filter()
    }

    /// At least one of pre/main/post is constrained
    pub fn has_parameter_filter(&self) -> bool {
        self.pre_range.is_some() || self.main_range.is_some() || self.post_range.is_some()
    }

    /// SNR is constrained
    pub fn has_snr_filter(&self) -> bool {
        self.snr_range.is_some()
    }

    /// Reject any configured range whose lower bound exceeds its upper bound
    pub fn validate(&self) -> Result<()> {
        let int_ranges = [
            (Field::Pre, self.pre_range),
            (Field::Main, self.main_range),
            (Field::Post, self.post_range),
        ];
        for (field, range) in int_ranges {
            if let Some(r) = range {
                if !r.is_valid() {
                    return Err(Error::InvalidCriteria {
                        field,
                        min: f64::from(r.min),
                        max: f64::from(r.max),
                    });
                }
            }
        }
        if let Some(r) = self.snr_range {
            if !r.is_valid() {
                return Err(Error::InvalidCriteria {
                    field: Field::Snr,
                    min: r.min,
                    max: r.max,
                });
            }
        }
        Ok(())
    }

    /// Whether a record lies inside every configured range
    pub fn matches(&self, record: &Record) -> bool {
        self.pre_range.map_or(true, |r| r.contains(record.pre))
            && self.main_range.map_or(true, |r| r.contains(record.main))
            && self.post_range.map_or(true, |r| r.contains(record.post))
            && self.snr_range.map_or(true, |r| r.contains(record.snr))
    }

    /// Deterministic cache key derived from the bounds only
    pub fn canonical_key(&self) -> String {
        format!(
            "filter|pre={}|main={}|post={}|snr={}",
            int_key(&self.pre_range),
            int_key(&self.main_range),
            int_key(&self.post_range),
            float_key(&self.snr_range),
        )
    }
}

impl PartialEq for FilterCriteria {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl Eq for FilterCriteria {}

impl Hash for FilterCriteria {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

impl fmt::Display for FilterCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(r) = self.pre_range {
            parts.push(format!("PRE: [{}, {}]", r.min, r.max));
        }
        if let Some(r) = self.main_range {
            parts.push(format!("MAIN: [{}, {}]", r.min, r.max));
        }
        if let Some(r) = self.post_range {
            parts.push(format!("POST: [{}, {}]", r.min, r.max));
        }
        if let Some(r) = self.snr_range {
            parts.push(format!("SNR: [{}, {}]", r.min, r.max));
        }
        if parts.is_empty() {
            f.write_str("no filter")
        } else {
            f.write_str(&parts.join(" & "))
        }
    }
}

/// How SNR targets are compared
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Every target must equal the field exactly
    #[default]
    Exact,
    /// SNR may differ from its target by up to the tolerance
    Fuzzy,
}

impl SearchMode {
    /// Lowercase mode name
    pub fn name(self) -> &'static str {
        match self {
            SearchMode::Exact => "exact",
            SearchMode::Fuzzy => "fuzzy",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

/// Point targets for a search
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SearchParams {
    /// Target pre value
    pub pre_value: Option<i32>,
    /// Target main value
    pub main_value: Option<i32>,
    /// Target post value
    pub post_value: Option<i32>,
    /// Target SNR value
    pub snr_value: Option<f64>,
    /// Maximum SNR distance in fuzzy mode
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Comparison mode
    #[serde(default)]
    pub mode: SearchMode,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            pre_value: None,
            main_value: None,
            post_value: None,
            snr_value: None,
            tolerance: DEFAULT_TOLERANCE,
            mode: SearchMode::Exact,
        }
    }
}

impl SearchParams {
    /// Parameters with no targets, exact mode and the default tolerance
    pub fn new() -> Self {
        Self::default()
    }

    /// Target a pre value
    pub fn pre(mut self, value: i32) -> Self {
        self.pre_value = Some(value);
        self
    }

    /// Target a main value
    pub fn main(mut self, value: i32) -> Self {
        self.main_value = Some(value);
        self
    }

    /// Target a post value
    pub fn post(mut self, value: i32) -> Self {
        self.post_value = Some(value);
        self
    }

    /// Target an SNR value
    pub fn snr(mut self, value: f64) -> Self {
        self.snr_value = Some(value);
        self
    }

    /// Set the fuzzy SNR tolerance
    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the comparison mode
    pub fn mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// No target value is set
    pub fn is_empty(&self) -> bool {
        !self.has_parameter_search() && !self.has_snr_search()
    }

    /// At least one of pre/main/post is targeted
    pub fn has_parameter_search(&self) -> bool {
        self.pre_value.is_some() || self.main_value.is_some() || self.post_value.is_some()
    }

    /// SNR is targeted
    pub fn has_snr_search(&self) -> bool {
        self.snr_value.is_some()
    }

    /// `[target - tolerance, target + tolerance]` when an SNR target is set
    pub fn snr_window(&self) -> Option<Range<f64>> {
        self.snr_value
            .map(|target| Range::new(target - self.tolerance, target + self.tolerance))
    }

    /// Reject parameters that cannot be executed
    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(Error::EmptySearchParams);
        }
        if self.mode == SearchMode::Fuzzy
            && self.has_snr_search()
            && !(self.tolerance.is_finite() && self.tolerance >= 0.0)
        {
            return Err(Error::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }

    /// Whether a record hits every target under the configured mode
    pub fn matches(&self, record: &Record) -> bool {
        let params_hit = self.pre_value.map_or(true, |v| record.pre == v)
            && self.main_value.map_or(true, |v| record.main == v)
            && self.post_value.map_or(true, |v| record.post == v);
        if !params_hit {
            return false;
        }
        match (self.snr_value, self.mode) {
            (None, _) => true,
            (Some(target), SearchMode::Exact) => record.snr.to_bits() == target.to_bits(),
            (Some(target), SearchMode::Fuzzy) => (record.snr - target).abs() <= self.tolerance,
        }
    }

    /// Deterministic cache key; tolerance only participates when it can matter
    pub fn canonical_key(&self) -> String {
        let mut key = format!(
            "search|{}|pre={}|main={}|post={}|snr={}",
            self.mode,
            value_key(&self.pre_value),
            value_key(&self.main_value),
            value_key(&self.post_value),
            value_key(&self.snr_value),
        );
        if self.mode == SearchMode::Fuzzy && self.has_snr_search() {
            key.push_str(&format!("|tol={:?}", self.tolerance));
        }
        key
    }
}

impl PartialEq for SearchParams {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_key() == other.canonical_key()
    }
}

impl Eq for SearchParams {}

impl Hash for SearchParams {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_key().hash(state);
    }
}

impl fmt::Display for SearchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(v) = self.pre_value {
            parts.push(format!("PRE={}", v));
        }
        if let Some(v) = self.main_value {
            parts.push(format!("MAIN={}", v));
        }
        if let Some(v) = self.post_value {
            parts.push(format!("POST={}", v));
        }
        if let Some(v) = self.snr_value {
            match self.mode {
                SearchMode::Exact => parts.push(format!("SNR={}", v)),
                SearchMode::Fuzzy => parts.push(format!("SNR~{}±{}", v, self.tolerance)),
            }
        }
        if parts.is_empty() {
            f.write_str("no search target")
        } else {
            f.write_str(&parts.join(" & "))
        }
    }
}
