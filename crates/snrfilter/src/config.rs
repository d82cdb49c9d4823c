//! Engine configuration
//!
//! Passed explicitly to each engine constructor. Loaded from JSON, every field
//! optional:
//! ```json
//! {
//!   "cache":    { "capacity": 100, "enabled": true, "lock_timeout_ms": 50 },
//!   "search":   { "history_limit": 50, "max_suggestions": 10, "default_tolerance": 1e-6 },
//!   "dispatch": { "workers": 2, "cancel_check_interval": 4096 }
//! }
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::criteria::DEFAULT_TOLERANCE;
use crate::error::{Error, Result};

/// Result cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum cached result sets
    pub capacity: usize,
    /// When false every query scans
    pub enabled: bool,
    /// How long to wait for the cache guard before scanning uncached
    pub lock_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: snrcache::DEFAULT_CAPACITY,
            enabled: true,
            lock_timeout_ms: 50,
        }
    }
}

impl CacheConfig {
    /// Lock timeout as a `Duration`
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

/// Search engine settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Searches remembered in history
    pub history_limit: usize,
    /// Completions returned per request
    pub max_suggestions: usize,
    /// Tolerance used when the caller does not set one
    pub default_tolerance: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            history_limit: 50,
            max_suggestions: 10,
            default_tolerance: DEFAULT_TOLERANCE,
        }
    }
}

/// Worker pool settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Scans allowed to run at once
    pub workers: usize,
    /// Records scanned between cancellation checks
    pub cancel_check_interval: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            cancel_check_interval: 4096,
        }
    }
}

/// Full engine configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Result cache
    pub cache: CacheConfig,
    /// Search engine
    pub search: SearchConfig,
    /// Worker pool
    pub dispatch: DispatchConfig,
}

impl EngineConfig {
    /// Parse a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Reject settings the engines cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.cache.capacity == 0 {
            return Err(Error::Config("cache.capacity must be greater than 0".into()));
        }
        if self.search.history_limit == 0 {
            return Err(Error::Config("search.history_limit must be greater than 0".into()));
        }
        if self.dispatch.workers == 0 {
            return Err(Error::Config("dispatch.workers must be greater than 0".into()));
        }
        if self.dispatch.cancel_check_interval == 0 {
            return Err(Error::Config(
                "dispatch.cancel_check_interval must be greater than 0".into(),
            ));
        }
        let tol = self.search.default_tolerance;
        if !(tol.is_finite() && tol >= 0.0) {
            return Err(Error::Config(format!(
                "search.default_tolerance must be a non-negative number, got {}",
                tol
            )));
        }
        Ok(())
    }
}
