//! Error types for snrfilter

use std::io;
use thiserror::Error;

use crate::criteria::Field;

/// Result type alias for snrfilter operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for filter and search operations
#[derive(Debug, Error)]
pub enum Error {
    /// A configured range has `min > max` (or a NaN bound)
    #[error("invalid {field} range: min {min} is greater than max {max}")]
    InvalidCriteria {
        /// Field carrying the bad range
        field: Field,
        /// Lower bound as supplied
        min: f64,
        /// Upper bound as supplied
        max: f64,
    },

    /// A search was submitted without any target value
    #[error("search parameters have no target value set")]
    EmptySearchParams,

    /// Tolerance is negative or not finite
    #[error("invalid SNR tolerance: {0}")]
    InvalidTolerance(f64),

    /// Unexpected fault while scanning
    #[error("scan failed: {0}")]
    ScanFailure(String),

    /// The scan was cancelled before it completed
    #[error("scan cancelled")]
    Cancelled,

    /// The shared result cache could not be used
    #[error("result cache unavailable")]
    CacheUnavailable,

    /// Export path has no supported extension
    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    /// JSON has no encoding for NaN or infinite SNR values
    #[error("record {row} has non-finite SNR {value}; export to CSV instead")]
    NonFiniteSnr {
        /// Zero-based position in the exported result set
        row: usize,
        /// The offending value
        value: f64,
    },

    /// Engine configuration is unusable
    #[error("invalid configuration: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// CSV encoding error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error was caused by the caller's input rather than the engine
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidCriteria { .. }
                | Error::EmptySearchParams
                | Error::InvalidTolerance(_)
                | Error::NonFiniteSnr { .. }
                | Error::UnsupportedFormat(_)
        )
    }
}

impl From<snrcache::CacheError> for Error {
    fn from(_: snrcache::CacheError) -> Self {
        Error::CacheUnavailable
    }
}
