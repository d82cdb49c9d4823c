//! Error types for snrcache

use thiserror::Error;

/// Reasons a cache operation could not be carried out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    /// The cache guard could not be acquired within the configured timeout
    #[error("result cache unavailable")]
    Unavailable,
}
