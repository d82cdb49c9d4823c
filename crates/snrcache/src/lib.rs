//! # snrcache
//!
//! Bounded result cache shared by the SnrScope filter and search engines.
//!
//! ## Architecture
//! - **HashMap**: AHash for fast lookups (O(1))
//! - **LRU List**: Doubly-linked list for eviction (O(1))
//! - **Guard**: one mutex around the list, taken with a timeout so a stuck
//!   cache degrades to uncached queries instead of blocking them
//!
//! Keys are canonical query strings; values are opaque to the cache.

#![warn(missing_docs)]

mod cache;
mod error;
mod lru;
mod stats;

pub use cache::{HeldGuard, ResultCache, DEFAULT_CAPACITY, DEFAULT_LOCK_TIMEOUT};
pub use error::CacheError;
pub use lru::LruCache;
pub use stats::{CacheStats, StatsSnapshot};
