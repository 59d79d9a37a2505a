//! In-memory cache for origin responses
//!
//! This module provides a bounded store keyed by resource identity with a
//! per-entry TTL. Expired entries are kept (until evicted or cleared) and can
//! still be read explicitly, which lets the fetcher serve stale data when the
//! origin is unavailable.

mod entry;
mod lru;
mod store;

pub use entry::{CacheEntry, CacheKey};
pub use store::{CacheStats, CacheStore, DEFAULT_MAX_ENTRIES};
