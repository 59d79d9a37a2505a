//! Bounded in-memory store for origin responses
//!
//! Provides a `CacheStore` that keeps up to `max_entries` responses with a
//! per-entry TTL. Expiry is judged lazily at read time; expired entries stay
//! readable through [`CacheStore::get_allowing_stale`] so callers can fall
//! back to old data when the origin is unavailable.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::debug;

use super::entry::{CacheEntry, CacheKey};
use super::lru::LruTracker;

/// Default maximum number of entries held by a store
pub const DEFAULT_MAX_ENTRIES: usize = 512;

/// Counters describing how the store has been used since creation or the last `clear`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads that found an entry within its TTL
    pub fresh_hits: u64,
    /// Reads that found an entry past its TTL
    pub stale_reads: u64,
    /// Reads that found nothing
    pub misses: u64,
    /// Writes of a key that was not present
    pub inserts: u64,
    /// Entries dropped to make room for new keys
    pub evictions: u64,
}

/// A stored entry together with its freshness deadline
#[derive(Debug)]
struct Slot {
    entry: CacheEntry,
    expires_at: Instant,
}

impl Slot {
    fn new(entry: CacheEntry, ttl: Duration) -> Self {
        Self {
            entry,
            expires_at: deadline(ttl),
        }
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

fn deadline(ttl: Duration) -> Instant {
    let now = Instant::now();
    // A TTL too large to represent never expires in practice
    now.checked_add(ttl)
        .unwrap_or_else(|| now + Duration::from_secs(u32::MAX as u64))
}

#[derive(Debug, Default)]
struct Inner {
    slots: HashMap<CacheKey, Slot>,
    lru: LruTracker<CacheKey>,
    stats: CacheStats,
}

/// Thread-safe, entry-count-bounded cache of origin responses
///
/// Reads and writes take a short internal lock and never hold it across an
/// `.await`, so concurrent fetches of different keys proceed independently.
/// When a new key is inserted into a full store, the least recently used
/// entry is evicted. Updating an existing key never evicts.
#[derive(Debug)]
pub struct CacheStore {
    inner: Mutex<Inner>,
    max_entries: usize,
}

impl CacheStore {
    /// Creates an empty store holding at most `max_entries` entries
    ///
    /// A capacity of zero is raised to one.
    pub fn new(max_entries: usize) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            max_entries: max_entries.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // Every critical section leaves the maps consistent, so a poisoned
        // lock still guards valid data.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Returns the entry for `key` only if it is still within its TTL
    pub fn get(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let entry = inner
            .slots
            .get(key)
            .filter(|slot| slot.is_fresh(now))
            .map(|slot| slot.entry.clone());

        match entry {
            Some(entry) => {
                inner.stats.fresh_hits += 1;
                inner.lru.touch(key);
                Some(entry)
            }
            None => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Returns the entry for `key` regardless of whether its TTL has elapsed
    pub fn get_allowing_stale(&self, key: &CacheKey) -> Option<CacheEntry> {
        let now = Instant::now();
        let mut guard = self.lock();
        let inner = &mut *guard;

        let Some((entry, fresh)) = inner
            .slots
            .get(key)
            .map(|slot| (slot.entry.clone(), slot.is_fresh(now)))
        else {
            inner.stats.misses += 1;
            return None;
        };

        if fresh {
            inner.stats.fresh_hits += 1;
        } else {
            inner.stats.stale_reads += 1;
        }
        inner.lru.touch(key);
        Some(entry)
    }

    /// Time left before `key` expires; zero when expired or absent
    ///
    /// Does not count as an access for eviction purposes.
    pub fn remaining_freshness(&self, key: &CacheKey) -> Duration {
        let now = Instant::now();
        self.lock()
            .slots
            .get(key)
            .map(|slot| slot.remaining(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Stores `entry` under `key`, fresh for `ttl` starting now
    ///
    /// Replaces any existing entry for the key and restarts its TTL clock.
    pub fn set(&self, key: CacheKey, entry: CacheEntry, ttl: Duration) {
        let mut guard = self.lock();
        let inner = &mut *guard;

        if !inner.slots.contains_key(&key) {
            while inner.slots.len() >= self.max_entries {
                let Some(oldest) = inner.lru.pop_oldest() else {
                    break;
                };
                inner.slots.remove(&oldest);
                inner.stats.evictions += 1;
                debug!(key = %oldest, "evicted least recently used cache entry");
            }
            inner.stats.inserts += 1;
        }

        inner.lru.touch(&key);
        inner.slots.insert(key, Slot::new(entry, ttl));
    }

    /// Restarts the TTL clock of `key` after the origin answered 304 to a
    /// request carrying `validator`
    ///
    /// Applies only while the stored entry still carries `validator` as its
    /// ETag. The payload is never written; new validators from the 304 replace
    /// the stored ones. Returns the refreshed entry, or `None` if the key is
    /// absent or now holds a different version.
    pub fn revalidate(
        &self,
        key: &CacheKey,
        validator: &str,
        etag: Option<String>,
        last_modified: Option<String>,
        ttl: Duration,
    ) -> Option<CacheEntry> {
        let mut guard = self.lock();
        let inner = &mut *guard;

        let slot = inner
            .slots
            .get_mut(key)
            .filter(|slot| slot.entry.etag.as_deref() == Some(validator))?;

        if etag.is_some() {
            slot.entry.etag = etag;
        }
        if last_modified.is_some() {
            slot.entry.last_modified = last_modified;
        }
        slot.entry.status = Some(304);
        slot.entry.cached_at = Utc::now();
        slot.expires_at = deadline(ttl);

        let entry = slot.entry.clone();
        inner.lru.touch(key);
        Some(entry)
    }

    /// Records the upstream status of a failed refresh on the entry that was
    /// served stale, without touching its payload or TTL clock
    ///
    /// Applies only while the stored entry is still `served` and still past
    /// its TTL, so an entry refreshed in the meantime keeps its own status.
    /// Returns whether the status was recorded.
    pub fn record_status(&self, key: &CacheKey, served: &CacheEntry, status: Option<u16>) -> bool {
        let now = Instant::now();
        match self.lock().slots.get_mut(key) {
            Some(slot)
                if !slot.is_fresh(now) && Arc::ptr_eq(&slot.entry.payload, &served.payload) =>
            {
                slot.entry.status = status;
                true
            }
            _ => false,
        }
    }

    /// Removes every entry and resets the counters
    pub fn clear(&self) {
        let mut guard = self.lock();
        let inner = &mut *guard;
        inner.slots.clear();
        inner.lru.clear();
        inner.stats = CacheStats::default();
    }

    pub fn len(&self) -> usize {
        self.lock().slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}
