//! Recency ordering for cache eviction

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

/// Tracks access order of keys so the least recently used one can be found
/// without scanning every entry.
///
/// Each touch stamps the key with a monotonically increasing tick; the
/// smallest tick in `order` is always the eviction candidate.
#[derive(Debug)]
pub struct LruTracker<K> {
    tick: u64,
    ticks: HashMap<K, u64>,
    order: BTreeMap<u64, K>,
}

impl<K: Clone + Eq + Hash> LruTracker<K> {
    pub fn new() -> Self {
        Self {
            tick: 0,
            ticks: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    /// Marks `key` as the most recently used, inserting it if unknown
    pub fn touch(&mut self, key: &K) {
        self.tick += 1;
        if let Some(old) = self.ticks.insert(key.clone(), self.tick) {
            self.order.remove(&old);
        }
        self.order.insert(self.tick, key.clone());
    }

    pub fn remove(&mut self, key: &K) {
        if let Some(old) = self.ticks.remove(key) {
            self.order.remove(&old);
        }
    }

    /// Removes and returns the least recently used key
    pub fn pop_oldest(&mut self) -> Option<K> {
        let (_, key) = self.order.pop_first()?;
        self.ticks.remove(&key);
        Some(key)
    }

    pub fn clear(&mut self) {
        self.ticks.clear();
        self.order.clear();
    }
}

impl<K: Clone + Eq + Hash> Default for LruTracker<K> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pop_oldest_follows_touch_order() {
        let mut lru = LruTracker::new();
        lru.touch(&"a");
        lru.touch(&"b");
        lru.touch(&"c");
        lru.touch(&"a");

        assert_eq!(lru.pop_oldest(), Some("b"));
        assert_eq!(lru.pop_oldest(), Some("c"));
        assert_eq!(lru.pop_oldest(), Some("a"));
        assert_eq!(lru.pop_oldest(), None);
    }

    #[test]
    fn test_remove_drops_key_from_order() {
        let mut lru = LruTracker::new();
        lru.touch(&1);
        lru.touch(&2);
        lru.remove(&1);

        assert_eq!(lru.pop_oldest(), Some(2));
        assert_eq!(lru.pop_oldest(), None);
    }
}
