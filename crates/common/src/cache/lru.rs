//! Byte-accounted LRU bookkeeping behind [`ObjectCache`](super::ObjectCache).
//!
//! Not synchronized; the cache owns it behind a mutex.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use super::{CacheKey, CachedValue};

struct Slot {
    value: CachedValue,
    size: usize,
    tick: u64,
    last_access: Instant,
}

/// Outcome of an insertion attempt.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Admission {
    Stored { evicted: Vec<CacheKey> },
    Rejected,
}

pub(crate) struct LruIndex {
    budget: usize,
    used: usize,
    tick: u64,
    entries: HashMap<CacheKey, Slot>,
    // tick -> key, oldest first
    order: BTreeMap<u64, CacheKey>,
}

impl LruIndex {
    pub fn new(budget: usize) -> Self {
        Self {
            budget,
            used: 0,
            tick: 0,
            entries: HashMap::new(),
            order: BTreeMap::new(),
        }
    }

    fn next_tick(&mut self) -> u64 {
        self.tick += 1;
        self.tick
    }

    /// Look up a key, marking it most recently used.
    pub fn get(&mut self, key: &CacheKey) -> Option<CachedValue> {
        let tick = self.next_tick();
        let slot = self.entries.get_mut(key)?;
        self.order.remove(&slot.tick);
        slot.tick = tick;
        slot.last_access = Instant::now();
        self.order.insert(tick, key.clone());
        Some(slot.value.clone())
    }

    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert a value, evicting least recently used entries until it fits.
    ///
    /// A value larger than the whole budget is rejected without touching any
    /// other entry. A stale value under the same key is dropped either way.
    pub fn insert(&mut self, key: CacheKey, value: CachedValue, size: usize) -> Admission {
        self.remove(&key);
        if self.budget == 0 || size > self.budget {
            return Admission::Rejected;
        }

        let mut evicted = Vec::new();
        while self.used + size > self.budget {
            let Some((_, oldest)) = self.order.pop_first() else {
                break;
            };
            if let Some(slot) = self.entries.remove(&oldest) {
                self.used -= slot.size;
            }
            evicted.push(oldest);
        }

        let tick = self.next_tick();
        self.order.insert(tick, key.clone());
        self.entries.insert(
            key,
            Slot {
                value,
                size,
                tick,
                last_access: Instant::now(),
            },
        );
        self.used += size;

        Admission::Stored { evicted }
    }

    pub fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.remove(key) {
            Some(slot) => {
                self.order.remove(&slot.tick);
                self.used -= slot.size;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.used = 0;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn used_bytes(&self) -> usize {
        self.used
    }

    /// Time since the least recently used entry was last touched.
    pub fn oldest_access(&self) -> Option<Instant> {
        self.order
            .first_key_value()
            .and_then(|(_, key)| self.entries.get(key))
            .map(|slot| slot.last_access)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn value(n: u32) -> CachedValue {
        Arc::new(n)
    }

    fn key(s: &str) -> CacheKey {
        CacheKey::from(s)
    }

    #[test]
    fn test_evicts_least_recently_used() {
        let mut lru = LruIndex::new(300);
        lru.insert(key("a"), value(1), 100);
        lru.insert(key("b"), value(2), 100);
        lru.insert(key("c"), value(3), 100);

        // touch "a" so "b" becomes the oldest
        assert!(lru.get(&key("a")).is_some());

        let admission = lru.insert(key("d"), value(4), 100);
        assert_eq!(
            admission,
            Admission::Stored {
                evicted: vec![key("b")]
            }
        );
        assert!(lru.contains(&key("a")));
        assert!(!lru.contains(&key("b")));
        assert_eq!(lru.used_bytes(), 300);
    }

    #[test]
    fn test_oversized_entry_evicts_nothing() {
        let mut lru = LruIndex::new(10);
        lru.insert(key("small"), value(1), 5);

        assert_eq!(lru.insert(key("big"), value(2), 11), Admission::Rejected);
        assert!(lru.contains(&key("small")));
        assert!(!lru.contains(&key("big")));
        assert_eq!(lru.used_bytes(), 5);
    }

    #[test]
    fn test_replacing_a_key_reaccounts_size() {
        let mut lru = LruIndex::new(100);
        lru.insert(key("a"), value(1), 60);
        lru.insert(key("a"), value(2), 30);
        assert_eq!(lru.len(), 1);
        assert_eq!(lru.used_bytes(), 30);

        // an oversized replacement drops the stale value
        assert_eq!(lru.insert(key("a"), value(3), 101), Admission::Rejected);
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.used_bytes(), 0);
    }

    #[test]
    fn test_zero_budget_retains_nothing() {
        let mut lru = LruIndex::new(0);
        assert_eq!(lru.insert(key("a"), value(1), 0), Admission::Rejected);
        assert_eq!(lru.len(), 0);
    }

    #[test]
    fn test_remove_and_clear() {
        let mut lru = LruIndex::new(100);
        lru.insert(key("a"), value(1), 10);
        lru.insert(key("b"), value(2), 10);
        assert!(lru.remove(&key("a")));
        assert!(!lru.remove(&key("a")));
        assert_eq!(lru.used_bytes(), 10);
        assert!(lru.oldest_access().is_some());

        lru.clear();
        assert_eq!(lru.len(), 0);
        assert_eq!(lru.used_bytes(), 0);
        assert!(lru.oldest_access().is_none());
    }
}
