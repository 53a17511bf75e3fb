use crate::key::CacheKey;
use lru::LruCache;

#[derive(Debug, Clone)]
pub(crate) struct MemoryEntry<T> {
    pub data: T,
    pub expires_at_ms: u64,
    pub size_bytes: u64,
}

/// In-process LRU bounded by the serialized size of its entries
#[derive(Debug)]
pub(crate) struct MemoryTier<T> {
    entries: LruCache<CacheKey, MemoryEntry<T>>,
    bytes: u64,
    max_bytes: u64,
}

impl<T: Clone> MemoryTier<T> {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
            max_bytes,
        }
    }

    /// Live entry for `key`; an expired one is dropped on the spot
    pub fn get(&mut self, key: &CacheKey, now_ms: u64) -> Lookup<T> {
        let Some(entry) = self.entries.get(key) else {
            return Lookup::Missing;
        };
        if entry.expires_at_ms <= now_ms {
            self.remove(key);
            return Lookup::Expired;
        }
        Lookup::Hit(entry.data.clone())
    }

    /// Insert and evict least recently used entries past the byte ceiling.
    /// Returns the number of evictions.
    pub fn insert(&mut self, key: CacheKey, entry: MemoryEntry<T>) -> usize {
        self.remove(&key);
        if entry.size_bytes > self.max_bytes {
            return 0;
        }
        self.bytes += entry.size_bytes;
        self.entries.put(key, entry);

        let mut evicted = 0;
        while self.bytes > self.max_bytes {
            let Some((_, old)) = self.entries.pop_lru() else {
                break;
            };
            self.bytes = self.bytes.saturating_sub(old.size_bytes);
            evicted += 1;
        }
        evicted
    }

    pub fn remove(&mut self, key: &CacheKey) -> bool {
        match self.entries.pop(key) {
            Some(old) => {
                self.bytes = self.bytes.saturating_sub(old.size_bytes);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Lookup<T> {
    Hit(T),
    Expired,
    Missing,
}

#[cfg(test)]
mod tests {
    use super::*;
    use context_protocol::Fingerprint;
    use pretty_assertions::assert_eq;

    fn key(n: u8) -> CacheKey {
        CacheKey::new(&n.to_string(), &[Fingerprint::of([n])])
    }

    fn entry(data: &str, size_bytes: u64) -> MemoryEntry<String> {
        MemoryEntry {
            data: data.to_string(),
            expires_at_ms: 1_000,
            size_bytes,
        }
    }

    #[test]
    fn evicts_least_recently_used_past_byte_ceiling() {
        let mut tier = MemoryTier::new(100);
        tier.insert(key(1), entry("one", 40));
        tier.insert(key(2), entry("two", 40));
        assert_eq!(tier.get(&key(1), 0), Lookup::Hit("one".to_string()));
        assert_eq!(tier.insert(key(3), entry("three", 40)), 1);

        assert_eq!(tier.get(&key(2), 0), Lookup::Missing);
        assert_eq!(tier.get(&key(1), 0), Lookup::Hit("one".to_string()));
        assert_eq!(tier.bytes(), 80);
    }

    #[test]
    fn expired_entries_are_dropped_on_read() {
        let mut tier = MemoryTier::new(100);
        tier.insert(key(1), entry("one", 10));
        assert_eq!(tier.get(&key(1), 1_000), Lookup::Expired);
        assert_eq!(tier.len(), 0);
        assert_eq!(tier.bytes(), 0);
    }

    #[test]
    fn oversized_entries_are_not_kept() {
        let mut tier = MemoryTier::new(10);
        tier.insert(key(1), entry("big", 11));
        assert_eq!(tier.len(), 0);
    }
}
