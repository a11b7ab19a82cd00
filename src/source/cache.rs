//! Output cache so tool results can feed later tool calls

use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;

/// A cached tool output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub file_name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl CachedFile {
    pub fn new(file_name: impl Into<String>, mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            mime_type: mime_type.into(),
            data,
        }
    }
}

struct Entries {
    lru: LruCache<String, CachedFile>,
    total_bytes: usize,
}

/// LRU cache of outputs bounded by entry count and total payload bytes
pub struct OutputCache {
    entries: Mutex<Entries>,
    max_bytes: usize,
}

impl OutputCache {
    pub fn new(max_entries: usize, max_bytes: usize) -> Self {
        let max_entries = NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: Mutex::new(Entries {
                lru: LruCache::new(max_entries),
                total_bytes: 0,
            }),
            max_bytes,
        }
    }

    /// Store a file under `key`.
    /// Files larger than the whole byte budget are not stored; returns whether it was kept.
    pub fn put(&self, key: String, file: CachedFile) -> bool {
        let size = file.data.len();
        if size > self.max_bytes {
            tracing::debug!(size, max = self.max_bytes, "output too large to cache");
            return false;
        }

        let mut entries = self.entries.lock();

        if let Some(previous) = entries.lru.pop(&key) {
            entries.total_bytes = entries.total_bytes.saturating_sub(previous.data.len());
        }

        while entries.total_bytes + size > self.max_bytes {
            match entries.lru.pop_lru() {
                Some((_, evicted)) => {
                    entries.total_bytes = entries.total_bytes.saturating_sub(evicted.data.len());
                }
                None => break,
            }
        }

        // `push` reports the entry dropped by the count limit, which still owns bytes
        if let Some((evicted_key, evicted)) = entries.lru.push(key.clone(), file) {
            if evicted_key != key {
                entries.total_bytes = entries.total_bytes.saturating_sub(evicted.data.len());
            }
        }
        entries.total_bytes += size;
        true
    }

    /// Insert under a fresh key and return it
    pub fn insert(&self, file: CachedFile) -> Option<String> {
        let key = self.fresh_key();
        self.put(key.clone(), file).then_some(key)
    }

    pub fn get(&self, key: &str) -> Option<CachedFile> {
        self.entries.lock().lru.get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().lru.contains(key)
    }

    pub fn remove(&self, key: &str) -> Option<CachedFile> {
        let mut entries = self.entries.lock();
        let removed = entries.lru.pop(key)?;
        entries.total_bytes = entries.total_bytes.saturating_sub(removed.data.len());
        Some(removed)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().lru.is_empty()
    }

    pub fn total_bytes(&self) -> usize {
        self.entries.lock().total_bytes
    }

    /// A UUID v4 key not currently in use
    pub fn fresh_key(&self) -> String {
        let entries = self.entries.lock();
        loop {
            let key = uuid::Uuid::new_v4().to_string();
            if !entries.lru.contains(&key) {
                return key;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pdf(len: usize) -> CachedFile {
        CachedFile::new("out.pdf", "application/pdf", vec![0u8; len])
    }

    #[test]
    fn test_put_and_get() {
        let cache = OutputCache::new(10, 1024);
        assert!(cache.is_empty());

        assert!(cache.put("a".to_string(), pdf(3)));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.total_bytes(), 3);

        let file = cache.get("a").unwrap();
        assert_eq!(file.file_name, "out.pdf");
        assert_eq!(file.mime_type, "application/pdf");
        assert!(!cache.contains("b"));
    }

    #[test]
    fn test_entry_limit_evicts_lru_and_its_bytes() {
        let cache = OutputCache::new(2, 1024);
        cache.put("a".to_string(), pdf(10));
        cache.put("b".to_string(), pdf(10));
        cache.put("c".to_string(), pdf(10));

        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
        assert!(cache.contains("c"));
        assert_eq!(cache.total_bytes(), 20);
    }

    #[test]
    fn test_byte_budget_eviction() {
        let cache = OutputCache::new(10, 100);
        cache.put("a".to_string(), pdf(30));
        cache.put("b".to_string(), pdf(30));
        cache.put("c".to_string(), pdf(30));
        cache.put("d".to_string(), pdf(30));

        assert!(!cache.contains("a"));
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.total_bytes(), 90);
    }

    #[test]
    fn test_oversized_rejected() {
        let cache = OutputCache::new(10, 50);
        assert!(!cache.put("huge".to_string(), pdf(100)));
        assert!(cache.is_empty());
        assert_eq!(cache.insert(pdf(100)), None);
    }

    #[test]
    fn test_replace_same_key() {
        let cache = OutputCache::new(10, 1024);
        cache.put("a".to_string(), pdf(50));
        cache.put("a".to_string(), pdf(30));
        assert_eq!(cache.total_bytes(), 30);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_insert_and_remove() {
        let cache = OutputCache::new(10, 1024);
        let key = cache.insert(pdf(5)).unwrap();
        assert_eq!(key.len(), 36);
        assert_eq!(cache.remove(&key).map(|f| f.data.len()), Some(5));
        assert_eq!(cache.total_bytes(), 0);
    }
}
