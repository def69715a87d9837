//! Bounded TTL result cache for warehouse reads.
//!
//! Entries are atomic at key granularity; a concurrent miss may execute the
//! same query twice but can never corrupt an entry. Eviction is LRU once the
//! capacity bound is hit, after expired entries have been dropped.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::Row;

#[derive(Clone)]
struct CacheEntry {
    rows: Arc<Vec<Row>>,
    inserted_at: Instant,
    last_access: Instant,
}

/// Cache counters exposed via `GET /cache/stats`.
#[derive(Debug, Clone, Serialize, utoipa::ToSchema)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

pub struct ResultCache {
    entries: DashMap<String, CacheEntry>,
    capacity: usize,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResultCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<Vec<Row>>> {
        if let Some(mut entry) = self.entries.get_mut(key) {
            if entry.inserted_at.elapsed() > self.ttl {
                drop(entry);
                self.entries.remove(key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            entry.last_access = Instant::now();
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(Arc::clone(&entry.rows));
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, key: String, rows: Arc<Vec<Row>>) {
        if self.entries.len() >= self.capacity {
            self.evict();
        }
        let now = Instant::now();
        self.entries
            .insert(key, CacheEntry { rows, inserted_at: now, last_access: now });
    }

    /// Drop expired entries, then least-recently-used ones until under
    /// capacity.
    fn evict(&self) {
        let expired: Vec<String> = self
            .entries
            .iter()
            .filter(|e| e.inserted_at.elapsed() > self.ttl)
            .map(|e| e.key().clone())
            .collect();
        for key in expired {
            if self.entries.remove(&key).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        while self.entries.len() >= self.capacity {
            let lru = self
                .entries
                .iter()
                .min_by_key(|e| e.last_access)
                .map(|e| e.key().clone());
            match lru {
                Some(key) => {
                    if self.entries.remove(&key).is_some() {
                        self.evictions.fetch_add(1, Ordering::Relaxed);
                    }
                },
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.capacity,
            ttl_seconds: self.ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(v: i64) -> Row {
        let mut m = Row::new();
        m.insert("v".to_string(), json!(v));
        m
    }

    #[test]
    fn hit_after_insert_within_ttl() {
        let cache = ResultCache::new(10, Duration::from_secs(60));
        cache.insert("k".into(), Arc::new(vec![row(1)]));
        assert!(cache.get("k").is_some());
        assert!(cache.get("other").is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn expired_entries_are_dropped() {
        let cache = ResultCache::new(10, Duration::from_millis(0));
        cache.insert("k".into(), Arc::new(vec![row(1)]));
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("k").is_none());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn lru_eviction_on_overflow() {
        let cache = ResultCache::new(2, Duration::from_secs(60));
        cache.insert("a".into(), Arc::new(vec![row(1)]));
        std::thread::sleep(Duration::from_millis(2));
        cache.insert("b".into(), Arc::new(vec![row(2)]));
        std::thread::sleep(Duration::from_millis(2));
        // Touch "a" so "b" becomes the LRU entry.
        assert!(cache.get("a").is_some());
        cache.insert("c".into(), Arc::new(vec![row(3)]));

        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }
}
