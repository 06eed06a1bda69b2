//! Generic TTL + LRU + tag-invalidation cache.
//!
//! Backs both process-wide caches named by the data model: the router's
//! decision cache (keyed on query+language, no tags, LRU+TTL only) and the
//! RAG retrieval cache (keyed on collection+query+k+filter, tagged by
//! collection id so a single write invalidates every entry bound to it).
//!
//! Modeled on the hit/miss/expiry bookkeeping in the teacher's former prompt
//! cache, generalized to an arbitrary key/value pair and given real LRU
//! eviction and tag-scoped invalidation, neither of which the prompt cache
//! needed.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::hash::Hash;
use tokio::sync::RwLock;

struct Entry<V> {
    value: V,
    created_at: DateTime<Utc>,
    /// Monotonically increasing counter; highest = most recently used.
    last_used: u64,
    tag: Option<String>,
}

struct Inner<K, V> {
    entries: HashMap<K, Entry<V>>,
    clock: u64,
}

/// Cache statistics, exposed for observability.
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// A bounded, TTL-expiring, LRU-evicting, tag-invalidatable cache.
///
/// Guarded by a single `RwLock`: reads (`get`) take a read lock unless they
/// need to evict an expired entry, writes (`put`, `invalidate_tag`, `clear`)
/// take a write lock. This matches the router cache's "reader/writer lock,
/// single-writer LRU eviction" requirement and the retrieval cache's
/// "mutation acquires a write lock that invalidates all bound entries
/// atomically" requirement.
pub struct TtlLruCache<K, V> {
    inner: RwLock<Inner<K, V>>,
    stats: RwLock<CacheStats>,
    ttl: Duration,
    max_entries: usize,
}

impl<K, V> TtlLruCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl_seconds: i64, max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: HashMap::new(),
                clock: 0,
            }),
            stats: RwLock::new(CacheStats::default()),
            ttl: Duration::seconds(ttl_seconds.max(0)),
            max_entries: max_entries.max(1),
        }
    }

    /// Look up a key. Returns `None` on miss or expiry, bumping recency on hit.
    pub async fn get(&self, key: &K) -> Option<V> {
        let mut inner = self.inner.write().await;
        inner.clock += 1;
        let clock = inner.clock;
        let ttl = self.ttl;

        let hit = match inner.entries.get_mut(key) {
            Some(entry) if Utc::now() - entry.created_at <= ttl => {
                entry.last_used = clock;
                Some(entry.value.clone())
            }
            Some(_) => {
                inner.entries.remove(key);
                None
            }
            None => None,
        };

        let mut stats = self.stats.write().await;
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Insert or overwrite a key, evicting the least-recently-used entry if
    /// the cache is at capacity. `tag` is carried for later bulk invalidation
    /// (e.g. the owning vector-store collection id); pass `None` for caches
    /// with no tag-based invalidation need (e.g. the router cache).
    pub async fn put(&self, key: K, value: V, tag: Option<String>) {
        let mut inner = self.inner.write().await;
        inner.clock += 1;
        let clock = inner.clock;

        if !inner.entries.contains_key(&key) && inner.entries.len() >= self.max_entries {
            if let Some(lru_key) = inner
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| k.clone())
            {
                inner.entries.remove(&lru_key);
                drop(inner);
                let mut stats = self.stats.write().await;
                stats.evictions += 1;
                inner = self.inner.write().await;
            }
        }

        inner.entries.insert(
            key,
            Entry {
                value,
                created_at: Utc::now(),
                last_used: clock,
                tag,
            },
        );
    }

    /// Drop every entry carrying the given tag. Used to invalidate all
    /// retrieval-cache entries bound to a collection after `AddChunks` or
    /// `DeleteByFilter` mutates it (property P6).
    pub async fn invalidate_tag(&self, tag: &str) {
        let mut inner = self.inner.write().await;
        let before = inner.entries.len();
        inner.entries.retain(|_, e| e.tag.as_deref() != Some(tag));
        let removed = before - inner.entries.len();

        if removed > 0 {
            let mut stats = self.stats.write().await;
            stats.invalidations += removed as u64;
        }
    }

    pub async fn clear(&self) {
        let mut inner = self.inner.write().await;
        inner.entries.clear();
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn stats(&self) -> CacheStats {
        self.stats.read().await.clone()
    }
}

/// Build a stable hash-based cache key from an arbitrary number of string
/// parts. Used for the router cache (`query + language`) and the retrieval
/// cache (`collection + query + k + filter`).
pub fn hash_key(parts: &[&str]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    for p in parts {
        hasher.update(p.as_bytes());
        hasher.update(b"\0");
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn miss_then_hit() {
        let cache: TtlLruCache<String, i32> = TtlLruCache::new(3600, 10);
        assert_eq!(cache.get(&"a".to_string()).await, None);
        cache.put("a".to_string(), 1, None).await;
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn ttl_expiry() {
        let cache: TtlLruCache<String, i32> = TtlLruCache::new(0, 10);
        cache.put("a".to_string(), 1, None).await;
        // TTL of 0 means any elapsed time expires the entry.
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert_eq!(cache.get(&"a".to_string()).await, None);
    }

    #[tokio::test]
    async fn lru_eviction_at_capacity() {
        let cache: TtlLruCache<String, i32> = TtlLruCache::new(3600, 2);
        cache.put("a".to_string(), 1, None).await;
        cache.put("b".to_string(), 2, None).await;
        // touch "a" so "b" becomes least-recently-used
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        cache.put("c".to_string(), 3, None).await;

        assert_eq!(cache.get(&"b".to_string()).await, None);
        assert_eq!(cache.get(&"a".to_string()).await, Some(1));
        assert_eq!(cache.get(&"c".to_string()).await, Some(3));
    }

    #[tokio::test]
    async fn tag_invalidation() {
        let cache: TtlLruCache<String, i32> = TtlLruCache::new(3600, 10);
        cache
            .put("q1".to_string(), 1, Some("coll-a".to_string()))
            .await;
        cache
            .put("q2".to_string(), 2, Some("coll-b".to_string()))
            .await;

        cache.invalidate_tag("coll-a").await;

        assert_eq!(cache.get(&"q1".to_string()).await, None);
        assert_eq!(cache.get(&"q2".to_string()).await, Some(2));
    }

    #[test]
    fn hash_key_is_deterministic_and_sensitive_to_parts() {
        let a = hash_key(&["weather", "macau"]);
        let b = hash_key(&["weather", "macau"]);
        let c = hash_key(&["weather", "lisbon"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
