//! In-memory response cache with per-entry TTL.
//!
//! Entries expire lazily on read and proactively on `sweep()`, which
//! runs whenever the entry count crosses the soft limit or on the
//! owner's periodic timer. A second last-known-good tier (written on
//! every `set`, never TTL-expired) backs the fetcher's fallback path.

use log::debug;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::interval;

/// Cache entry with TTL and access tracking
#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    stored_at: Instant,
    last_accessed: Instant,
    access_count: u64,
    ttl: Duration,
}

impl CacheEntry {
    fn new(value: Value, ttl: Duration) -> Self {
        let now = Instant::now();
        Self {
            value,
            stored_at: now,
            last_accessed: now,
            access_count: 0,
            ttl,
        }
    }

    fn is_expired(&self) -> bool {
        self.stored_at.elapsed() >= self.ttl
    }

    fn access(&mut self) -> &Value {
        self.last_accessed = Instant::now();
        self.access_count += 1;
        &self.value
    }
}

/// Cache hit/miss statistics
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

impl CacheStats {
    fn calculate_hit_rate(&mut self) {
        self.hit_rate = if self.hits + self.misses > 0 {
            self.hits as f64 / (self.hits + self.misses) as f64
        } else {
            0.0
        };
    }
}

/// Compose the canonical cache key for a request identity.
pub fn request_key(method: &str, url: &str, body: Option<&str>) -> String {
    match body {
        Some(body) => format!("{} {}:{}", method, url, body),
        None => format!("{} {}", method, url),
    }
}

/// In-memory TTL cache for fetched JSON payloads. Owned by exactly one
/// `ResilientFetcher`; never shared across instances.
pub struct ResponseCache {
    entries: Arc<RwLock<HashMap<String, CacheEntry>>>,
    last_good: Arc<RwLock<HashMap<String, (Value, Instant)>>>,
    soft_limit: usize,
    max_entries: usize,
    stats: Arc<RwLock<CacheStats>>,
}

impl ResponseCache {
    pub fn new(soft_limit: usize, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            last_good: Arc::new(RwLock::new(HashMap::new())),
            soft_limit,
            max_entries,
            stats: Arc::new(RwLock::new(CacheStats::default())),
        }
    }

    /// Returns the cached value if present and unexpired. Expired
    /// entries are evicted on the spot.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().await;
        let mut stats = self.stats.write().await;

        if let Some(entry) = entries.get_mut(key) {
            if !entry.is_expired() {
                stats.hits += 1;
                return Some(entry.access().clone());
            }
            entries.remove(key);
            stats.evictions += 1;
        }

        stats.misses += 1;
        None
    }

    /// Inserts or overwrites; also refreshes the last-known-good tier.
    /// Crossing the soft limit triggers an inline sweep.
    pub async fn set(&self, key: &str, value: Value, ttl: Duration) {
        {
            let mut entries = self.entries.write().await;
            entries.insert(key.to_string(), CacheEntry::new(value.clone(), ttl));
        }
        {
            let mut last_good = self.last_good.write().await;
            last_good.insert(key.to_string(), (value, Instant::now()));
        }

        let over_limit = self.entries.read().await.len() > self.soft_limit;
        if over_limit {
            self.sweep().await;
        }
    }

    /// Last successful value for the key, ignoring TTL. Never counts as
    /// a hit; this exists only to serve the fetcher's fallback path.
    pub async fn peek_last_good(&self, key: &str) -> Option<Value> {
        self.last_good
            .read()
            .await
            .get(key)
            .map(|(value, _)| value.clone())
    }

    /// Removes expired entries and enforces the hard entry cap on both
    /// tiers (oldest-accessed evicted first). Returns evicted count.
    pub async fn sweep(&self) -> usize {
        let mut evicted = 0;

        {
            let mut entries = self.entries.write().await;
            let before = entries.len();
            entries.retain(|_, entry| !entry.is_expired());
            evicted += before - entries.len();

            if entries.len() > self.max_entries {
                let excess = entries.len() - self.max_entries;
                let mut by_access: Vec<_> = entries
                    .iter()
                    .map(|(k, entry)| (k.clone(), entry.last_accessed))
                    .collect();
                by_access.sort_by_key(|(_, last_accessed)| *last_accessed);
                for (key, _) in by_access.into_iter().take(excess) {
                    entries.remove(&key);
                }
                evicted += excess;
            }
        }

        {
            let mut last_good = self.last_good.write().await;
            if last_good.len() > self.max_entries {
                let excess = last_good.len() - self.max_entries;
                let mut by_write: Vec<_> = last_good
                    .iter()
                    .map(|(k, (_, written))| (k.clone(), *written))
                    .collect();
                by_write.sort_by_key(|(_, written)| *written);
                for (key, _) in by_write.into_iter().take(excess) {
                    last_good.remove(&key);
                }
            }
        }

        if evicted > 0 {
            debug!("Cache sweep evicted {} entries", evicted);
            let mut stats = self.stats.write().await;
            stats.evictions += evicted as u64;
        }
        evicted
    }

    /// Explicit invalidation of both tiers for a key.
    pub async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
        self.last_good.write().await.remove(key);
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
        self.last_good.write().await.clear();
        let mut stats = self.stats.write().await;
        *stats = CacheStats::default();
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        // Lock order everywhere is entries before stats
        let entries = self.entries.read().await.len();
        let mut stats = self.stats.read().await.clone();
        stats.entries = entries;
        stats.calculate_hit_rate();
        stats
    }

    /// Spawn the periodic sweeper. The returned handle aborts the task
    /// on drop by the owner; the cache itself keeps no reference to it.
    pub fn start_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let entries = Arc::clone(&self.entries);
        let stats = Arc::clone(&self.stats);
        tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                let mut entries = entries.write().await;
                let before = entries.len();
                entries.retain(|_, entry| !entry.is_expired());
                let evicted = before - entries.len();
                drop(entries);
                if evicted > 0 {
                    debug!("Periodic cache sweep evicted {} entries", evicted);
                    stats.write().await.evictions += evicted as u64;
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn get_returns_value_inside_ttl() {
        let cache = ResponseCache::new(100, 1_000);
        cache
            .set("GET /teams", json!(["STL"]), Duration::from_secs(60))
            .await;
        assert_eq!(cache.get("GET /teams").await, Some(json!(["STL"])));
    }

    #[tokio::test]
    async fn get_evicts_expired_entry() {
        let cache = ResponseCache::new(100, 1_000);
        cache
            .set("GET /teams", json!(["STL"]), Duration::from_millis(20))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("GET /teams").await, None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn last_good_survives_expiry() {
        let cache = ResponseCache::new(100, 1_000);
        cache
            .set("GET /teams", json!(["STL"]), Duration::from_millis(20))
            .await;
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(cache.get("GET /teams").await, None);
        assert_eq!(cache.peek_last_good("GET /teams").await, Some(json!(["STL"])));
    }

    #[tokio::test]
    async fn soft_limit_triggers_sweep_of_expired_entries() {
        let cache = ResponseCache::new(3, 1_000);
        for i in 0..3 {
            cache
                .set(&format!("expired-{}", i), json!(i), Duration::from_millis(1))
                .await;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        // Fourth write crosses the soft limit and sweeps the dead ones
        cache
            .set("fresh", json!("kept"), Duration::from_secs(60))
            .await;
        assert_eq!(cache.len().await, 1);
        assert_eq!(cache.get("fresh").await, Some(json!("kept")));
    }

    #[tokio::test]
    async fn hard_cap_evicts_oldest_accessed() {
        let cache = ResponseCache::new(1, 2);
        cache.set("a", json!(1), Duration::from_secs(60)).await;
        cache.set("b", json!(2), Duration::from_secs(60)).await;
        // Touch "a" so "b" becomes the eviction candidate
        let _ = cache.get("a").await;
        cache.set("c", json!(3), Duration::from_secs(60)).await;
        assert!(cache.len().await <= 2);
        assert_eq!(cache.get("a").await, Some(json!(1)));
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache = ResponseCache::new(100, 1_000);
        cache.set("k", json!(1), Duration::from_secs(60)).await;
        let _ = cache.get("k").await;
        let _ = cache.get("k").await;
        let _ = cache.get("missing").await;
        let stats = cache.stats().await;
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_approx_eq::assert_approx_eq!(stats.hit_rate, 2.0 / 3.0, 1e-9);
    }

    #[test]
    fn request_key_includes_body_identity() {
        assert_eq!(request_key("GET", "/teams", None), "GET /teams");
        assert_eq!(
            request_key("POST", "/query", Some(r#"{"team":138}"#)),
            r#"POST /query:{"team":138}"#
        );
    }
}
