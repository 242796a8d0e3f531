//! In-process cache provider
//!
//! Combines [`LruStrategy`] for capacity and [`TtlStrategy`] for expiry
//! behind one mutex, plus a tag index for grouped invalidation. Expired
//! entries are dropped lazily on read and in bulk by
//! [`MemoryCache::purge_expired`], which [`MemoryCache::start_cleanup`] runs
//! periodically.

use super::lru::{LruStats, LruStrategy};
use super::provider::{CacheProvider, CacheSetOptions};
use super::ttl::{CleanupTask, DEFAULT_CLEANUP_BATCH, TtlOptions, TtlStrategy, spawn_sweeper};
use crate::error::{CacheError, ConfigError};
use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::trace;

/// Construction options for [`MemoryCache`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryCacheOptions {
    /// Maximum number of entries
    pub capacity: usize,
    /// Ttl for writes that do not set one; `None` never expires
    pub default_ttl: Option<Duration>,
    /// Maximum entries removed per purge
    pub cleanup_batch_size: usize,
}

impl Default for MemoryCacheOptions {
    fn default() -> Self {
        Self {
            capacity: 10_000,
            default_ttl: Some(Duration::from_secs(3600)),
            cleanup_batch_size: DEFAULT_CLEANUP_BATCH,
        }
    }
}

#[derive(Debug)]
struct CacheState {
    lru: LruStrategy<String, Value>,
    ttl: TtlStrategy<String>,
    /// tag -> keys
    tags: HashMap<String, HashSet<String>>,
    /// key -> tags
    key_tags: HashMap<String, Vec<String>>,
}

impl CacheState {
    fn remove(&mut self, key: &String) -> bool {
        let existed = self.lru.delete(key).is_some();
        self.forget(key);
        existed
    }

    /// Drop expiry and tag bookkeeping for a key
    fn forget(&mut self, key: &String) {
        self.ttl.remove(key);
        let Some(tags) = self.key_tags.remove(key) else {
            return;
        };
        for tag in tags {
            if let Some(keys) = self.tags.get_mut(&tag) {
                keys.remove(key);
                if keys.is_empty() {
                    self.tags.remove(&tag);
                }
            }
        }
    }

    fn purge_expired(&mut self) -> usize {
        let expired = self.ttl.take_expired(None);
        let mut removed = 0;
        for event in expired {
            if self.lru.delete(&event.key).is_some() {
                removed += 1;
            }
            self.forget(&event.key);
        }
        removed
    }
}

/// LRU + TTL cache of JSON values
#[derive(Debug, Clone)]
pub struct MemoryCache {
    state: Arc<Mutex<CacheState>>,
}

impl MemoryCache {
    pub fn new(options: MemoryCacheOptions) -> Result<Self, ConfigError> {
        let lru = LruStrategy::new(options.capacity)?;
        let ttl = TtlStrategy::new(options.default_ttl).with_batch_size(options.cleanup_batch_size);
        Ok(Self {
            state: Arc::new(Mutex::new(CacheState {
                lru,
                ttl,
                tags: HashMap::new(),
                key_tags: HashMap::new(),
            })),
        })
    }

    /// Purge expired entries every `interval`; `None` when the interval is zero
    pub fn start_cleanup(&self, interval: Duration) -> Option<CleanupTask> {
        let state = Arc::clone(&self.state);
        spawn_sweeper(interval, move || {
            state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .purge_expired()
        })
    }

    /// Remove up to one batch of expired entries, returning how many went
    pub fn purge_expired(&self) -> usize {
        self.lock().purge_expired()
    }

    /// Remove every entry carrying `tag`
    pub fn delete_tag(&self, tag: &str) -> usize {
        let mut state = self.lock();
        let keys: Vec<String> = match state.tags.get(tag) {
            Some(keys) => keys.iter().cloned().collect(),
            None => return 0,
        };
        keys.iter().filter(|key| state.remove(key)).count()
    }

    /// Keys from most to least recently used, expired ones included until purged
    pub fn keys(&self) -> Vec<String> {
        self.lock().lru.keys()
    }

    pub fn len(&self) -> usize {
        self.lock().lru.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().lru.is_empty()
    }

    pub fn stats(&self) -> LruStats {
        self.lock().lru.stats()
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.lru.clear();
        state.ttl.clear();
        state.tags.clear();
        state.key_tags.clear();
    }

    // Recover from poisoning; every mutation leaves the state consistent
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl CacheProvider for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Value>, CacheError> {
        let key = key.to_string();
        let mut state = self.lock();

        if state.ttl.is_tracked(&key) && state.ttl.is_expired(&key) {
            state.remove(&key);
            trace!(key = %key, "Cache entry expired");
            return Ok(None);
        }

        let value = state.lru.get(&key).cloned();
        if value.is_some() {
            state.ttl.touch(&key);
        }
        Ok(value)
    }

    async fn set(
        &self,
        key: &str,
        value: Value,
        options: CacheSetOptions,
    ) -> Result<(), CacheError> {
        let key = key.to_string();
        let mut state = self.lock();

        state.forget(&key);
        if let Some((evicted, _)) = state.lru.set(key.clone(), value) {
            trace!(key = %evicted, "Cache entry evicted");
            state.forget(&evicted);
        }

        let ttl_options = TtlOptions {
            sliding: options.sliding,
        };
        state.ttl.set(key.clone(), options.ttl, ttl_options);

        for tag in options.tags {
            state
                .tags
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
            state.key_tags.entry(key.clone()).or_default().push(tag);
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.lock().remove(&key.to_string()))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
        let matcher = glob_to_regex(pattern)?;
        let mut state = self.lock();
        let keys: Vec<String> = state
            .lru
            .keys()
            .into_iter()
            .filter(|key| matcher.is_match(key))
            .collect();
        let removed = keys.iter().filter(|key| state.remove(key)).count();
        trace!(pattern, removed, "Cache pattern delete");
        Ok(removed)
    }
}

/// Translate a key glob (`*` any run, `?` one character) into an anchored regex
fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    let mut buf = [0u8; 4];
    for c in pattern.chars() {
        match c {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut buf))),
        }
    }
    source.push('$');

    Regex::new(&source).map_err(|e| CacheError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cache(capacity: usize) -> MemoryCache {
        MemoryCache::new(MemoryCacheOptions {
            capacity,
            default_ttl: None,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_glob_to_regex() {
        let re = glob_to_regex("role:*:permissions").unwrap();
        assert!(re.is_match("role:editor:permissions"));
        assert!(!re.is_match("role:editor:hierarchy:d10"));

        let re = glob_to_regex("a?c.d").unwrap();
        assert!(re.is_match("abc.d"));
        assert!(!re.is_match("abcxd"));
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let result = MemoryCache::new(MemoryCacheOptions {
            capacity: 0,
            ..Default::default()
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_set_get_delete() {
        let cache = cache(10);
        cache
            .set("k", json!({"a": 1}), CacheSetOptions::default())
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert!(cache.delete("k").await.unwrap());
        assert!(!cache.delete("k").await.unwrap());
        assert_eq!(cache.get("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eviction_clears_tags() {
        let cache = cache(1);
        let tagged = CacheSetOptions::default().tag("group");
        cache.set("a", json!(1), tagged.clone()).await.unwrap();
        cache.set("b", json!(2), tagged).await.unwrap();

        assert_eq!(cache.keys(), vec!["b"]);
        assert_eq!(cache.delete_tag("group"), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = cache(10);
        for key in ["role:a:permissions", "role:a:hierarchy:d10", "role:b:permissions"] {
            cache
                .set(key, json!([]), CacheSetOptions::default())
                .await
                .unwrap();
        }

        assert_eq!(cache.delete_pattern("role:a:*").await.unwrap(), 2);
        assert_eq!(cache.keys(), vec!["role:b:permissions"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_a_miss() {
        let cache = cache(10);
        cache
            .set("k", json!(1), CacheSetOptions::with_ttl(Duration::from_secs(1)))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_millis(1500)).await;
        assert_eq!(cache.get("k").await.unwrap(), None);
        assert!(cache.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = cache(10);
        let short = CacheSetOptions::with_ttl(Duration::from_secs(1)).tag("t");
        cache.set("a", json!(1), short.clone()).await.unwrap();
        cache.set("b", json!(2), short).await.unwrap();
        cache
            .set("c", json!(3), CacheSetOptions::default())
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(cache.purge_expired(), 2);
        assert_eq!(cache.keys(), vec!["c"]);
        assert_eq!(cache.delete_tag("t"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_read_renews() {
        let cache = cache(10);
        let options = CacheSetOptions::with_ttl(Duration::from_secs(1)).sliding();
        cache.set("k", json!(1), options).await.unwrap();

        tokio::time::advance(Duration::from_millis(800)).await;
        assert!(cache.get("k").await.unwrap().is_some());
        tokio::time::advance(Duration::from_millis(800)).await;
        assert!(cache.get("k").await.unwrap().is_some());
    }
}
