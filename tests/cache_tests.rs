//! Cache strategy integration tests
//!
//! LRU ordering and eviction, TTL expiry driven by Tokio's paused clock, and
//! the combined in-memory provider.

use rolegate::cache::{
    CacheProvider, CacheSetOptions, EvictionReason, LruStrategy, MemoryCache, MemoryCacheOptions,
    TtlOptions, TtlStatus, TtlStrategy, spawn_cleanup,
};
use rstest::rstest;
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::advance;

fn secs(s: f64) -> Duration {
    Duration::from_secs_f64(s)
}

// =============================================================================
// LRU
// =============================================================================

mod lru {
    use super::*;

    #[test]
    fn test_get_refreshes_recency() {
        let mut lru = LruStrategy::new(2).unwrap();
        lru.set("a", 1);
        lru.set("b", 2);
        assert_eq!(lru.get(&"a"), Some(&1));

        let evicted = lru.set("c", 3);
        assert_eq!(evicted, Some(("b", 2)));
        assert_eq!(lru.keys(), vec!["c", "a"]);
    }

    #[rstest]
    #[case(1, 5)]
    #[case(3, 5)]
    #[case(5, 5)]
    #[case(8, 5)]
    fn test_size_and_evicted_keys(#[case] capacity: usize, #[case] inserts: usize) {
        let evicted = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&evicted);
        let mut lru = LruStrategy::<usize, usize>::new(capacity)
            .unwrap()
            .with_eviction_callback(move |event| {
                assert_eq!(event.reason, EvictionReason::Capacity);
                sink.lock().unwrap().push(*event.key);
            });

        for i in 0..inserts {
            lru.set(i, i);
        }

        assert_eq!(lru.len(), inserts.min(capacity));
        let expected: Vec<usize> = (0..inserts.saturating_sub(capacity)).collect();
        assert_eq!(*evicted.lock().unwrap(), expected);
    }

    #[test]
    fn test_zero_capacity_is_a_configuration_error() {
        assert!(LruStrategy::<String, i32>::new(0).is_err());
    }

    #[test]
    fn test_resize_evicts_oldest() {
        let mut lru = LruStrategy::new(4).unwrap();
        for key in ["a", "b", "c", "d"] {
            lru.set(key, ());
        }
        let evicted: Vec<&str> = lru.resize(2).unwrap().into_iter().map(|(k, _)| k).collect();
        assert_eq!(evicted, vec!["a", "b"]);
        assert_eq!(lru.keys(), vec!["d", "c"]);
    }

    #[test]
    fn test_stats() {
        let mut lru = LruStrategy::new(1).unwrap();
        lru.set("a", 1);
        lru.get(&"a");
        lru.get(&"missing");
        lru.set("b", 2);

        let stats = lru.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.evictions, 1);
        assert!((stats.hit_rate() - 0.5).abs() < f64::EPSILON);
    }
}

// =============================================================================
// TTL
// =============================================================================

mod ttl {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_expires_after_ttl() {
        let mut ttl = TtlStrategy::new(None);
        ttl.set("k", Some(secs(1.0)), TtlOptions::default());
        assert!(!ttl.is_expired(&"k"));

        advance(secs(1.3)).await;
        assert!(ttl.is_expired(&"k"));
        assert_eq!(ttl.cleanup(None), 1);
        assert!(!ttl.is_tracked(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cleanup_takes_key_still_live_at_its_deadline() {
        let mut ttl = TtlStrategy::new(None);
        ttl.set("k", Some(secs(2.0)), TtlOptions::default());

        advance(secs(2.0)).await;
        assert!(!ttl.is_expired(&"k"));
        assert_eq!(ttl.get_ttl(&"k"), TtlStatus::Expires(Duration::ZERO));
        assert_eq!(ttl.cleanup(None), 1);
        assert!(ttl.is_expired(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sliding_touch() {
        let mut ttl = TtlStrategy::new(None);
        ttl.set("k", Some(secs(1.0)), TtlOptions::sliding());

        advance(secs(0.5)).await;
        assert!(ttl.touch(&"k"));
        advance(secs(0.8)).await;
        assert!(!ttl.is_expired(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_touch_sliding_entry_expires() {
        let mut ttl = TtlStrategy::new(None);
        ttl.set("k", Some(secs(1.0)), TtlOptions::sliding());

        advance(secs(1.3)).await;
        assert!(ttl.is_expired(&"k"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_codes() {
        let mut ttl = TtlStrategy::new(None);
        ttl.set("timed", Some(secs(5.0)), TtlOptions::default());
        ttl.set("forever", None, TtlOptions::default());

        advance(secs(1.5)).await;
        assert_eq!(ttl.get_ttl(&"timed"), TtlStatus::Expires(secs(3.5)));
        assert_eq!(ttl.get_ttl(&"timed").as_legacy_seconds(), 4);
        assert_eq!(ttl.get_ttl(&"forever").as_legacy_seconds(), -1);
        assert_eq!(ttl.get_ttl(&"gone").as_legacy_seconds(), -2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiration_callbacks() {
        let expired = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&expired);
        let mut ttl: TtlStrategy<String> = TtlStrategy::new(Some(secs(2.0)));
        ttl.on_expire(move |event| sink.lock().unwrap().push(event.key.clone()));

        ttl.set("a".to_string(), None, TtlOptions::default());
        ttl.set("b".to_string(), Some(secs(10.0)), TtlOptions::default());

        advance(secs(3.0)).await;
        ttl.cleanup(None);
        assert_eq!(*expired.lock().unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_task_stops_on_drop() {
        let strategy = Arc::new(Mutex::new(TtlStrategy::new(None)));
        strategy
            .lock()
            .unwrap()
            .set(1u32, Some(secs(1.0)), TtlOptions::default());

        let task = spawn_cleanup(Arc::clone(&strategy), secs(0.5)).unwrap();
        tokio::time::sleep(secs(2.0)).await;
        assert!(strategy.lock().unwrap().is_empty());

        drop(task);
        strategy
            .lock()
            .unwrap()
            .set(2u32, Some(secs(1.0)), TtlOptions::default());
        tokio::time::sleep(secs(2.0)).await;
        assert!(strategy.lock().unwrap().is_tracked(&2));
    }
}

// =============================================================================
// Memory Cache
// =============================================================================

mod memory {
    use super::*;

    fn cache(capacity: usize) -> MemoryCache {
        MemoryCache::new(MemoryCacheOptions {
            capacity,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_capacity_eviction() {
        let cache = cache(2);
        for key in ["a", "b", "c"] {
            cache
                .set(key, json!(key), CacheSetOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(cache.get("a").await.unwrap(), None);
        assert_eq!(cache.keys(), vec!["c", "b"]);
    }

    #[tokio::test]
    async fn test_tag_invalidation() {
        let cache = cache(10);
        cache
            .set("x", json!(1), CacheSetOptions::default().tag("role:viewer"))
            .await
            .unwrap();
        cache
            .set("y", json!(2), CacheSetOptions::default().tag("role:editor"))
            .await
            .unwrap();

        assert_eq!(cache.delete_tag("role:viewer"), 1);
        assert_eq!(cache.keys(), vec!["y"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_purge() {
        let cache = cache(10);
        cache
            .set("k", json!(1), CacheSetOptions::with_ttl(secs(1.0)))
            .await
            .unwrap();

        let task = cache.start_cleanup(secs(1.0)).unwrap();
        tokio::time::sleep(secs(3.0)).await;
        assert!(cache.is_empty());
        task.stop().await;
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let cache = cache(10);
        for key in ["role:a:permissions", "role:ab:permissions", "role:b:permissions"] {
            cache
                .set(key, json!(null), CacheSetOptions::default())
                .await
                .unwrap();
        }
        assert_eq!(cache.delete_pattern("role:a?:*").await.unwrap(), 1);
        assert_eq!(cache.delete_pattern("role:*").await.unwrap(), 2);
        assert!(cache.is_empty());
    }
}
