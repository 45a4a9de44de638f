//! Tests for priority-tiered expiry, capacity eviction and sweeping
//!
//! All tests run on paused tokio time so TTL boundaries are exact.

use chartcache::cache::{CacheOptions, TieredCache};
use chartcache::{CacheConfig, CachePriority, ResourceType};
use std::sync::Arc;
use std::time::Duration;

fn small_cache(max_entries: usize, batch: usize) -> TieredCache<String> {
    TieredCache::new(CacheConfig {
        max_entries,
        eviction_batch_size: batch,
        ..CacheConfig::default()
    })
}

#[tokio::test(start_paused = true)]
async fn test_low_priority_entry_is_gone_after_five_minutes_and_a_second() {
    let cache = small_cache(100, 10);
    cache.set(
        "search:Observation?patient=1",
        "cached".to_string(),
        CacheOptions::new()
            .priority(CachePriority::Low)
            .ttl(Duration::from_secs(300)),
    );

    tokio::time::advance(Duration::from_secs(300)).await;
    assert!(cache.has("search:Observation?patient=1"));

    tokio::time::advance(Duration::from_secs(1)).await;
    assert_eq!(cache.get("search:Observation?patient=1"), None);
    // Removed on read, without any sweep having run
    assert_eq!(cache.len(), 0);
    assert_eq!(cache.stats().expirations, 1);
}

#[tokio::test(start_paused = true)]
async fn test_critical_outlives_low_inserted_together() {
    let cache = small_cache(100, 10);
    let critical = cache.set("a", "a".into(), CacheOptions::new().priority(CachePriority::Critical));
    let low = cache.set("b", "b".into(), CacheOptions::new().priority(CachePriority::Low));
    assert!(critical.expires_at > low.expires_at);

    tokio::time::advance(Duration::from_secs(5 * 60 + 1)).await;
    assert!(cache.get("a").is_some());
    assert!(cache.get("b").is_none());
}

#[tokio::test(start_paused = true)]
async fn test_resource_type_picks_default_priority() {
    let cache = small_cache(100, 10);
    let allergy = cache.set(
        "resource:AllergyIntolerance/1",
        "x".into(),
        CacheOptions::new().resource_type(ResourceType::AllergyIntolerance),
    );
    let imaging = cache.set(
        "resource:ImagingStudy/1",
        "y".into(),
        CacheOptions::new().resource_type(ResourceType::ImagingStudy),
    );

    assert_eq!(allergy.priority, CachePriority::Critical);
    assert_eq!(imaging.priority, CachePriority::Low);
    assert_eq!(allergy.ttl, Duration::from_secs(30 * 60));
}

#[tokio::test(start_paused = true)]
async fn test_capacity_eviction_spares_critical_entries() {
    let cache = small_cache(10, 3);
    for i in 0..6 {
        cache.set(
            format!("critical-{}", i),
            "c".into(),
            CacheOptions::new().priority(CachePriority::Critical),
        );
    }
    for i in 0..10 {
        tokio::time::advance(Duration::from_millis(10)).await;
        cache.set(
            format!("low-{}", i),
            "l".into(),
            CacheOptions::new().priority(CachePriority::Low),
        );
    }

    assert!(cache.len() <= 10);
    for i in 0..6 {
        assert!(cache.has(&format!("critical-{}", i)));
    }
    // Most recently written low entry survives; the oldest went first
    assert!(cache.has("low-9"));
    assert!(!cache.has("low-0"));
    assert!(cache.stats().evictions > 0);
}

#[tokio::test(start_paused = true)]
async fn test_only_critical_entries_may_exceed_ceiling() {
    let cache = small_cache(3, 2);
    for i in 0..5 {
        cache.set(
            format!("critical-{}", i),
            "c".into(),
            CacheOptions::new().priority(CachePriority::Critical),
        );
    }
    assert_eq!(cache.len(), 5);
    assert_eq!(cache.stats().evictions, 0);
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_removes_expired_entries() {
    let cache = Arc::new(TieredCache::new(CacheConfig {
        sweep_interval: Duration::from_secs(60),
        ..CacheConfig::default()
    }));
    cache.set(
        "short",
        1u32,
        CacheOptions::new().ttl(Duration::from_secs(30)),
    );
    cache.set("long", 2u32, CacheOptions::new().priority(CachePriority::Critical));
    let sweeper = cache.spawn_sweeper();

    tokio::time::sleep(Duration::from_secs(61)).await;

    assert_eq!(cache.len(), 1);
    assert!(cache.has("long"));
    sweeper.abort();
}

#[tokio::test(start_paused = true)]
async fn test_tag_and_type_clears() {
    let cache = small_cache(100, 10);
    cache.set(
        "resource:Condition/1",
        "c1".into(),
        CacheOptions::new()
            .resource_type(ResourceType::Condition)
            .tag("subject:1"),
    );
    cache.set(
        "resource:Observation/1",
        "o1".into(),
        CacheOptions::new()
            .resource_type(ResourceType::Observation)
            .tag("subject:1"),
    );
    cache.set(
        "resource:Observation/2",
        "o2".into(),
        CacheOptions::new()
            .resource_type(ResourceType::Observation)
            .tag("subject:2"),
    );

    assert_eq!(cache.clear_by_resource_type(ResourceType::Observation), 2);
    assert_eq!(cache.clear_by_tag("subject:1"), 1);
    assert!(cache.is_empty());
}
