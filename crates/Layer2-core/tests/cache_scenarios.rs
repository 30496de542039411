//! Cache scenarios - codec, tiers and janitor over a real directory
//!
//! `cargo test -p tollgate-core --test cache_scenarios`

use serde_json::{json, Value};
use std::sync::Arc;
use std::thread;
use tempfile::TempDir;
use tollgate_core::cache::{normalize, query_key, truncate};
use tollgate_core::{TieredCache, MAX_KEY_LENGTH};
use tollgate_foundation::{CacheSettings, ManualClock};

fn cache_in(dir: &TempDir, settings: CacheSettings) -> (Arc<TieredCache>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let cache = TieredCache::with_clock(dir.path(), settings, clock.clone());
    (Arc::new(cache), clock)
}

#[test]
fn test_long_queries_land_on_bounded_paths() {
    let dir = TempDir::new().unwrap();
    let (cache, _) = cache_in(&dir, CacheSettings::default().without_janitor());

    let query = format!("Analyze XAUUSD news: {}", "inflation and rate cuts ".repeat(40));
    let key = query_key(&query, Some("deepseek-chat"), json!({"temperature": 0.3}).as_object());
    assert!(cache.put(&key, "news", json!({"bias": "bullish"})));

    let path = cache.codec().entry_path("news", &key);
    let stem = path.file_name().unwrap().to_str().unwrap();
    assert!(stem.trim_end_matches(".cache.gz").chars().count() <= MAX_KEY_LENGTH);
    assert!(path.exists());

    cache.clear_memory();
    assert_eq!(cache.get(&key, "news", false), Some(json!({"bias": "bullish"})));
}

#[test]
fn test_key_transforms_hold_for_awkward_inputs() {
    let inputs = [
        String::new(),
        "////".to_string(),
        "é".repeat(300),
        "a b\tc\nd".to_string(),
        "x".repeat(10_000),
    ];
    for input in &inputs {
        let normalized = normalize(input);
        assert_eq!(normalize(&normalized), normalized);
        assert!(truncate(&normalized, MAX_KEY_LENGTH).chars().count() <= MAX_KEY_LENGTH);
        assert_eq!(
            truncate(&normalized, MAX_KEY_LENGTH),
            truncate(&normalized, MAX_KEY_LENGTH)
        );
    }
}

#[test]
fn test_expiry_thresholds_per_category() {
    let dir = TempDir::new().unwrap();
    let (cache, clock) = cache_in(&dir, CacheSettings::default().without_janitor());

    cache.put("q", "portfolio", json!(1)); // 1200s
    cache.put("q", "unknown_category", json!(2)); // default 300s

    clock.advance_secs(301);
    assert_eq!(cache.get("q", "portfolio", false), Some(json!(1)));
    assert_eq!(cache.get("q", "unknown_category", false), None);
    assert_eq!(cache.get("q", "unknown_category", true), Some(json!(2)));

    clock.advance_secs(900);
    assert_eq!(cache.get("q", "portfolio", false), None);
    assert_eq!(cache.get("q", "portfolio", true), Some(json!(1)));
}

#[test]
fn test_janitor_run_from_cache_reclaims_expired_files() {
    let dir = TempDir::new().unwrap();
    let (cache, clock) = cache_in(&dir, CacheSettings::default().without_janitor());

    for i in 0..5 {
        cache.put(&format!("chat message {}", i), "chat", json!(i));
    }
    cache.put("headline", "news", json!("kept"));
    assert_eq!(cache.disk_stats()["chat"].count, 5);

    // past chat TTL (600s), inside news TTL (3600s)
    clock.advance_secs(601);
    let report = cache.run_janitor();

    assert_eq!(report.expired, 5);
    assert_eq!(report.evicted, 0);
    let stats = cache.disk_stats();
    assert_eq!(stats["chat"].count, 0);
    assert_eq!(stats["news"].count, 1);
}

#[test]
fn test_concurrent_put_get() {
    let dir = TempDir::new().unwrap();
    let settings = CacheSettings {
        max_memory_items: 16,
        ..CacheSettings::default().without_janitor()
    };
    let (cache, _) = cache_in(&dir, settings);

    let handles: Vec<_> = (0..4)
        .map(|worker| {
            let cache = cache.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    let key = format!("worker {} item {}", worker, i);
                    assert!(cache.put(&key, "scenario", json!({"w": worker, "i": i})));
                    assert_eq!(
                        cache.get(&key, "scenario", false),
                        Some(json!({"w": worker, "i": i}))
                    );
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert!(cache.memory_len() <= 16);
    assert_eq!(cache.disk_stats()["scenario"].count, 200);
    let value: Option<Value> = cache.get("worker 3 item 0", "scenario", false);
    assert_eq!(value, Some(json!({"w": 3, "i": 0})));
}
