use std::thread::sleep;
use std::time::Duration;

use rowlink_cache::{CacheConfig, CachePattern, QueryCache};
use rowlink_core::prelude::*;
use rowlink_core::{CompiledQuery, Error, ResponseMode};
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

fn users_by_id(id: i64) -> CompiledQuery {
    QueryBuilder::new("users").eq("id", id).compile().unwrap()
}

fn rows(v: Value) -> Envelope<Value> {
    Envelope::success(Some(v), None, 200)
}

#[test]
fn test_cache_hit() {
    let cache = QueryCache::default();
    let q = users_by_id(1);
    assert!(cache.set(&q, rows(json!([{"id": 1}])), None));
    assert_eq!(cache.get(&q), Some(rows(json!([{"id": 1}]))));
    assert_eq!(cache.stats().hits, 1);
}

#[test]
fn test_cache_miss() {
    let cache = QueryCache::default();
    assert_eq!(cache.get(&users_by_id(1)), None);
    assert_eq!(cache.stats().misses, 1);
}

#[test]
fn test_mode_is_part_of_the_key() {
    let cache = QueryCache::default();
    let builder = QueryBuilder::new("users").eq("id", 1);
    let many = builder.compile().unwrap();
    let single = builder.compile_as(ResponseMode::Single).unwrap();
    cache.set(&many, rows(json!([{"id": 1}])), None);
    assert!(cache.get(&single).is_none());
}

#[test]
fn test_cache_expiry() {
    let cache = QueryCache::new(CacheConfig::new(Duration::from_millis(50), 10));
    let q = users_by_id(1);
    cache.set(&q, rows(json!([])), None);
    assert!(cache.get(&q).is_some());
    sleep(Duration::from_millis(60));
    assert!(cache.get(&q).is_none());
    assert!(cache.is_empty());
}

#[test]
fn test_per_entry_ttl_override() {
    let cache = QueryCache::new(CacheConfig::new(Duration::from_secs(60), 10));
    let q = users_by_id(1);
    cache.set(&q, rows(json!([])), Some(Duration::from_millis(20)));
    sleep(Duration::from_millis(30));
    assert!(cache.get(&q).is_none());
}

#[test]
fn test_errors_are_never_cached() {
    let cache = QueryCache::default();
    let q = users_by_id(1);
    assert!(!cache.set(&q, Envelope::failure(Error::network("down"), 0), None));
    assert!(cache.get(&q).is_none());
}

#[test]
fn test_writes_are_never_cached() {
    let cache = QueryCache::default();
    let insert = QueryBuilder::new("users")
        .insert(json!({"id": 1}))
        .compile()
        .unwrap();
    assert!(!cache.set(&insert, rows(json!([])), None));
}

#[test]
fn test_table_invalidation_covers_embeds() {
    let cache = QueryCache::default();
    let plain = users_by_id(1);
    let embedded = QueryBuilder::new("authors")
        .relations(["users"])
        .compile()
        .unwrap();
    let other = QueryBuilder::new("posts").compile().unwrap();
    cache.set(&plain, rows(json!([])), None);
    cache.set(&embedded, rows(json!([])), None);
    cache.set(&other, rows(json!([])), None);

    assert_eq!(cache.invalidate(&CachePattern::table("users")), 2);
    assert!(cache.get(&plain).is_none());
    assert!(cache.get(&embedded).is_none());
    assert!(cache.get(&other).is_some());
}

#[test]
fn test_filter_pattern_invalidation() {
    let cache = QueryCache::default();
    cache.set(&users_by_id(1), rows(json!([])), None);
    cache.set(&users_by_id(2), rows(json!([])), None);

    assert_eq!(cache.invalidate(&CachePattern::filter("users", "id", "eq.1")), 1);
    assert!(cache.get(&users_by_id(1)).is_none());
    assert!(cache.get(&users_by_id(2)).is_some());
}

#[test]
fn test_custom_key_generator() {
    let config = CacheConfig::default().with_key_generator(|q| format!("k:{}", q.table));
    let cache = QueryCache::new(config);
    cache.set(&users_by_id(1), rows(json!([1])), None);
    // Every users query maps to the same key.
    assert_eq!(cache.get(&users_by_id(2)).and_then(|e| e.data), Some(json!([1])));
    assert!(cache.get_key("k:users").is_some());
}

#[test]
fn test_clear_and_evict_expired() {
    let cache = QueryCache::new(CacheConfig::new(Duration::from_millis(10), 10));
    cache.set(&users_by_id(1), rows(json!([])), None);
    cache.set(&users_by_id(2), rows(json!([])), Some(Duration::from_secs(60)));
    sleep(Duration::from_millis(20));
    assert_eq!(cache.evict_expired(), 1);
    assert_eq!(cache.len(), 1);
    cache.clear();
    assert!(cache.is_empty());
}

#[test]
fn test_clear_invalidates_outstanding_tickets() {
    let cache = QueryCache::default();
    let ticket = cache.reserve(&users_by_id(1));
    cache.clear();
    assert!(!cache.commit(ticket, rows(json!([])), None));
}

#[tokio::test]
async fn test_sweeper_drops_expired_entries() {
    let cache = QueryCache::new(CacheConfig::new(Duration::from_millis(10), 10));
    cache.set(&users_by_id(1), rows(json!([])), None);
    let shutdown = CancellationToken::new();
    let handle = cache.spawn_sweeper(Duration::from_millis(15), shutdown.clone());
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(cache.len(), 0);
    shutdown.cancel();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_concurrent_set_is_last_write_wins() {
    let cache = QueryCache::default();
    let q = users_by_id(1);
    let mut tasks = Vec::new();
    for n in 0..16 {
        let cache = cache.clone();
        let q = q.clone();
        tasks.push(tokio::spawn(async move {
            cache.set(&q, rows(json!(n)), None);
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&q).is_some());
}
