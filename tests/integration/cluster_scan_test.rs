// tests/integration/cluster_scan_test.rs

//! Integration tests for enumeration and routing across cluster primaries

use super::test_helpers::TestContext;
use keyscope::core::client::Shard;
use keyscope::{KeyType, ScanSession};
use std::collections::HashSet;

#[tokio::test]
async fn test_every_primary_is_scanned() {
    let ctx = TestContext::cluster(3);
    ctx.populate("node:", 300);
    for shard in &ctx.shards {
        assert!(!shard.is_empty(), "{} holds no keys", shard.addr());
    }

    let session = ScanSession::new("node:*", 50);
    let mut names = HashSet::new();
    for _ in 0..10 {
        let entries = ctx.round(&session).await;
        assert!(entries.len() <= 50 * 3);
        for entry in entries {
            assert!(names.insert(entry.name.clone()), "{} emitted twice", entry.name);
        }
    }

    assert_eq!(names.len(), 300);
    assert_eq!(session.cursors().shard_count(), 3);
    assert!(session.cursors().all_drained());
}

#[tokio::test]
async fn test_total_key_count_sums_primaries() {
    let ctx = TestContext::cluster(4);
    ctx.populate("count:", 123);
    assert_eq!(ctx.conn.total_key_count().await.unwrap(), 123);
}

#[tokio::test]
async fn test_exact_lookup_routes_by_slot() {
    let ctx = TestContext::cluster(3);
    ctx.populate("route:", 60);
    ctx.shard_for("{user42}.profile")
        .hset("{user42}.profile", &[("name", "ada")]);

    for key in ["route:7", "route:33", "{user42}.profile"] {
        let session = ScanSession::new(key, 10);
        let entries = ctx.round(&session).await;
        assert_eq!(entries.len(), 1, "lookup of {key}");
        assert_eq!(entries[0].name, key);
    }

    let owner = ctx.conn.shard_for_key("{user42}.profile").unwrap();
    assert_eq!(owner.addr(), ctx.shard_for("{user42}").addr());

    let session = ScanSession::new("{user42}.profile", 10);
    let entry = ctx.round(&session).await.remove(0);
    assert_eq!(entry.key_type, KeyType::Hash);
    let value = ctx.conn.fetch_value(&entry).await.unwrap();
    assert_eq!(value, "| field | value |\n| --- | --- |\n| name | ada |\n");
}

#[tokio::test]
async fn test_for_each_shard_visits_every_primary() {
    let ctx = TestContext::cluster(5);
    let visited = std::sync::Arc::new(dashmap::DashSet::new());
    let seen = visited.clone();
    ctx.conn
        .for_each_shard(move |shard| {
            let seen = seen.clone();
            async move {
                seen.insert(shard.addr().to_string());
                Ok(())
            }
        })
        .await
        .unwrap();
    assert_eq!(visited.len(), 5);
}
