// tests/integration/scan_rounds_test.rs

//! Integration tests for paginated enumeration against a standalone store

use super::test_helpers::TestContext;
use keyscope::core::client::Shard;
use keyscope::core::scan::ScanMode;
use keyscope::{KeyType, ScanSession, Ttl};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test]
async fn test_thousand_keys_in_ten_rounds() {
    let ctx = TestContext::standalone();
    ctx.populate("testkey:", 1000);

    let session = ScanSession::new("testkey:*", 100);
    let names = ctx.rounds(&session, 10).await;

    let distinct: HashSet<_> = names.iter().collect();
    assert_eq!(distinct.len(), names.len(), "a key was emitted twice");
    assert!(
        (991..=1000).contains(&names.len()),
        "found {} keys",
        names.len()
    );
    assert_eq!(session.discovered(), names.len());
}

#[tokio::test]
async fn test_round_never_exceeds_page_size() {
    let ctx = TestContext::standalone();
    ctx.populate("page:", 250);

    let session = ScanSession::new("page:*", 40);
    let mut total = 0;
    for _ in 0..10 {
        let entries = ctx.round(&session).await;
        assert!(entries.len() <= 40, "round emitted {} entries", entries.len());
        total += entries.len();
    }
    assert_eq!(total, 250);
    assert!(session.cursors().all_drained());
}

#[tokio::test]
async fn test_pattern_filters_keys() {
    let ctx = TestContext::standalone();
    ctx.populate("user:", 30);
    ctx.populate("order:", 300);

    let session = ScanSession::new("user:*", 10);
    let mut names = Vec::new();
    for _ in 0..50 {
        names.extend(ctx.rounds(&session, 1).await);
        if session.cursors().all_drained() {
            break;
        }
    }

    assert_eq!(names.len(), 30);
    assert!(names.iter().all(|n| n.starts_with("user:")));
}

#[tokio::test]
async fn test_exhausted_session_returns_empty_rounds() {
    let ctx = TestContext::standalone();
    ctx.populate("small:", 5);

    let session = ScanSession::new("small:*", 100);
    assert_eq!(ctx.round(&session).await.len(), 5);
    assert!(ctx.round(&session).await.is_empty());
    assert!(session.has_more());
    assert!(!session.is_scanning());
}

#[tokio::test]
async fn test_entries_carry_metadata() {
    let ctx = TestContext::standalone();
    let shard = &ctx.shards[0];
    shard.set("meta:string", "hello");
    shard.rpush("meta:list", &["a", "b"]);
    shard.sadd("meta:set", &["x"]);
    shard.zadd("meta:zset", &[(1.0, "one")]);
    shard.hset("meta:hash", &[("f", "v")]);
    shard.expire("meta:string", Duration::from_secs(120));

    let session = ScanSession::new("meta:*", 10);
    let entries = ctx.round(&session).await;
    assert_eq!(entries.len(), 5);

    for entry in &entries {
        assert!(entry.size > 0, "{} has no size", entry.name);
        let expected = match entry.name.as_str() {
            "meta:string" => KeyType::String,
            "meta:list" => KeyType::List,
            "meta:set" => KeyType::Set,
            "meta:zset" => KeyType::SortedSet,
            "meta:hash" => KeyType::Hash,
            other => panic!("unexpected key {other}"),
        };
        assert_eq!(entry.key_type, expected);
    }

    let string = entries.iter().find(|e| e.name == "meta:string").unwrap();
    assert!(matches!(string.ttl, Ttl::Expires(d) if d > Duration::from_secs(100)));
    let list = entries.iter().find(|e| e.name == "meta:list").unwrap();
    assert_eq!(list.ttl, Ttl::NoExpiry);
    assert_eq!(list.ttl_string(), "∞");
}

#[tokio::test]
async fn test_vanished_keys_are_omitted() {
    let ctx = TestContext::standalone();
    ctx.populate("gone:", 2);

    // Names discovered earlier whose key was deleted before the metadata read.
    let session = ScanSession::new("gone:*", 10);
    let names = vec!["gone:0".to_string(), "ghost".to_string(), "gone:1".to_string()];
    session.cursors().advance(ctx.shards[0].addr(), 0, names);

    let entries = ctx.round(&session).await;
    let found: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(found, vec!["gone:0", "gone:1"]);
    assert!(session.cursors().all_drained());
}

#[tokio::test]
async fn test_literal_pattern_is_an_exact_lookup() {
    let ctx = TestContext::standalone();
    ctx.populate("exact:", 50);
    ctx.shards[0].hset("exact:hash", &[("a", "1")]);

    let session = ScanSession::new("exact:hash", 10);
    assert_eq!(session.mode(), ScanMode::Exact);
    assert!(!session.has_more());

    let entries = ctx.round(&session).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "exact:hash");
    assert_eq!(entries[0].key_type, KeyType::Hash);

    let missing = ScanSession::new("exact:nope", 10);
    assert!(ctx.round(&missing).await.is_empty());
}

#[tokio::test]
async fn test_binary_key_names_survive_the_round() {
    let ctx = TestContext::standalone();
    let shard = &ctx.shards[0];
    // Both names render as "bin:\u{FFFD}" but are different keys.
    shard.set(&b"bin:\xff"[..], "first");
    shard.sadd(&b"bin:\xfe"[..], &["a", "b"]);

    let session = ScanSession::new("bin:*", 10);
    let mut entries = ctx.round(&session).await;
    entries.sort_by(|a, b| a.key.cmp(&b.key));

    assert_eq!(entries.len(), 2, "entries: {entries:?}");
    assert_eq!(&entries[0].key[..], b"bin:\xfe");
    assert_eq!(entries[0].key_type, KeyType::Set);
    assert_eq!(&entries[1].key[..], b"bin:\xff");
    assert_eq!(entries[1].key_type, KeyType::String);
    assert!(entries.iter().all(|e| e.name == "bin:\u{FFFD}"));
    assert_eq!(session.discovered(), 2);

    let rendered = ctx.conn.fetch_value(&entries[1]).await.unwrap();
    assert!(rendered.contains("first"), "rendered: {rendered}");
    assert!(ctx.round(&session).await.is_empty());
}

#[tokio::test]
async fn test_brackets_and_question_marks_are_literal_without_a_star() {
    let ctx = TestContext::standalone();
    ctx.set("arr[0]", "zero");
    ctx.set("arr0", "decoy");
    ctx.set("what?", "literal");

    for key in ["arr[0]", "what?"] {
        let session = ScanSession::new(key, 10);
        assert_eq!(session.mode(), ScanMode::Exact);
        assert!(!session.has_more());

        let entries = ctx.round(&session).await;
        assert_eq!(entries.len(), 1, "lookup of {key}");
        assert_eq!(entries[0].name, key);
    }

    // With a star the other metacharacters act as glob syntax again.
    let session = ScanSession::new("arr[0-9]*", 10);
    assert_eq!(session.mode(), ScanMode::Enumerate);
    let names: Vec<_> = ctx.round(&session).await.into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["arr0"]);
}
