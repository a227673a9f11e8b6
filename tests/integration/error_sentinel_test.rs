// tests/integration/error_sentinel_test.rs

//! Integration tests for failed rounds and degraded metadata

use super::test_helpers::TestContext;
use futures::StreamExt;
use keyscope::core::client::Fault;
use keyscope::{KeyType, ScanSession, Ttl};
use std::collections::HashSet;

#[tokio::test]
async fn test_transport_error_yields_one_sentinel() {
    let ctx = TestContext::standalone();
    ctx.populate("err:", 10);
    ctx.shards[0].fail_command("SCAN", Fault::Transport("connection reset by peer".into()));

    let session = ScanSession::new("err:*", 5);
    let entries = ctx.round(&session).await;

    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_error());
    assert_eq!(entries[0].key_type, KeyType::Error);
    assert!(entries[0].name.contains("connection reset by peer"));
    assert!(!session.is_scanning());
    assert_eq!(session.discovered(), 0);
}

#[tokio::test]
async fn test_failed_shard_stops_the_round_and_recovers() {
    let ctx = TestContext::cluster(3);
    ctx.populate("flaky:", 90);
    ctx.shards[1].fail_command("TYPE", Fault::Transport("broken pipe".into()));

    let session = ScanSession::new("flaky:*", 10);
    let (stream, _cancel) = ctx.driver.run_async(&session);
    let entries: Vec<_> = stream.collect().await;
    let errors: Vec<_> = entries.iter().filter(|e| e.is_error()).collect();
    assert_eq!(errors.len(), 1);
    assert!(entries.last().unwrap().is_error(), "the sentinel must be the last entry");
    assert!(!session.is_scanning());

    ctx.shards[1].clear_faults();
    let mut names: HashSet<String> = entries
        .into_iter()
        .filter(|e| !e.is_error())
        .map(|e| e.name)
        .collect();
    for name in ctx.rounds(&session, 20).await {
        assert!(names.insert(name.clone()), "{name} emitted twice");
    }
    assert_eq!(names.len(), 90, "keys of the failed shard were lost");
}

#[tokio::test]
async fn test_server_error_reply_on_scan_is_a_sentinel() {
    let ctx = TestContext::standalone();
    ctx.populate("noauth:", 3);
    ctx.shards[0].fail_command("SCAN", Fault::Reply("NOAUTH Authentication required.".into()));

    let session = ScanSession::new("noauth:*", 10);
    let entries = ctx.round(&session).await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "NOAUTH Authentication required.");
}

#[tokio::test]
async fn test_metadata_errors_degrade_fields() {
    let ctx = TestContext::standalone();
    ctx.populate("degraded:", 4);
    ctx.shards[0].fail_command("MEMORY", Fault::Reply("ERR unknown command 'MEMORY'".into()));
    ctx.shards[0].fail_command("PTTL", Fault::Reply("ERR PTTL is disabled".into()));

    let session = ScanSession::new("degraded:*", 10);
    let entries = ctx.round(&session).await;
    assert_eq!(entries.len(), 4);
    for entry in entries {
        assert!(!entry.is_error());
        assert_eq!(entry.key_type, KeyType::String);
        assert_eq!(entry.size, 0);
        assert_eq!(entry.ttl, Ttl::Unknown);
        assert_eq!(entry.size_string(), "0 B");
    }
}

#[tokio::test]
async fn test_exact_lookup_failure_is_a_sentinel() {
    let ctx = TestContext::standalone();
    ctx.set("solo", "value");
    ctx.shards[0].fail_command("PTTL", Fault::Transport("timed out".into()));

    let session = ScanSession::new("solo", 10);
    let entries = ctx.round(&session).await;
    assert_eq!(entries.len(), 1);
    assert!(entries[0].is_error());

    // Error entries render their own message.
    let rendered = ctx.conn.fetch_value(&entries[0]).await.unwrap();
    assert_eq!(rendered, entries[0].name);
}
