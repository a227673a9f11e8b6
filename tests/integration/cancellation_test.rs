// tests/integration/cancellation_test.rs

//! Integration tests for round cancellation, supersession and the scanning flag

use super::test_helpers::TestContext;
use futures::StreamExt;
use keyscope::ScanSession;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::timeout;

const SLOW: Duration = Duration::from_millis(50);

/// Waits until no round of `session` is outstanding.
async fn wait_idle(session: &ScanSession) {
    timeout(Duration::from_secs(5), async {
        while session.is_scanning() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session stayed in the scanning state");
}

#[tokio::test]
async fn test_scanning_flag_spans_the_round() {
    let ctx = TestContext::standalone();
    ctx.populate("flag:", 20);
    ctx.shards[0].set_latency(Some(SLOW));

    let session = ScanSession::new("flag:*", 10);
    assert!(!session.is_scanning());
    let (stream, _cancel) = ctx.driver.run_async(&session);
    assert!(session.is_scanning());

    let entries: Vec<_> = stream.collect().await;
    assert_eq!(entries.len(), 10);
    assert!(!session.is_scanning());
}

#[tokio::test]
async fn test_cancel_closes_the_stream_and_keeps_progress() {
    let ctx = TestContext::standalone();
    ctx.populate("cancel:", 100);
    ctx.shards[0].set_latency(Some(SLOW));

    let session = ScanSession::new("cancel:*", 30);
    let (stream, cancel) = ctx.driver.run_async(&session);
    tokio::time::sleep(SLOW / 2).await;
    cancel.cancel();
    assert!(cancel.is_cancelled());

    let cancelled: Vec<_> = timeout(Duration::from_secs(2), stream.collect::<Vec<_>>())
        .await
        .expect("cancelled round did not close its stream");
    assert!(cancelled.iter().all(|e| !e.is_error()));
    assert!(!session.is_scanning());

    ctx.shards[0].set_latency(None);
    let mut names: HashSet<String> = cancelled.into_iter().map(|e| e.name).collect();
    for name in ctx.rounds(&session, 10).await {
        assert!(names.insert(name.clone()), "{name} emitted twice");
    }
    assert_eq!(names.len(), 100, "keys were lost across the cancellation");
}

#[tokio::test]
async fn test_new_round_supersedes_the_outstanding_one() {
    let ctx = TestContext::cluster(3);
    ctx.populate("overlap:", 90);
    for shard in &ctx.shards {
        shard.set_latency(Some(SLOW));
    }

    let session = ScanSession::new("overlap:*", 10);
    let (first, first_cancel) = ctx.driver.run_async(&session);
    let (second, _second_cancel) = ctx.driver.run_async(&session);
    assert!(first_cancel.is_cancelled());
    assert!(session.is_scanning());

    let (first, second): (Vec<_>, Vec<_>) = tokio::join!(first.collect(), second.collect());
    wait_idle(&session).await;

    let mut names = HashSet::new();
    for entry in first.into_iter().chain(second) {
        assert!(!entry.is_error());
        assert!(names.insert(entry.name.clone()), "{} emitted twice", entry.name);
    }
    assert!(!names.is_empty());
}

#[tokio::test]
async fn test_many_overlapping_rounds_never_stick() {
    let ctx = TestContext::standalone();
    ctx.populate("burst:", 500);
    ctx.shards[0].set_latency(Some(Duration::from_millis(5)));

    let session = ScanSession::new("burst:*", 25);
    let mut streams = Vec::new();
    for _ in 0..8 {
        let (stream, _cancel) = ctx.driver.run_async(&session);
        streams.push(stream);
    }
    for stream in streams {
        let _: Vec<_> = timeout(Duration::from_secs(5), stream.collect::<Vec<_>>())
            .await
            .expect("a superseded round never finished");
    }
    wait_idle(&session).await;
}

#[tokio::test]
async fn test_close_cancels_outstanding_rounds() {
    let ctx = TestContext::standalone();
    ctx.populate("close:", 50);
    ctx.shards[0].set_latency(Some(Duration::from_millis(200)));

    let session = ScanSession::new("close:*", 50);
    let (stream, _cancel) = ctx.driver.run_async(&session);
    ctx.conn.close().await.unwrap();

    let entries: Vec<_> = timeout(Duration::from_secs(1), stream.collect::<Vec<_>>())
        .await
        .expect("close did not end the round");
    assert!(entries.is_empty());
    assert!(!session.is_scanning());
    assert!(ctx.shards[0].is_closed());

    // Rounds started after close end immediately.
    let (stream, _cancel) = ctx.driver.run_async(&session);
    let entries: Vec<_> = stream.collect().await;
    assert!(entries.is_empty());
}

#[tokio::test]
async fn test_dropping_the_stream_ends_the_round() {
    let ctx = TestContext::standalone();
    ctx.populate("drop:", 300);

    let session = ScanSession::new("drop:*", 300);
    let driver = ctx.driver.clone().with_buffer(1);
    let (mut stream, _cancel) = driver.run_async(&session);
    assert!(stream.recv().await.is_some());
    drop(stream);

    wait_idle(&session).await;
    // Entries still queued in the driver are handed out again; at most the
    // one sitting in the stream's buffer is gone with the stream.
    let rest = ctx.rounds(&session, 1).await;
    assert!((298..=299).contains(&rest.len()), "{} keys left", rest.len());
}

#[tokio::test]
async fn test_try_recv_polls_without_blocking() {
    let ctx = TestContext::standalone();
    ctx.populate("poll:", 3);
    ctx.shards[0].set_latency(Some(SLOW));

    let session = ScanSession::new("poll:*", 10);
    let (mut stream, _cancel) = ctx.driver.run_async(&session);
    assert!(stream.try_recv().is_err());

    let mut received = 0;
    timeout(Duration::from_secs(2), async {
        loop {
            match stream.try_recv() {
                Ok(_) => received += 1,
                Err(tokio::sync::mpsc::error::TryRecvError::Disconnected) => break,
                Err(tokio::sync::mpsc::error::TryRecvError::Empty) => {
                    tokio::time::sleep(Duration::from_millis(5)).await
                }
            }
        }
    })
    .await
    .expect("round never finished");
    assert_eq!(received, 3);
}
