// tests/integration/test_helpers.rs

//! Test helpers and utilities for integration tests

#![allow(dead_code)]

use futures::StreamExt;
use keyscope::core::client::{MemoryCluster, MemoryShard, ShardRef};
use keyscope::{Connection, KeyEntry, ScanDriver, ScanSession};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// TestContext provides a scan engine wired to an in-memory store
pub struct TestContext {
    pub conn: Connection,
    pub driver: ScanDriver,
    /// Every shard backing the connection, in address order
    pub shards: Vec<Arc<MemoryShard>>,
    cluster: Option<MemoryCluster>,
}

impl TestContext {
    /// Creates a context backed by a single standalone shard
    pub fn standalone() -> Self {
        init_tracing();
        let shard = Arc::new(MemoryShard::new("127.0.0.1:6379"));
        let conn = Connection::standalone(shard.clone() as ShardRef);
        Self {
            driver: ScanDriver::new(conn.clone()),
            conn,
            shards: vec![shard],
            cluster: None,
        }
    }

    /// Creates a context backed by `shard_count` primaries splitting the slots evenly
    pub fn cluster(shard_count: usize) -> Self {
        init_tracing();
        let cluster = MemoryCluster::new(shard_count);
        let conn = Connection::cluster("10.0.0.1:7000", cluster.shard_map());
        Self {
            driver: ScanDriver::new(conn.clone()),
            conn,
            shards: cluster.shards().to_vec(),
            cluster: Some(cluster),
        }
    }

    /// The shard that stores `key`
    pub fn shard_for(&self, key: &str) -> &Arc<MemoryShard> {
        match &self.cluster {
            Some(cluster) => cluster.shard_for_key(key),
            None => &self.shards[0],
        }
    }

    pub fn set(&self, key: &str, value: &str) {
        self.shard_for(key).set(key.to_string(), value.to_string());
    }

    /// Stores `count` string keys named `{prefix}0` .. `{prefix}{count-1}`
    pub fn populate(&self, prefix: &str, count: usize) {
        for i in 0..count {
            self.set(&format!("{prefix}{i}"), &format!("value-{i}"));
        }
    }

    /// Runs one round to completion and returns everything it emitted
    pub async fn round(&self, session: &ScanSession) -> Vec<KeyEntry> {
        let (stream, _cancel) = self.driver.run_async(session);
        stream.collect().await
    }

    /// Runs `rounds` rounds and returns the distinct names found
    pub async fn rounds(&self, session: &ScanSession, rounds: usize) -> Vec<String> {
        let mut names = Vec::new();
        for _ in 0..rounds {
            for entry in self.round(session).await {
                assert!(!entry.is_error(), "unexpected error entry: {}", entry.name);
                names.push(entry.name);
            }
        }
        names
    }
}

/// Installs a test-friendly subscriber once; later calls are ignored
pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::new("warn"))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
