// src/connection/mod.rs

//! A handle to a store, standalone or clustered, shared by scan sessions and
//! value lookups.

mod discovery;

use crate::core::KeyscopeError;
use crate::core::client::{ClientOptions, ConnectionInfo, NodeClient, ShardRef};
use crate::core::cluster::ShardMap;
use crate::core::protocol::Cmd;
use crate::core::scan::KeyEntry;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug)]
enum Topology {
    Standalone(ShardRef),
    Cluster { seed: String, map: ShardMap },
}

#[derive(Debug)]
struct Inner {
    addr: String,
    topology: Topology,
    /// Parent of every round's cancellation token.
    shutdown: CancellationToken,
    closed: AtomicBool,
}

/// A connection to a standalone store or to every primary of a cluster.
///
/// Cheap to clone; all clones share the same underlying node connections.
#[derive(Debug, Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Connects with default timeouts. See [`Connection::open_with`].
    pub async fn open(uri: &str, cluster: bool) -> Result<Self, KeyscopeError> {
        Self::open_with(uri, cluster, ClientOptions::default()).await
    }

    /// Parses `uri`, connects, authenticates and selects the database. With
    /// `cluster` set, the node at `uri` is used as a seed to discover every
    /// primary through `CLUSTER SLOTS`.
    pub async fn open_with(
        uri: &str,
        cluster: bool,
        options: ClientOptions,
    ) -> Result<Self, KeyscopeError> {
        let info = ConnectionInfo::parse(uri)?;
        let seed = NodeClient::connect(info.clone(), options).await?;
        if !cluster {
            return Ok(Self::standalone(Arc::new(seed)));
        }
        let map = discovery::discover(seed, &info, options).await?;
        Ok(Self::cluster(info.addr(), map))
    }

    /// Wraps a single, already connected shard.
    pub fn standalone(shard: ShardRef) -> Self {
        let addr = shard.addr().to_string();
        Self::from_topology(addr, Topology::Standalone(shard))
    }

    /// Wraps the primaries of a cluster. `seed` is the address shown to users.
    pub fn cluster(seed: impl Into<String>, map: ShardMap) -> Self {
        let seed = seed.into();
        info!(
            "cluster connection via {} with {} primaries",
            seed,
            map.shards().len()
        );
        Self::from_topology(seed.clone(), Topology::Cluster { seed, map })
    }

    fn from_topology(addr: String, topology: Topology) -> Self {
        Self {
            inner: Arc::new(Inner {
                addr,
                topology,
                shutdown: CancellationToken::new(),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// The address of the node (or cluster seed) this connection was opened with.
    pub fn addr(&self) -> &str {
        &self.inner.addr
    }

    pub fn is_cluster(&self) -> bool {
        matches!(self.inner.topology, Topology::Cluster { .. })
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Every shard: the single node, or each cluster primary.
    pub fn shards(&self) -> Vec<ShardRef> {
        match &self.inner.topology {
            Topology::Standalone(shard) => vec![shard.clone()],
            Topology::Cluster { map, .. } => map.shards().to_vec(),
        }
    }

    /// The shard that owns `key`.
    pub fn shard_for_key(&self, key: impl AsRef<[u8]>) -> Result<ShardRef, KeyscopeError> {
        let key = key.as_ref();
        match &self.inner.topology {
            Topology::Standalone(shard) => Ok(shard.clone()),
            Topology::Cluster { seed, map } => map.shard_for_key(key).cloned().ok_or_else(|| {
                KeyscopeError::InvalidClusterTopology(format!(
                    "no primary known via {seed} serves the slot of '{}'",
                    String::from_utf8_lossy(key)
                ))
            }),
        }
    }

    /// Spawns `f` once per shard, each on its own task.
    pub fn spawn_per_shard<F, Fut>(&self, f: F) -> JoinSet<Result<(), KeyscopeError>>
    where
        F: Fn(ShardRef) -> Fut,
        Fut: Future<Output = Result<(), KeyscopeError>> + Send + 'static,
    {
        let mut workers = JoinSet::new();
        for shard in self.shards() {
            workers.spawn(f(shard));
        }
        workers
    }

    /// Runs `f` against every shard concurrently and waits for all of them.
    /// The first error is returned once every task has finished.
    pub async fn for_each_shard<F, Fut>(&self, f: F) -> Result<(), KeyscopeError>
    where
        F: Fn(ShardRef) -> Fut,
        Fut: Future<Output = Result<(), KeyscopeError>> + Send + 'static,
    {
        let mut workers = self.spawn_per_shard(f);
        let mut first_error = None;
        while let Some(joined) = workers.join_next().await {
            let outcome = joined.map_err(KeyscopeError::from).and_then(|r| r);
            if let Err(e) = outcome {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Number of keys in the selected database, summed over every primary in
    /// cluster mode.
    pub async fn total_key_count(&self) -> Result<i64, KeyscopeError> {
        let total = Arc::new(AtomicI64::new(0));
        self.for_each_shard(|shard| {
            let total = total.clone();
            async move {
                let reply = shard.query(Cmd::dbsize()).await?;
                let count = reply.as_integer().ok_or_else(|| KeyscopeError::UnexpectedReply {
                    command: "DBSIZE".into(),
                    reply: format!("{reply:?}"),
                })?;
                total.fetch_add(count, Ordering::Relaxed);
                Ok(())
            }
        })
        .await?;
        Ok(total.load(Ordering::Relaxed))
    }

    /// Reads the value of `entry` and renders it as markdown.
    pub async fn fetch_value(&self, entry: &KeyEntry) -> Result<String, KeyscopeError> {
        crate::core::value::fetch_value(self, entry).await
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.inner.shutdown
    }

    /// Cancels every outstanding round and closes every shard. Later calls
    /// do nothing. Every shard is closed even if some fail; the first failure
    /// is returned.
    pub async fn close(&self) -> Result<(), KeyscopeError> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            debug!("connection to {} already closed", self.inner.addr);
            return Ok(());
        }
        self.inner.shutdown.cancel();

        let mut first_error = None;
        for shard in self.shards() {
            if let Err(e) = shard.close().await {
                warn!("failed to close shard {}: {}", shard.addr(), e);
                first_error.get_or_insert(e);
            }
        }
        info!("connection to {} closed", self.inner.addr);
        first_error.map_or(Ok(()), Err)
    }
}
