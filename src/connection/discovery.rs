// src/connection/discovery.rs

//! Finding every primary of a cluster from a single seed node.

use crate::core::KeyscopeError;
use crate::core::client::{ClientOptions, ConnectionInfo, NodeClient, Shard, ShardRef};
use crate::core::cluster::{ShardMap, parse_cluster_slots};
use crate::core::protocol::Cmd;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Asks the seed for `CLUSTER SLOTS` and connects to every primary it lists.
/// The seed connection is reused when the seed is itself a primary, and
/// closed otherwise.
pub(super) async fn discover(
    seed: NodeClient,
    info: &ConnectionInfo,
    options: ClientOptions,
) -> Result<ShardMap, KeyscopeError> {
    let reply = seed
        .pipeline(vec![Cmd::new("CLUSTER").arg("SLOTS")])
        .await
        .map_err(|e| KeyscopeError::InvalidClusterTopology(e.to_string()))?
        .pop()
        .ok_or_else(|| KeyscopeError::InvalidClusterTopology("no reply to CLUSTER SLOTS".into()))?;
    let ranges = parse_cluster_slots(reply, &info.host)?;
    debug!("CLUSTER SLOTS returned {} slot ranges", ranges.len());

    let seed: ShardRef = Arc::new(seed);
    let mut seed_used = false;
    let mut nodes: HashMap<String, ShardRef> = HashMap::new();
    let mut assignments = Vec::with_capacity(ranges.len());

    for range in ranges {
        let node_info = info.for_node(&range.host, range.port);
        let addr = node_info.addr();
        let shard = match nodes.get(&addr) {
            Some(shard) => shard.clone(),
            None => {
                let shard: ShardRef = if addr == seed.addr() && info.db == 0 {
                    seed_used = true;
                    seed.clone()
                } else {
                    match NodeClient::connect(node_info, options).await {
                        Ok(client) => Arc::new(client),
                        Err(e) => {
                            close_all(nodes.values().chain(std::iter::once(&seed))).await;
                            return Err(KeyscopeError::InvalidClusterTopology(format!(
                                "cannot reach primary {addr}: {e}"
                            )));
                        }
                    }
                };
                nodes.insert(addr, shard.clone());
                shard
            }
        };
        assignments.push((shard, range.slots));
    }

    if !seed_used {
        debug!("seed {} is not a primary, closing it", seed.addr());
        close_all(std::iter::once(&seed)).await;
    }
    info!("discovered {} cluster primaries", nodes.len());
    Ok(ShardMap::new(assignments))
}

async fn close_all<'a>(shards: impl Iterator<Item = &'a ShardRef>) {
    for shard in shards {
        if let Err(e) = shard.close().await {
            warn!("failed to close {}: {}", shard.addr(), e);
        }
    }
}
