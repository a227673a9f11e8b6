// src/core/cluster/topology.rs

//! Discovery of cluster primaries from `CLUSTER SLOTS` and key routing.

use super::slot::{NUM_SLOTS, get_slot};
use crate::core::KeyscopeError;
use crate::core::client::ShardRef;
use crate::core::protocol::RespFrame;
use std::collections::BTreeMap;
use std::fmt;
use std::ops::RangeInclusive;

/// One contiguous slot range and the primary serving it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub slots: RangeInclusive<u16>,
    pub host: String,
    pub port: u16,
}

/// Parses a `CLUSTER SLOTS` reply.
///
/// Each element is `[start, end, [host, port, id, ...], replica...]`; only the
/// primary (the first node) is kept. An empty host means "the node you asked",
/// so `seed_host` is substituted.
pub fn parse_cluster_slots(
    reply: RespFrame,
    seed_host: &str,
) -> Result<Vec<SlotRange>, KeyscopeError> {
    let invalid = |what: &str| KeyscopeError::InvalidClusterTopology(what.to_string());

    let RespFrame::Array(entries) = reply.into_result().map_err(|e| invalid(&e.to_string()))?
    else {
        return Err(invalid("CLUSTER SLOTS did not return an array"));
    };

    let mut ranges = Vec::with_capacity(entries.len());
    for entry in entries {
        let RespFrame::Array(parts) = entry else {
            return Err(invalid("malformed slot range entry"));
        };
        let (Some(start), Some(end), Some(RespFrame::Array(primary))) =
            (parts.first(), parts.get(1), parts.get(2))
        else {
            return Err(invalid("slot range entry is missing its primary"));
        };

        let slot = |frame: &RespFrame| {
            frame
                .as_integer()
                .and_then(|i| u16::try_from(i).ok())
                .filter(|&s| (s as usize) < NUM_SLOTS)
                .ok_or_else(|| invalid("slot number out of range"))
        };
        let (start, end) = (slot(start)?, slot(end)?);
        if start > end {
            return Err(invalid("slot range start exceeds end"));
        }

        let host = match primary.first().and_then(RespFrame::as_text) {
            Some(h) if !h.is_empty() && h != "?" => h,
            _ => seed_host.to_string(),
        };
        let port = primary
            .get(1)
            .and_then(RespFrame::as_integer)
            .and_then(|p| u16::try_from(p).ok())
            .ok_or_else(|| invalid("primary port missing or invalid"))?;

        ranges.push(SlotRange {
            slots: start..=end,
            host,
            port,
        });
    }

    if ranges.is_empty() {
        return Err(invalid("no slots are assigned to any primary"));
    }
    Ok(ranges)
}

/// The set of primaries of a cluster and the slot-to-primary mapping.
#[derive(Clone)]
pub struct ShardMap {
    shards: Vec<ShardRef>,
    /// Index into `shards` for every slot; `None` while a slot is unassigned.
    owners: Vec<Option<usize>>,
}

impl fmt::Debug for ShardMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let assigned = self.owners.iter().filter(|o| o.is_some()).count();
        f.debug_struct("ShardMap")
            .field(
                "shards",
                &self.shards.iter().map(|s| s.addr()).collect::<Vec<_>>(),
            )
            .field("assigned_slots", &assigned)
            .finish()
    }
}

impl ShardMap {
    /// Builds the map from shards and the slot ranges each one serves. A shard
    /// listed more than once (several ranges) is kept once, by address.
    pub fn new(ranges: Vec<(ShardRef, RangeInclusive<u16>)>) -> Self {
        let mut by_addr: BTreeMap<String, usize> = BTreeMap::new();
        let mut shards: Vec<ShardRef> = Vec::new();
        let mut owners = vec![None; NUM_SLOTS];

        for (shard, slots) in ranges {
            let idx = *by_addr.entry(shard.addr().to_string()).or_insert_with(|| {
                shards.push(shard.clone());
                shards.len() - 1
            });
            for slot in slots {
                if let Some(owner) = owners.get_mut(slot as usize) {
                    *owner = Some(idx);
                }
            }
        }
        Self { shards, owners }
    }

    pub fn shards(&self) -> &[ShardRef] {
        &self.shards
    }

    pub fn shard_for_slot(&self, slot: u16) -> Option<&ShardRef> {
        let idx = (*self.owners.get(slot as usize)?)?;
        self.shards.get(idx)
    }

    pub fn shard_for_key(&self, key: &[u8]) -> Option<&ShardRef> {
        self.shard_for_slot(get_slot(key))
    }
}
