// src/core/scan/cursor.rs

//! Per-shard continuation state for one scan session.

use bytes::Bytes;
use dashmap::{DashMap, DashSet};
use std::collections::VecDeque;
use tracing::debug;

/// Where one shard's enumeration stands.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShardCursor {
    /// The cursor to resume from; `None` until the shard is first contacted.
    cursor: Option<u64>,
    /// Names returned by `SCAN` but not yet handed out by a round.
    pending: VecDeque<Bytes>,
    /// Set once the store answers with cursor `0`.
    exhausted: bool,
}

impl ShardCursor {
    pub fn position(&self) -> Option<u64> {
        self.cursor
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// True when the store has no more keys for this shard and nothing is
    /// left to hand out.
    pub fn is_drained(&self) -> bool {
        self.exhausted && self.pending.is_empty()
    }
}

/// Tracks, per shard address, the continuation cursor of a session's
/// enumeration, plus the keys the session already emitted. Keys are raw
/// bytes, compared byte for byte.
///
/// Every mutation is a short synchronous critical section on one shard's
/// entry; no lock is held across a network round trip.
#[derive(Debug, Default)]
pub struct CursorRegistry {
    shards: DashMap<String, ShardCursor>,
    emitted: DashSet<Bytes>,
}

impl CursorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A copy of one shard's state, if the shard has been contacted.
    pub fn get(&self, addr: &str) -> Option<ShardCursor> {
        self.shards.get(addr).map(|c| c.clone())
    }

    /// The cursor for the next `SCAN` on this shard: `Some(0)` on first
    /// contact, `None` once the shard's keyspace is exhausted.
    pub fn next_cursor(&self, addr: &str) -> Option<u64> {
        let cursor = self.shards.entry(addr.to_string()).or_default();
        (!cursor.exhausted).then(|| cursor.cursor.unwrap_or(0))
    }

    /// Takes up to `max` pending names, skipping any already emitted.
    pub fn take_pending(&self, addr: &str, max: usize) -> Vec<Bytes> {
        let mut cursor = self.shards.entry(addr.to_string()).or_default();
        let mut taken = Vec::new();
        while taken.len() < max {
            let Some(name) = cursor.pending.pop_front() else {
                break;
            };
            if !self.emitted.contains(&name) && !taken.contains(&name) {
                taken.push(name);
            }
        }
        taken
    }

    /// Records the result of one `SCAN` step.
    pub fn advance<I>(&self, addr: &str, next: u64, batch: I)
    where
        I: IntoIterator,
        I::Item: Into<Bytes>,
    {
        let mut cursor = self.shards.entry(addr.to_string()).or_default();
        cursor.cursor = Some(next);
        cursor.exhausted = next == 0;
        cursor.pending.extend(batch.into_iter().map(Into::into));
        if cursor.exhausted {
            debug!("shard {} exhausted its keyspace", addr);
        }
    }

    /// Puts names that were taken but never emitted back at the front of the
    /// queue, in their original order.
    pub fn restore(&self, addr: &str, names: Vec<Bytes>) {
        if names.is_empty() {
            return;
        }
        let mut cursor = self.shards.entry(addr.to_string()).or_default();
        for name in names.into_iter().rev() {
            cursor.pending.push_front(name);
        }
    }

    /// Marks a key as emitted. Returns false if it already was.
    pub fn mark_emitted(&self, key: &Bytes) -> bool {
        self.emitted.insert(key.clone())
    }

    pub fn is_emitted(&self, key: impl AsRef<[u8]>) -> bool {
        self.emitted.contains(key.as_ref())
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }

    /// Number of shards contacted so far.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// True when at least one shard was contacted and all contacted shards
    /// are drained.
    pub fn all_drained(&self) -> bool {
        !self.shards.is_empty() && self.shards.iter().all(|c| c.is_drained())
    }
}
