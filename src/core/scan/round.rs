// src/core/scan/round.rs

//! The per-shard work of one round: advancing the shard's cursor, fetching
//! metadata for the collected names in one pipeline, and merging the replies
//! into entries.

use super::cursor::CursorRegistry;
use super::entry::{KeyEntry, KeyType, Ttl};
use crate::core::KeyscopeError;
use crate::core::client::Shard;
use crate::core::protocol::{Cmd, RespFrame};
use bytes::Bytes;
use std::collections::HashSet;
use std::future::Future;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Metadata commands issued per name, in this order.
const COMMANDS_PER_KEY: usize = 3;

/// An entry found on a shard, on its way to the round's consumer.
#[derive(Debug)]
pub(crate) struct Discovered {
    pub(crate) shard: String,
    pub(crate) entry: KeyEntry,
}

/// Awaits `fut` unless `token` fires first, in which case `None` is returned
/// and `fut` is dropped.
pub(crate) async fn cancellable<T>(
    token: &CancellationToken,
    fut: impl Future<Output = T>,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => None,
        out = fut => Some(out),
    }
}

fn metadata_commands(names: &[Bytes]) -> Vec<Cmd> {
    names
        .iter()
        .flat_map(|name| {
            [
                Cmd::pttl(name.clone()),
                Cmd::key_type(name.clone()),
                Cmd::memory_usage(name.clone()),
            ]
        })
        .collect()
}

/// Looks up one literal key. `Ok(None)` means the key does not exist.
pub(crate) async fn exact_lookup(
    shard: &dyn Shard,
    key: &str,
) -> Result<Option<KeyEntry>, KeyscopeError> {
    let names = [Bytes::copy_from_slice(key.as_bytes())];
    let replies = shard.pipeline(metadata_commands(&names)).await?;
    Ok(merge_metadata(&names, replies)?.pop())
}

/// Pairs pipelined `PTTL`/`TYPE`/`MEMORY USAGE` replies back to the names they
/// were issued for. Names whose type is `none` vanished in the meantime and
/// are left out.
pub(crate) fn merge_metadata(
    names: &[Bytes],
    replies: Vec<RespFrame>,
) -> Result<Vec<KeyEntry>, KeyscopeError> {
    if replies.len() != names.len() * COMMANDS_PER_KEY {
        return Err(KeyscopeError::UnexpectedReply {
            command: "PTTL/TYPE/MEMORY USAGE".into(),
            reply: format!("{} replies for {} keys", replies.len(), names.len()),
        });
    }

    let mut entries = Vec::with_capacity(names.len());
    for (name, chunk) in names.iter().zip(replies.chunks(COMMANDS_PER_KEY)) {
        let [pttl, key_type, memory] = chunk else {
            continue;
        };

        let key_type = match key_type {
            RespFrame::Error(msg) => return Err(KeyscopeError::Server(msg.clone())),
            frame => match frame.as_text() {
                Some(tag) if tag == "none" => {
                    debug!("key {:?} vanished before its metadata was read", name);
                    continue;
                }
                Some(tag) => KeyType::parse(&tag),
                None => {
                    return Err(KeyscopeError::UnexpectedReply {
                        command: "TYPE".into(),
                        reply: format!("{frame:?}"),
                    });
                }
            },
        };

        let ttl = match pttl {
            RespFrame::Error(msg) => {
                warn!("PTTL failed for {:?}: {}", name, msg);
                Ttl::Unknown
            }
            frame => frame.as_integer().map_or(Ttl::Unknown, Ttl::from_pttl),
        };

        let size = match memory {
            RespFrame::Error(msg) => {
                warn!("MEMORY USAGE failed for {:?}: {}", name, msg);
                0
            }
            frame => frame
                .as_integer()
                .and_then(|n| u64::try_from(n).ok())
                .unwrap_or(0),
        };

        entries.push(KeyEntry::new(name.clone(), key_type, size, ttl));
    }
    Ok(entries)
}

/// Splits a `SCAN` reply into the next cursor and the batch of names. Names
/// are kept as the raw bytes the store sent.
pub(crate) fn parse_scan_reply(reply: RespFrame) -> Result<(u64, Vec<Bytes>), KeyscopeError> {
    let unexpected = |reply: &RespFrame| KeyscopeError::UnexpectedReply {
        command: "SCAN".into(),
        reply: format!("{reply:?}"),
    };
    let RespFrame::Array(parts) = &reply else {
        return Err(unexpected(&reply));
    };
    let (Some(cursor), Some(RespFrame::Array(batch))) = (parts.first(), parts.get(1)) else {
        return Err(unexpected(&reply));
    };
    let next = parse_cursor(cursor).ok_or_else(|| unexpected(&reply))?;
    let names = batch
        .iter()
        .filter_map(|name| match name {
            RespFrame::BulkString(b) => Some(b.clone()),
            RespFrame::SimpleString(s) => Some(Bytes::from(s.clone())),
            _ => None,
        })
        .collect();
    Ok((next, names))
}

/// Cursors are unsigned 64-bit values and may exceed `i64::MAX`.
fn parse_cursor(frame: &RespFrame) -> Option<u64> {
    match frame {
        RespFrame::BulkString(b) => std::str::from_utf8(b).ok()?.parse().ok(),
        RespFrame::SimpleString(s) => s.parse().ok(),
        RespFrame::Integer(i) => u64::try_from(*i).ok(),
        _ => None,
    }
}

/// Runs one round on one shard, forwarding merged entries to `merge_tx`.
///
/// A cancelled shard returns `Ok(())` after putting every name it took back
/// into the registry. An error also restores the names before it is returned.
pub(crate) async fn scan_shard(
    shard: &dyn Shard,
    pattern: &str,
    page_size: usize,
    registry: &CursorRegistry,
    token: &CancellationToken,
    merge_tx: &mpsc::UnboundedSender<Discovered>,
) -> Result<(), KeyscopeError> {
    let addr = shard.addr().to_string();
    let mut names = Vec::new();

    match collect_names(shard, pattern, page_size, registry, token, &mut names).await {
        Ok(true) => {}
        Ok(false) => {
            registry.restore(&addr, names);
            return Ok(());
        }
        Err(e) => {
            registry.restore(&addr, names);
            return Err(e);
        }
    }
    if names.is_empty() {
        return Ok(());
    }
    debug!("shard {}: fetching metadata for {} keys", addr, names.len());

    let replies = match cancellable(token, shard.pipeline(metadata_commands(&names))).await {
        None => {
            registry.restore(&addr, names);
            return Ok(());
        }
        Some(Err(e)) => {
            registry.restore(&addr, names);
            return Err(e);
        }
        Some(Ok(replies)) => replies,
    };
    let entries = match merge_metadata(&names, replies) {
        Ok(entries) => entries,
        Err(e) => {
            registry.restore(&addr, names);
            return Err(e);
        }
    };

    let mut entries = entries.into_iter();
    while let Some(entry) = entries.next() {
        let discovered = Discovered {
            shard: addr.clone(),
            entry,
        };
        if let Err(mpsc::error::SendError(lost)) = merge_tx.send(discovered) {
            let unsent = std::iter::once(lost.entry)
                .chain(entries)
                .map(|e| e.key)
                .collect();
            registry.restore(&addr, unsent);
            break;
        }
    }
    Ok(())
}

/// Fills `names` with up to `page_size` not-yet-emitted names, taking pending
/// names first and then stepping the cursor. Returns false if cancelled.
async fn collect_names(
    shard: &dyn Shard,
    pattern: &str,
    page_size: usize,
    registry: &CursorRegistry,
    token: &CancellationToken,
    names: &mut Vec<Bytes>,
) -> Result<bool, KeyscopeError> {
    let addr = shard.addr();
    let mut seen = HashSet::new();
    let mut take = |names: &mut Vec<Bytes>| {
        let wanted = page_size - names.len();
        for name in registry.take_pending(addr, wanted) {
            if seen.insert(name.clone()) {
                names.push(name);
            }
        }
    };

    take(names);
    while names.len() < page_size {
        let Some(cursor) = registry.next_cursor(addr) else {
            break;
        };
        let Some(reply) = cancellable(token, shard.query(Cmd::scan(cursor, pattern, page_size))).await
        else {
            return Ok(false);
        };
        let (next, batch) = parse_scan_reply(reply?)?;
        debug!(
            "shard {}: SCAN {} -> {} ({} names)",
            addr,
            cursor,
            next,
            batch.len()
        );
        registry.advance(addr, next, batch);
        take(names);
    }
    Ok(true)
}
