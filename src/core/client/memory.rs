// src/core/client/memory.rs

//! An in-process store that answers the same request frames as a real node.
//!
//! Used by the test suite and benchmarks to drive the scan engine without a
//! server. Supports fault injection and artificial latency so cancellation
//! and failure paths can be exercised deterministically.

use super::glob::glob_match;
use super::shard::{Shard, ShardRef};
use crate::core::KeyscopeError;
use crate::core::cluster::{NUM_SLOTS, ShardMap, get_slot};
use crate::core::protocol::{Cmd, RespFrame};
use async_trait::async_trait;
use bytes::Bytes;
use ordered_float::OrderedFloat;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// A value held by the in-memory store.
#[derive(Debug, Clone, PartialEq)]
pub enum MemoryValue {
    String(Bytes),
    List(Vec<Bytes>),
    Set(BTreeSet<Bytes>),
    SortedSet(BTreeSet<(OrderedFloat<f64>, Bytes)>),
    Hash(HashMap<Bytes, Bytes>),
    /// A type the engine does not render, reported by `TYPE` as `stream`.
    Stream,
}

impl MemoryValue {
    fn type_name(&self) -> &'static str {
        match self {
            MemoryValue::String(_) => "string",
            MemoryValue::List(_) => "list",
            MemoryValue::Set(_) => "set",
            MemoryValue::SortedSet(_) => "zset",
            MemoryValue::Hash(_) => "hash",
            MemoryValue::Stream => "stream",
        }
    }

    /// A rough per-value footprint, in the spirit of `MEMORY USAGE`.
    fn approximate_size(&self) -> usize {
        const OVERHEAD: usize = 16;
        match self {
            MemoryValue::String(b) => b.len(),
            MemoryValue::List(items) => items.iter().map(|b| b.len() + OVERHEAD).sum(),
            MemoryValue::Set(items) => items.iter().map(|b| b.len() + OVERHEAD).sum(),
            MemoryValue::SortedSet(items) => items.iter().map(|(_, m)| m.len() + 8 + OVERHEAD).sum(),
            MemoryValue::Hash(map) => map.iter().map(|(f, v)| f.len() + v.len() + OVERHEAD).sum(),
            MemoryValue::Stream => 64,
        }
    }
}

/// A failure to inject for a given command name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// The command gets an error reply; the rest of the pipeline succeeds.
    Reply(String),
    /// The whole round trip fails, as if the connection dropped.
    Transport(String),
}

#[derive(Debug)]
struct StoredValue {
    value: MemoryValue,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// A single in-memory node.
#[derive(Debug)]
pub struct MemoryShard {
    addr: String,
    keys: Mutex<BTreeMap<Bytes, StoredValue>>,
    faults: Mutex<HashMap<String, Fault>>,
    latency: Mutex<Option<Duration>>,
    round_trips: AtomicUsize,
    closed: AtomicBool,
}

impl MemoryShard {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            keys: Mutex::new(BTreeMap::new()),
            faults: Mutex::new(HashMap::new()),
            latency: Mutex::new(None),
            round_trips: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Stores `value` under `key`. Keys are binary-safe.
    pub fn insert(&self, key: impl AsRef<[u8]>, value: MemoryValue) {
        self.keys.lock().insert(
            Bytes::copy_from_slice(key.as_ref()),
            StoredValue {
                value,
                expires_at: None,
            },
        );
    }

    pub fn set(&self, key: impl AsRef<[u8]>, value: impl Into<Bytes>) {
        self.insert(key, MemoryValue::String(value.into()));
    }

    pub fn rpush(&self, key: impl AsRef<[u8]>, items: &[&str]) {
        let items = items.iter().map(|s| Bytes::from(s.to_string())).collect();
        self.insert(key, MemoryValue::List(items));
    }

    pub fn sadd(&self, key: impl AsRef<[u8]>, members: &[&str]) {
        let members = members.iter().map(|s| Bytes::from(s.to_string())).collect();
        self.insert(key, MemoryValue::Set(members));
    }

    pub fn zadd(&self, key: impl AsRef<[u8]>, members: &[(f64, &str)]) {
        let members = members
            .iter()
            .map(|(score, m)| (OrderedFloat(*score), Bytes::from(m.to_string())))
            .collect();
        self.insert(key, MemoryValue::SortedSet(members));
    }

    pub fn hset(&self, key: impl AsRef<[u8]>, fields: &[(&str, &str)]) {
        let fields = fields
            .iter()
            .map(|(f, v)| (Bytes::from(f.to_string()), Bytes::from(v.to_string())))
            .collect();
        self.insert(key, MemoryValue::Hash(fields));
    }

    /// Sets a time to live on an existing key. Returns false if the key is absent.
    pub fn expire(&self, key: impl AsRef<[u8]>, ttl: Duration) -> bool {
        match self.keys.lock().get_mut(key.as_ref()) {
            Some(stored) => {
                stored.expires_at = Some(Instant::now() + ttl);
                true
            }
            None => false,
        }
    }

    pub fn del(&self, key: impl AsRef<[u8]>) -> bool {
        self.keys.lock().remove(key.as_ref()).is_some()
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.keys.lock().values().filter(|v| v.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Injects a fault for every later command with this name (case-insensitive).
    pub fn fail_command(&self, command: &str, fault: Fault) {
        self.faults.lock().insert(command.to_ascii_uppercase(), fault);
    }

    pub fn clear_faults(&self) {
        self.faults.lock().clear();
    }

    /// Delays every round trip by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.lock() = latency;
    }

    /// Number of pipelines served so far.
    pub fn round_trips(&self) -> usize {
        self.round_trips.load(Ordering::Relaxed)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn execute(&self, args: &[Bytes]) -> RespFrame {
        let Some(name) = args.first().map(|s| command_name(s)) else {
            return RespFrame::Error("ERR empty command".into());
        };
        if let Some(Fault::Reply(msg)) = self.faults.lock().get(&name) {
            return RespFrame::Error(msg.clone());
        }

        let now = Instant::now();
        let mut keys = self.keys.lock();
        keys.retain(|_, v| v.is_live(now));
        let lookup = |i: usize| args.get(i).and_then(|k| keys.get(k));

        match (name.as_str(), args.len()) {
            ("PING", _) => RespFrame::SimpleString("PONG".into()),
            ("AUTH" | "SELECT", _) => RespFrame::SimpleString("OK".into()),
            ("DBSIZE", 1) => RespFrame::Integer(keys.len() as i64),
            ("SCAN", n) if n >= 2 => scan(&keys, &args[1..]),
            ("PTTL", 2) => RespFrame::Integer(match lookup(1) {
                None => -2,
                Some(StoredValue { expires_at: None, .. }) => -1,
                Some(StoredValue {
                    expires_at: Some(at),
                    ..
                }) => at.saturating_duration_since(now).as_millis() as i64,
            }),
            ("TYPE", 2) => RespFrame::SimpleString(
                lookup(1).map_or("none", |v| v.value.type_name()).into(),
            ),
            ("MEMORY", 3) if args[1].eq_ignore_ascii_case(b"USAGE") => match lookup(2) {
                Some(v) => RespFrame::Integer((args[2].len() + 48 + v.value.approximate_size()) as i64),
                None => RespFrame::Null,
            },
            ("GET", 2) => match lookup(1).map(|v| &v.value) {
                None => RespFrame::Null,
                Some(MemoryValue::String(b)) => RespFrame::BulkString(b.clone()),
                Some(_) => wrong_type(),
            },
            ("LRANGE", 4) => match lookup(1).map(|v| &v.value) {
                None => RespFrame::Array(vec![]),
                Some(MemoryValue::List(items)) => match range_bounds(&args[2], &args[3], items.len()) {
                    Some(range) => bulk_array(items[range].iter().cloned()),
                    None => RespFrame::Array(vec![]),
                },
                Some(_) => wrong_type(),
            },
            ("SMEMBERS", 2) => match lookup(1).map(|v| &v.value) {
                None => RespFrame::Array(vec![]),
                // Report members in a scrambled but stable order, like a hash table would.
                Some(MemoryValue::Set(members)) => {
                    let mut members: Vec<_> = members.iter().cloned().collect();
                    members.sort_by_key(|m| get_slot(m));
                    bulk_array(members)
                }
                Some(_) => wrong_type(),
            },
            ("ZRANGE", 4 | 5) => match lookup(1).map(|v| &v.value) {
                None => RespFrame::Array(vec![]),
                Some(MemoryValue::SortedSet(members)) => {
                    let with_scores = args
                        .get(4)
                        .is_some_and(|a| a.eq_ignore_ascii_case(b"WITHSCORES"));
                    let members: Vec<_> = members.iter().collect();
                    let Some(range) = range_bounds(&args[2], &args[3], members.len()) else {
                        return RespFrame::Array(vec![]);
                    };
                    let mut out = Vec::new();
                    for (score, member) in &members[range] {
                        out.push(RespFrame::BulkString(member.clone()));
                        if with_scores {
                            out.push(RespFrame::BulkString(score.to_string().into()));
                        }
                    }
                    RespFrame::Array(out)
                }
                Some(_) => wrong_type(),
            },
            ("HGETALL", 2) => match lookup(1).map(|v| &v.value) {
                None => RespFrame::Array(vec![]),
                Some(MemoryValue::Hash(map)) => bulk_array(
                    map.iter()
                        .flat_map(|(f, v)| [f.clone(), v.clone()]),
                ),
                Some(_) => wrong_type(),
            },
            _ => RespFrame::Error(format!(
                "ERR unknown command or wrong number of arguments for '{}'",
                String::from_utf8_lossy(&args[0])
            )),
        }
    }
}

#[async_trait]
impl Shard for MemoryShard {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn pipeline(&self, cmds: Vec<Cmd>) -> Result<Vec<RespFrame>, KeyscopeError> {
        if self.is_closed() {
            return Err(KeyscopeError::Closed);
        }
        let latency = *self.latency.lock();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        self.round_trips.fetch_add(1, Ordering::Relaxed);

        let requests: Vec<Vec<Bytes>> = cmds.into_iter().map(decode_request).collect();
        for args in &requests {
            let name = args.first().map(|s| command_name(s)).unwrap_or_default();
            if let Some(Fault::Transport(msg)) = self.faults.lock().get(&name) {
                return Err(KeyscopeError::Transport(msg.clone()));
            }
        }
        Ok(requests.iter().map(|args| self.execute(args)).collect())
    }

    async fn close(&self) -> Result<(), KeyscopeError> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

fn decode_request(cmd: Cmd) -> Vec<Bytes> {
    match RespFrame::from(cmd) {
        RespFrame::Array(parts) => parts
            .into_iter()
            .filter_map(|part| match part {
                RespFrame::BulkString(b) => Some(b),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn command_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_uppercase()
}

fn parse_arg<T: std::str::FromStr>(raw: &[u8]) -> Option<T> {
    std::str::from_utf8(raw).ok()?.parse().ok()
}

/// `SCAN cursor [MATCH pattern] [COUNT count]`.
///
/// The cursor is a position in key order, and `COUNT` bounds the number of
/// keys examined rather than returned, so a selective pattern can produce
/// short or empty batches while the cursor keeps moving.
fn scan(keys: &BTreeMap<Bytes, StoredValue>, args: &[Bytes]) -> RespFrame {
    let Some(cursor) = parse_arg::<usize>(&args[0]) else {
        return RespFrame::Error("ERR invalid cursor".into());
    };
    let mut pattern: Option<&[u8]> = None;
    let mut count = 10usize;
    for option in args[1..].chunks(2) {
        match (command_name(&option[0]).as_str(), option.get(1)) {
            ("MATCH", Some(p)) => pattern = Some(&p[..]),
            ("COUNT", Some(c)) => match parse_arg::<usize>(c) {
                Some(c) if c > 0 => count = c,
                _ => return RespFrame::Error("ERR syntax error".into()),
            },
            _ => return RespFrame::Error("ERR syntax error".into()),
        }
    }

    let examined: Vec<&Bytes> = keys.keys().skip(cursor).take(count).collect();
    let next = if cursor + examined.len() >= keys.len() {
        0
    } else {
        cursor + examined.len()
    };
    let batch = examined
        .into_iter()
        .filter(|k| pattern.is_none_or(|p| glob_match(p, k)))
        .map(|k| RespFrame::BulkString(k.clone()))
        .collect();

    RespFrame::Array(vec![
        RespFrame::BulkString(next.to_string().into()),
        RespFrame::Array(batch),
    ])
}

/// Resolves `LRANGE`-style inclusive, possibly negative, indices.
fn range_bounds(start: &[u8], stop: &[u8], len: usize) -> Option<std::ops::Range<usize>> {
    let len = len as i64;
    let resolve = |raw: &[u8]| -> Option<i64> {
        let i = parse_arg::<i64>(raw)?;
        Some(if i < 0 { len + i } else { i })
    };
    let start = resolve(start)?.max(0);
    let stop = resolve(stop)?.min(len - 1);
    (start <= stop).then(|| start as usize..stop as usize + 1)
}

fn bulk_array(items: impl IntoIterator<Item = Bytes>) -> RespFrame {
    RespFrame::Array(items.into_iter().map(RespFrame::BulkString).collect())
}

fn wrong_type() -> RespFrame {
    RespFrame::Error("WRONGTYPE Operation against a key holding the wrong kind of value".into())
}

/// A set of in-memory shards with hash slots split evenly between them.
#[derive(Debug, Clone)]
pub struct MemoryCluster {
    shards: Vec<Arc<MemoryShard>>,
}

impl MemoryCluster {
    pub fn new(shard_count: usize) -> Self {
        let shards = (0..shard_count.max(1))
            .map(|i| Arc::new(MemoryShard::new(format!("10.0.0.{}:7000", i + 1))))
            .collect();
        Self { shards }
    }

    pub fn shards(&self) -> &[Arc<MemoryShard>] {
        &self.shards
    }

    /// The shard owning the key's hash slot.
    pub fn shard_for_key(&self, key: impl AsRef<[u8]>) -> &Arc<MemoryShard> {
        let slot = get_slot(key.as_ref()) as usize;
        &self.shards[slot * self.shards.len() / NUM_SLOTS]
    }

    pub fn set(&self, key: impl AsRef<[u8]>, value: impl Into<Bytes>) {
        let key = key.as_ref();
        self.shard_for_key(key).set(key, value);
    }

    /// Slot ownership matching `shard_for_key`.
    pub fn shard_map(&self) -> ShardMap {
        let n = self.shards.len();
        let ranges = self
            .shards
            .iter()
            .enumerate()
            .map(|(i, shard)| {
                let start = (i * NUM_SLOTS).div_ceil(n) as u16;
                let end = (((i + 1) * NUM_SLOTS).div_ceil(n) - 1) as u16;
                (shard.clone() as ShardRef, start..=end)
            })
            .collect();
        ShardMap::new(ranges)
    }
}
