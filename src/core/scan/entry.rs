// src/core/scan/entry.rs

use crate::core::KeyscopeError;
use bytes::Bytes;
use std::fmt;
use std::time::Duration;

/// The data type of a key, as reported by `TYPE`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum KeyType {
    String,
    List,
    Set,
    SortedSet,
    Hash,
    /// Sentinel for entries that carry an error message instead of a key.
    Error,
    /// Any other tag the store reports (`stream`, module types, ...).
    Other(String),
}

impl KeyType {
    pub fn parse(tag: &str) -> Self {
        match tag {
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::SortedSet,
            "hash" => KeyType::Hash,
            "error" => KeyType::Error,
            other => KeyType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            KeyType::String => "string",
            KeyType::List => "list",
            KeyType::Set => "set",
            KeyType::SortedSet => "zset",
            KeyType::Hash => "hash",
            KeyType::Error => "error",
            KeyType::Other(tag) => tag,
        }
    }
}

impl fmt::Display for KeyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Remaining lifetime of a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    NoExpiry,
    Expires(Duration),
    /// The store reported the key as missing (it expired or was deleted
    /// while being scanned) or the lifetime could not be read.
    Unknown,
}

impl Ttl {
    /// Interprets a `PTTL` reply: `-1` means no expiry, `-2` a missing key.
    pub fn from_pttl(millis: i64) -> Self {
        match millis {
            -1 => Ttl::NoExpiry,
            ms if ms >= 0 => Ttl::Expires(Duration::from_millis(ms as u64)),
            _ => Ttl::Unknown,
        }
    }
}

/// Metadata about one discovered key. Entries are never changed after they
/// are handed to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEntry {
    /// The key exactly as stored. Key names are binary-safe; use this for
    /// every request about the key.
    pub key: Bytes,
    /// `key` for display, with invalid UTF-8 replaced.
    pub name: String,
    pub key_type: KeyType,
    /// Approximate footprint in bytes; `0` when unknown.
    pub size: u64,
    pub ttl: Ttl,
}

impl KeyEntry {
    pub fn new(key: impl Into<Bytes>, key_type: KeyType, size: u64, ttl: Ttl) -> Self {
        let key = key.into();
        Self {
            name: String::from_utf8_lossy(&key).into_owned(),
            key,
            key_type,
            size,
            ttl,
        }
    }

    /// The sentinel entry reporting a failed round: the name carries the error text.
    pub fn error(err: &KeyscopeError) -> Self {
        Self::new(err.to_string(), KeyType::Error, 0, Ttl::NoExpiry)
    }

    pub fn is_error(&self) -> bool {
        self.key_type == KeyType::Error
    }

    /// `∞` for keys without expiry, otherwise the remaining time to the second.
    pub fn ttl_string(&self) -> String {
        match self.ttl {
            Ttl::NoExpiry => "∞".to_string(),
            Ttl::Unknown => "?".to_string(),
            Ttl::Expires(d) if d < Duration::from_secs(1) => "<1s".to_string(),
            Ttl::Expires(d) => {
                humantime::format_duration(Duration::from_secs(d.as_secs())).to_string()
            }
        }
    }

    /// Human-readable size using decimal units, e.g. `82 B`, `1.2 kB`, `34 MB`.
    pub fn size_string(&self) -> String {
        const UNITS: [&str; 6] = ["B", "kB", "MB", "GB", "TB", "PB"];
        if self.size < 1000 {
            return format!("{} B", self.size);
        }
        let mut value = self.size as f64;
        let mut unit = 0;
        while value >= 1000.0 && unit < UNITS.len() - 1 {
            value /= 1000.0;
            unit += 1;
        }
        if value < 10.0 {
            format!("{value:.1} {}", UNITS[unit])
        } else {
            format!("{value:.0} {}", UNITS[unit])
        }
    }
}

impl fmt::Display for KeyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.key_type)
    }
}
