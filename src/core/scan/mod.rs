// src/core/scan/mod.rs

//! The scan engine: resumable, pattern-scoped enumeration of keys across one
//! or more shards, delivered incrementally as [`KeyEntry`] values.

pub mod cursor;
mod driver;
pub mod entry;
mod guard;
mod round;
mod session;
pub mod throttle;

pub use cursor::{CursorRegistry, ShardCursor};
pub use driver::{ScanCancel, ScanDriver, ScanStream};
pub use entry::{KeyEntry, KeyType, Ttl};
pub use session::{ScanMode, ScanSession};
pub use throttle::{JitterDelay, Throttle};
