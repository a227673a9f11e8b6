// src/lib.rs

pub mod config;
pub mod connection;
pub mod core;

// Re-export
pub use crate::connection::Connection;
pub use crate::core::KeyscopeError;
pub use crate::core::scan::{KeyEntry, KeyType, ScanDriver, ScanSession, Ttl};
