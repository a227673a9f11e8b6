// src/core/mod.rs

//! The central module containing the scan engine and everything it is built on.

pub mod client;
pub mod cluster;
pub mod errors;
pub mod protocol;
pub mod scan;
pub mod value;

pub use errors::KeyscopeError;
pub use protocol::RespFrame;
