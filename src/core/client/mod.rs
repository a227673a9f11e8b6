// src/core/client/mod.rs

//! The transport side of the engine: everything needed to send pipelined
//! requests to one node of a store and read the replies back.

pub mod glob;
pub mod memory;
mod node;
mod shard;
mod stream;
pub mod uri;

pub use memory::{Fault, MemoryCluster, MemoryShard, MemoryValue};
pub use node::{ClientOptions, NodeClient};
pub use shard::{Shard, ShardRef};
pub use uri::ConnectionInfo;
