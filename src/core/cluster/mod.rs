// src/core/cluster/mod.rs

//! Cluster support: hash slot calculation, primary discovery and routing.

pub mod slot;
pub mod topology;

pub use slot::{NUM_SLOTS, get_slot};
pub use topology::{ShardMap, SlotRange, parse_cluster_slots};
