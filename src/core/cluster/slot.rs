// src/core/cluster/slot.rs

//! Implements the cluster hash slot algorithm.

use crc::{CRC_16_XMODEM, Crc};

/// The total number of hash slots in a cluster.
pub const NUM_SLOTS: usize = 16384;

/// The CRC16 variant (XMODEM) that cluster nodes use to assign keys to slots.
const CRC16_ALGO: Crc<u16> = Crc::<u16>::new(&CRC_16_XMODEM);

/// Calculates the hash slot for a given key.
///
/// If the key contains a non-empty hash tag (`{...}`), only the tag is
/// hashed, so `user:{42}:name` and `user:{42}:email` share a slot.
pub fn get_slot(key: &[u8]) -> u16 {
    if let Some(start) = key.iter().position(|&b| b == b'{')
        && let Some(end_offset) = key[start + 1..].iter().position(|&b| b == b'}')
        && end_offset > 0
    {
        let end = start + 1 + end_offset;
        return CRC16_ALGO.checksum(&key[start + 1..end]) % (NUM_SLOTS as u16);
    }
    CRC16_ALGO.checksum(key) % (NUM_SLOTS as u16)
}
