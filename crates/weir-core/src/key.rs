//! Partition-encoded keys.
//!
//! Every key minted on a partition carries that partition's id in its high
//! bits, so any receiver can route a key back to its origin without a side
//! lookup. The low bits are a monotonic per-partition counter, which keeps
//! key generation deterministic under replay.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of high bits reserved for the partition id.
pub const PARTITION_BITS: u32 = 13;

/// Number of low bits carrying the per-partition counter.
pub const COUNTER_BITS: u32 = 64 - PARTITION_BITS;

/// Largest representable partition id.
pub const MAX_PARTITION_ID: u32 = (1 << PARTITION_BITS) - 1;

/// Identifier of one partition of the cluster.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct PartitionId(pub u32);

impl fmt::Display for PartitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A 64-bit key with the originating partition id encoded in its high bits.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct Key(pub u64);

impl Key {
    /// Compose a key from its partition id and counter value.
    pub fn new(partition: PartitionId, counter: u64) -> Self {
        debug_assert!(partition.0 <= MAX_PARTITION_ID);
        debug_assert!(counter < (1 << COUNTER_BITS));
        Key(((partition.0 as u64) << COUNTER_BITS) | counter)
    }

    /// The partition this key was minted on.
    pub fn partition_id(self) -> PartitionId {
        PartitionId((self.0 >> COUNTER_BITS) as u32)
    }

    /// The per-partition counter value.
    pub fn counter(self) -> u64 {
        self.0 & ((1 << COUNTER_BITS) - 1)
    }

    /// Big-endian bytes, for ordered state store layouts.
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Monotonic key source for one partition.
///
/// Keys must never be minted from any other source; replaying the same
/// record sequence then regenerates the same keys.
#[derive(Debug)]
pub struct KeyGenerator {
    partition: PartitionId,
    next: u64,
}

impl KeyGenerator {
    /// A generator starting at counter value 1.
    pub fn new(partition: PartitionId) -> Self {
        Self { partition, next: 1 }
    }

    /// The partition this generator mints for.
    pub fn partition_id(&self) -> PartitionId {
        self.partition
    }

    /// Mint the next key.
    pub fn next_key(&mut self) -> Key {
        let key = Key::new(self.partition, self.next);
        self.next += 1;
        key
    }
}
