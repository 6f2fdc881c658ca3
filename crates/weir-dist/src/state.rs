//! Distribution-tracking state.
//!
//! Lives in the same keyed store as the engine state, under its own column
//! tags. Pending pairs are laid out `(distribution key, partition)` so one
//! prefix scan yields a distribution's remaining partitions and a full-column
//! scan yields everything still undelivered.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use weir_core::{Key, PartitionId, StateStore};

use crate::error::DistributionError;
use crate::record::{DistributedCommand, FollowUpCommand};

const COL_DISTRIBUTION: u8 = 0x40;
const COL_PENDING: u8 = 0x41;
const COL_APPLIED: u8 = 0x42;

/// Persisted distribution bookkeeping on the origin partition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredDistribution {
    /// Distribution key
    pub key: Key,

    /// The command being replicated
    pub command: DistributedCommand,

    /// Follow-up appended exactly once when the distribution completes
    pub follow_up: Option<FollowUpCommand>,

    /// Whether finishing waits on an external continuation
    pub parked: bool,

    /// Whether every acknowledgement arrived while parked
    pub awaiting_continuation: bool,
}

/// Typed access to distribution state.
#[derive(Clone)]
pub struct DistributionState {
    store: Arc<dyn StateStore>,
}

impl DistributionState {
    /// Wrap a raw store.
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self { store }
    }

    /// Store distribution bookkeeping.
    pub fn put_distribution(&self, dist: &StoredDistribution) -> Result<(), DistributionError> {
        self.store
            .put(&distribution_key(dist.key), serde_json::to_vec(dist)?)
            .map_err(DistributionError::from)
    }

    /// Read distribution bookkeeping.
    pub fn distribution(&self, key: Key) -> Result<Option<StoredDistribution>, DistributionError> {
        match self.store.get(&distribution_key(key))? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Drop distribution bookkeeping once finished.
    pub fn delete_distribution(&self, key: Key) -> Result<(), DistributionError> {
        self.store
            .delete(&distribution_key(key))
            .map_err(DistributionError::from)
    }

    /// Record that a partition has not yet acknowledged.
    pub fn add_pending(&self, key: Key, partition: PartitionId) -> Result<(), DistributionError> {
        self.store
            .put(&pending_key(key, partition), Vec::new())
            .map_err(DistributionError::from)
    }

    /// Whether the pair is still pending.
    pub fn is_pending(&self, key: Key, partition: PartitionId) -> Result<bool, DistributionError> {
        Ok(self.store.get(&pending_key(key, partition))?.is_some())
    }

    /// Remove an acknowledged pair.
    pub fn remove_pending(&self, key: Key, partition: PartitionId) -> Result<(), DistributionError> {
        self.store
            .delete(&pending_key(key, partition))
            .map_err(DistributionError::from)
    }

    /// Partitions still pending for one distribution.
    pub fn pending_for(&self, key: Key) -> Result<Vec<PartitionId>, DistributionError> {
        let prefix = {
            let mut p = vec![COL_PENDING];
            p.extend_from_slice(&key.to_bytes());
            p
        };
        Ok(self
            .store
            .scan_prefix(&prefix)?
            .into_iter()
            .filter_map(|(k, _)| decode_partition(&k))
            .collect())
    }

    /// Every pending `(distribution key, partition)` pair on this origin.
    pub fn all_pending(&self) -> Result<Vec<(Key, PartitionId)>, DistributionError> {
        Ok(self
            .store
            .scan_prefix(&[COL_PENDING])?
            .into_iter()
            .filter_map(|(k, _)| {
                let partition = decode_partition(&k)?;
                let mut key_bytes = [0u8; 8];
                key_bytes.copy_from_slice(&k[1..9]);
                Some((Key(u64::from_be_bytes(key_bytes)), partition))
            })
            .collect())
    }

    /// Mark a distributed command as applied on the receiving partition.
    pub fn mark_applied(&self, key: Key) -> Result<(), DistributionError> {
        let mut k = vec![COL_APPLIED];
        k.extend_from_slice(&key.to_bytes());
        self.store.put(&k, Vec::new()).map_err(DistributionError::from)
    }

    /// Whether a distributed command was already applied here.
    pub fn is_applied(&self, key: Key) -> Result<bool, DistributionError> {
        let mut k = vec![COL_APPLIED];
        k.extend_from_slice(&key.to_bytes());
        Ok(self.store.get(&k)?.is_some())
    }
}

fn distribution_key(key: Key) -> Vec<u8> {
    let mut k = vec![COL_DISTRIBUTION];
    k.extend_from_slice(&key.to_bytes());
    k
}

fn pending_key(key: Key, partition: PartitionId) -> Vec<u8> {
    let mut k = vec![COL_PENDING];
    k.extend_from_slice(&key.to_bytes());
    k.extend_from_slice(&partition.0.to_be_bytes());
    k
}

fn decode_partition(pending_key: &[u8]) -> Option<PartitionId> {
    // tag + 8 key bytes + 4 partition bytes
    if pending_key.len() != 13 {
        return None;
    }
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&pending_key[9..13]);
    Some(PartitionId(u32::from_be_bytes(bytes)))
}
