//! Engine configuration.

use serde::{Deserialize, Serialize};

use crate::key::PartitionId;

/// Static configuration of one partition's engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Id of the partition this engine owns
    pub partition_id: PartitionId,

    /// Total number of partitions in the cluster
    pub partition_count: u32,
}

impl EngineConfig {
    /// Single-partition configuration, the default for tests.
    pub fn single_partition() -> Self {
        Self {
            partition_id: PartitionId(0),
            partition_count: 1,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::single_partition()
    }
}
