use thiserror::Error;

use weir_core::{EngineError, Key, PartitionId};

/// Error type for the distribution protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DistributionError {
    /// An acknowledgement arrived for a pair that is not pending.
    ///
    /// This signals a duplicate or late acknowledgement; it is logged and
    /// never retried.
    #[error("no pending distribution for key {key} on partition {partition}")]
    NotFound {
        /// Distribution key
        key: Key,
        /// Acknowledging partition
        partition: PartitionId,
    },

    /// No distribution exists under the key
    #[error("unknown distribution: {0}")]
    UnknownDistribution(Key),

    /// The caller reused a distribution key for an unrelated command
    #[error("distribution key already in use: {0}")]
    KeyInUse(Key),

    /// The distribution is not parked awaiting continuation
    #[error("distribution {0} is not awaiting continuation")]
    NotContinuable(Key),

    /// Underlying state store failure
    #[error(transparent)]
    State(#[from] EngineError),
}

impl From<serde_json::Error> for DistributionError {
    fn from(err: serde_json::Error) -> Self {
        DistributionError::State(EngineError::Serialization(err.to_string()))
    }
}
