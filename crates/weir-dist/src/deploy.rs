//! Deployment distribution.
//!
//! Deployments are the canonical distributed command: the origin partition
//! applies the deployment locally, replicates it to every other partition,
//! and each receiver applies it exactly once and acknowledges.

use tracing::info;

use weir_core::{Key, PartitionId, PartitionProcessor};
use weir_model::ProcessDefinition;

use crate::distributor::{
    acknowledgement, apply_once, CommandDistributor, DistributionOptions, DistributionOutcome,
};
use crate::error::DistributionError;
use crate::record::{DistributedCommand, RemoteCommand};
use crate::state::DistributionState;

/// Value type of deployment commands.
pub const DEPLOYMENT_VALUE_TYPE: &str = "DEPLOYMENT";

/// Intent of deployment create commands.
pub const DEPLOYMENT_CREATE_INTENT: &str = "CREATE";

/// Replicate a deployment, already applied locally, to every other
/// partition.
pub fn distribute_deployment(
    distributor: &CommandDistributor,
    key: Key,
    definition: &ProcessDefinition,
    options: DistributionOptions,
) -> Result<DistributionOutcome, DistributionError> {
    let payload = serde_json::to_value(definition)?;
    distributor.distribute(
        key,
        DistributedCommand {
            value_type: DEPLOYMENT_VALUE_TYPE.to_string(),
            intent: DEPLOYMENT_CREATE_INTENT.to_string(),
            payload,
        },
        options,
    )
}

/// Apply a received deployment command on this partition and build the
/// acknowledgement to send back.
///
/// Redelivered commands skip the deployment but still acknowledge, since
/// the previous acknowledgement may have been lost.
pub fn receive_deployment(
    state: &DistributionState,
    processor: &mut PartitionProcessor,
    command: &RemoteCommand,
) -> Result<(PartitionId, RemoteCommand), DistributionError> {
    let applied = apply_once(state, command, |command| {
        let definition: ProcessDefinition = serde_json::from_value(command.payload.clone())?;
        let result = processor.deploy(&definition).map_err(DistributionError::from)?;
        info!(
            key = %command.key,
            version = result.version,
            "distributed deployment applied"
        );
        Ok(())
    })?;

    if !applied {
        info!(key = %command.key, "distributed deployment already applied, acknowledging again");
    }
    Ok(acknowledgement(command))
}
