//! Command distribution on the origin partition.
//!
//! `distribute` appends `Started` plus one `Distributing` per target and
//! queues one fire-and-forget send per target. Acknowledgements retire
//! pending pairs one by one; the last one appends the caller-registered
//! follow-up (if any) and a metadata-only `Finished`. Everything here runs
//! on the partition's single processing actor; the queued sends go out in
//! the post-commit phase.

use std::sync::Arc;

use tracing::{debug, info, warn};

use weir_core::{Key, PartitionId};

use crate::error::DistributionError;
use crate::record::{
    DistributedCommand, DistributionIntent, DistributionOutput, DistributionRecord,
    FollowUpCommand, RemoteCommand,
};
use crate::state::{DistributionState, StoredDistribution};
use crate::transport::PartitionTopology;

/// What one distribution operation produced: records for the log and sends
/// for the post-commit phase.
#[derive(Debug, Default)]
pub struct DistributionOutcome {
    /// Log entries, in append order
    pub outputs: Vec<DistributionOutput>,

    /// Commands to send after commit, one per target partition
    pub sends: Vec<(PartitionId, RemoteCommand)>,
}

/// Options for one distribution.
#[derive(Debug, Default)]
pub struct DistributionOptions {
    /// Follow-up command appended exactly once when the distribution
    /// completes
    pub follow_up: Option<FollowUpCommand>,

    /// Park instead of finishing once all acknowledgements arrive; the
    /// caller continues it when its external condition holds
    pub parked: bool,
}

/// Origin-side distribution protocol.
pub struct CommandDistributor {
    state: DistributionState,
    topology: Arc<dyn PartitionTopology>,
}

impl CommandDistributor {
    /// A distributor over this partition's state and topology.
    pub fn new(state: DistributionState, topology: Arc<dyn PartitionTopology>) -> Self {
        Self { state, topology }
    }

    /// Distribution state, for inspection.
    pub fn state(&self) -> &DistributionState {
        &self.state
    }

    /// Replicate a command to every other partition.
    ///
    /// The caller supplies a globally unique `key` minted from this
    /// partition's key generator; reusing a key for an unrelated command is
    /// an error, never silently absorbed.
    pub fn distribute(
        &self,
        key: Key,
        command: DistributedCommand,
        options: DistributionOptions,
    ) -> Result<DistributionOutcome, DistributionError> {
        if self.state.distribution(key)?.is_some() {
            return Err(DistributionError::KeyInUse(key));
        }

        let targets = self.topology.other_partitions();
        self.state.put_distribution(&StoredDistribution {
            key,
            command: command.clone(),
            follow_up: options.follow_up,
            parked: options.parked,
            awaiting_continuation: false,
        })?;

        let mut outcome = DistributionOutcome::default();
        outcome.outputs.push(DistributionOutput::Record(record(
            key,
            DistributionIntent::Started,
            None,
            &command,
            true,
        )));

        for target in targets {
            self.state.add_pending(key, target)?;
            outcome.outputs.push(DistributionOutput::Record(record(
                key,
                DistributionIntent::Distributing,
                Some(target),
                &command,
                true,
            )));
            outcome.sends.push((
                target,
                RemoteCommand {
                    value_type: command.value_type.clone(),
                    intent: command.intent.clone(),
                    key,
                    payload: command.payload.clone(),
                },
            ));
        }

        info!(
            %key,
            value_type = %command.value_type,
            targets = outcome.sends.len(),
            "command distribution started"
        );
        Ok(outcome)
    }

    /// Process one acknowledgement from a target partition.
    ///
    /// Unknown pairs are rejected as not found: they signal a duplicate or
    /// late acknowledgement and are logged, never retried.
    pub fn acknowledge(
        &self,
        key: Key,
        partition: PartitionId,
    ) -> Result<DistributionOutcome, DistributionError> {
        if !self.state.is_pending(key, partition)? {
            debug!(%key, %partition, "acknowledgement for unknown pending pair");
            return Err(DistributionError::NotFound { key, partition });
        }

        let dist = self
            .state
            .distribution(key)?
            .ok_or(DistributionError::UnknownDistribution(key))?;

        self.state.remove_pending(key, partition)?;

        let mut outcome = DistributionOutcome::default();
        outcome.outputs.push(DistributionOutput::Record(record(
            key,
            DistributionIntent::Acknowledged,
            Some(partition),
            &dist.command,
            false,
        )));

        if self.state.pending_for(key)?.is_empty() {
            if dist.parked {
                let mut dist = dist;
                dist.awaiting_continuation = true;
                self.state.put_distribution(&dist)?;
                outcome.outputs.push(DistributionOutput::Record(record(
                    key,
                    DistributionIntent::ContinuationRequested,
                    None,
                    &dist.command,
                    false,
                )));
            } else {
                self.finish(&dist, &mut outcome)?;
            }
        }

        Ok(outcome)
    }

    /// Continue a parked distribution, re-emitting its registered follow-up
    /// at the point it was parked.
    pub fn continue_distribution(&self, key: Key) -> Result<DistributionOutcome, DistributionError> {
        let dist = self
            .state
            .distribution(key)?
            .ok_or(DistributionError::UnknownDistribution(key))?;
        if !dist.awaiting_continuation {
            return Err(DistributionError::NotContinuable(key));
        }

        let mut outcome = DistributionOutcome::default();
        outcome.outputs.push(DistributionOutput::Record(record(
            key,
            DistributionIntent::Continued,
            None,
            &dist.command,
            false,
        )));
        self.finish(&dist, &mut outcome)?;
        Ok(outcome)
    }

    /// Append the follow-up and the metadata-only `Finished`, then drop the
    /// bookkeeping.
    fn finish(
        &self,
        dist: &StoredDistribution,
        outcome: &mut DistributionOutcome,
    ) -> Result<(), DistributionError> {
        if let Some(follow_up) = &dist.follow_up {
            outcome
                .outputs
                .push(DistributionOutput::Command(follow_up.clone()));
        }
        outcome.outputs.push(DistributionOutput::Record(record(
            dist.key,
            DistributionIntent::Finished,
            None,
            &dist.command,
            false,
        )));
        self.state.delete_distribution(dist.key)?;

        info!(key = %dist.key, value_type = %dist.command.value_type, "distribution finished");
        Ok(())
    }
}

/// Build the acknowledgement for a received command; the origin partition
/// is decoded from the distribution key, no lookup needed.
pub fn acknowledgement(command: &RemoteCommand) -> (PartitionId, RemoteCommand) {
    let origin = command.key.partition_id();
    (
        origin,
        RemoteCommand {
            value_type: command.value_type.clone(),
            intent: "ACKNOWLEDGE".to_string(),
            key: command.key,
            payload: serde_json::Value::Null,
        },
    )
}

/// Apply a received distributed command exactly once.
///
/// Redelivered commands skip `apply` but still produce an acknowledgement,
/// since the previous one may have been lost.
pub fn apply_once<A>(
    state: &DistributionState,
    command: &RemoteCommand,
    apply: A,
) -> Result<bool, DistributionError>
where
    A: FnOnce(&RemoteCommand) -> Result<(), DistributionError>,
{
    if state.is_applied(command.key)? {
        warn!(key = %command.key, "distributed command redelivered, effect skipped");
        return Ok(false);
    }
    apply(command)?;
    state.mark_applied(command.key)?;
    Ok(true)
}

fn record(
    key: Key,
    intent: DistributionIntent,
    partition: Option<PartitionId>,
    command: &DistributedCommand,
    with_payload: bool,
) -> DistributionRecord {
    DistributionRecord {
        key,
        intent,
        partition,
        value_type: command.value_type.clone(),
        command_intent: command.intent.clone(),
        payload: with_payload.then(|| command.payload.clone()),
    }
}
