//! Distribution records and commands.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use weir_core::{Key, PartitionId};

/// Lifecycle intents of one distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionIntent {
    /// Distribution accepted on the origin partition
    Started,
    /// The command was queued for one target partition
    Distributing,
    /// One target partition acknowledged the command
    Acknowledged,
    /// Every target partition acknowledged; the distribution is done
    Finished,
    /// All acknowledgements arrived but finishing waits on an external
    /// condition
    ContinuationRequested,
    /// A parked distribution was continued
    Continued,
}

/// The command being replicated to other partitions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributedCommand {
    /// Value type of the command, e.g. `DEPLOYMENT`
    pub value_type: String,

    /// Command intent, e.g. `CREATE`
    pub intent: String,

    /// Command payload
    pub payload: Value,
}

/// A follow-up command registered by the caller, appended exactly once when
/// the distribution completes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowUpCommand {
    /// Value type of the follow-up
    pub value_type: String,

    /// Follow-up intent
    pub intent: String,

    /// Key the follow-up is addressed to
    pub key: Key,

    /// Follow-up payload
    pub payload: Value,
}

/// One distribution record appended to the origin partition's log.
///
/// `Finished` records carry only identifying metadata, never the original
/// payload, so their size is bounded regardless of the distributed command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistributionRecord {
    /// Distribution key
    pub key: Key,

    /// Record intent
    pub intent: DistributionIntent,

    /// Target or acknowledging partition, for `Distributing`/`Acknowledged`
    pub partition: Option<PartitionId>,

    /// Value type of the distributed command
    pub value_type: String,

    /// Intent of the distributed command
    pub command_intent: String,

    /// Payload; absent on `Finished` and other metadata-only records
    pub payload: Option<Value>,
}

/// One entry of a distribution operation's output, in append order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionOutput {
    /// A distribution record
    Record(DistributionRecord),
    /// The caller-registered follow-up command
    Command(FollowUpCommand),
}

impl DistributionOutput {
    /// The record intent, if this entry is a record.
    pub fn intent(&self) -> Option<DistributionIntent> {
        match self {
            DistributionOutput::Record(record) => Some(record.intent),
            DistributionOutput::Command(_) => None,
        }
    }

    /// The partition of a `Distributing`/`Acknowledged` record.
    pub fn partition(&self) -> Option<PartitionId> {
        match self {
            DistributionOutput::Record(record) => record.partition,
            DistributionOutput::Command(_) => None,
        }
    }
}

/// A command sent to another partition, fire-and-forget.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteCommand {
    /// Value type of the carried command
    pub value_type: String,

    /// Intent of the carried command
    pub intent: String,

    /// Distribution key; encodes the origin partition
    pub key: Key,

    /// Command payload
    pub payload: Value,
}
