//!
//! Weir Dist - cross-partition command distribution
//!
//! This crate replicates commands from an origin partition to every other
//! partition with at-least-once delivery and exactly-once effect. The origin
//! tracks one pending pair per target partition, finishes once all of them
//! acknowledged, and retries forever through a backoff redistributor. The
//! distribution key encodes the origin partition, so acknowledgements route
//! home without any lookup.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Backoff rule
pub mod backoff;

/// Deployment distribution
pub mod deploy;

/// Origin-side distribution protocol
pub mod distributor;

/// Error types
pub mod error;

/// Distribution records and commands
pub mod record;

/// Background redistribution
pub mod redistributor;

/// Distribution-tracking state
pub mod state;

/// Inter-partition transport
pub mod transport;

pub use backoff::{max_cycles, should_resend};
pub use distributor::{
    acknowledgement, apply_once, CommandDistributor, DistributionOptions, DistributionOutcome,
};
pub use error::DistributionError;
pub use record::{
    DistributedCommand, DistributionIntent, DistributionOutput, DistributionRecord,
    FollowUpCommand, RemoteCommand,
};
pub use redistributor::{RedistributionConfig, Redistributor};
pub use state::{DistributionState, StoredDistribution};
pub use transport::{InterPartitionSender, MemoryTransport, PartitionTopology, StaticTopology};
