//!
//! Weir Core - per-partition execution engine
//!
//! This crate drives running process instances through the element
//! lifecycle state machine, delivers message and timer occurrences to
//! waiting catch elements, and applies deployments. One processor owns one
//! partition: all state mutation happens on its single logical actor, and
//! every follow-up effect goes through an ordered record batch so that
//! replaying the same records yields the same output.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Injected time source
pub mod clock;

/// Engine configuration
pub mod config;

/// Deployment processing
pub mod deployment;

/// Error types
pub mod error;

/// Incidents
pub mod incident;

/// Runtime element instances
pub mod instance;

/// Partition-encoded keys
pub mod key;

/// Lifecycle step behaviors
mod lifecycle;

/// Per-partition processing actor
pub mod processor;

/// Follow-up records
pub mod record;

/// Deployed workflow registry
pub mod registry;

/// Keyed state store and typed facades
pub mod state;

/// Event subscriptions
pub mod subscription;

/// Pending event triggers
pub mod trigger;

/// Shared value types
pub mod types;

pub use clock::{ActorClock, ManualClock, SystemClock};
pub use config::EngineConfig;
pub use deployment::DeploymentResult;
pub use error::EngineError;
pub use incident::{Incident, IncidentType};
pub use instance::ElementInstance;
pub use key::{Key, KeyGenerator, PartitionId};
pub use processor::{CreatedInstance, PartitionProcessor};
pub use record::{ElementRecord, ElementRecordValue, RecordBatch};
pub use registry::WorkflowRegistry;
pub use state::{EngineState, MemoryStateStore, StateStore};
pub use trigger::EventTrigger;
pub use types::Variables;
