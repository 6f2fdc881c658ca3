//!
//! Weir Model - process model and deploy-time transformation
//!
//! This crate defines the parsed process definition tree, the immutable
//! executable workflow graph that the engine runs against, and the
//! transformer that compiles the former into the latter. The graph is built
//! once per deployment and shared read-only by every instance of that
//! process version.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

/// Parsed process definition tree (transformer input)
pub mod definition;

/// Executable workflow graph (transformer output)
pub mod executable;

/// Lifecycle intents and executable steps
pub mod intent;

/// Timer expression parsing
pub mod timer;

/// Transformation from definition to executable graph
pub mod transform;

/// Error types
pub mod error;

pub use definition::{
    EventDefinition, FlowNode, FlowNodeKind, MessageDefinition, Process, ProcessDefinition,
    SequenceFlow, VariableMapping,
};
pub use error::TransformError;
pub use executable::{CatchBehavior, ElementKind, ExecutableElement, ExecutableWorkflow};
pub use intent::{ElementIntent, Step};
pub use timer::RepeatingInterval;
pub use transform::{transform_definition, TransformContext};
