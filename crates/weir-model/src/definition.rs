//! Parsed process definition tree.
//!
//! This is the transformer's input: the output of an external schema parser,
//! already structurally valid but not yet resolved. Elements reference each
//! other by id only.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::TransformError;

/// A deployable unit: one or more processes plus the messages they share.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessDefinition {
    /// Processes contained in this deployment
    pub processes: Vec<Process>,

    /// Messages referenced by catch events and receive tasks
    pub messages: Vec<MessageDefinition>,
}

/// A single process: flow nodes plus the sequence flows connecting them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Process {
    /// Process id, stable across versions
    pub id: String,

    /// All flow nodes, including those nested in subprocesses
    pub elements: Vec<FlowNode>,

    /// Directed connections between flow nodes
    pub sequence_flows: Vec<SequenceFlow>,
}

/// A named message declared by the deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageDefinition {
    /// Message name, the correlation handle for subscriptions
    pub name: String,
}

/// One node of the process graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowNode {
    /// Element id, unique within the process
    pub id: String,

    /// Enclosing subprocess id; `None` for top-level elements
    pub parent: Option<String>,

    /// Node variant
    pub kind: FlowNodeKind,

    /// Mappings applied from the flow scope into the local scope on activation
    #[serde(default)]
    pub input_mappings: Vec<VariableMapping>,

    /// Mappings applied from the local scope back to the flow scope on completion
    #[serde(default)]
    pub output_mappings: Vec<VariableMapping>,
}

/// Flow node variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FlowNodeKind {
    /// Process or subprocess start event, optionally message- or timer-triggered
    StartEvent {
        /// Triggering event, if any
        event: Option<EventDefinition>,
    },
    /// End event
    EndEvent,
    /// Generic activity (service-task-like)
    Activity,
    /// Embedded subprocess container
    Subprocess,
    /// Event attached to an activity's boundary
    BoundaryEvent {
        /// Host activity id
        attached_to: String,
        /// Whether triggering cancels the host activity
        cancel_activity: bool,
        /// Triggering event
        event: EventDefinition,
    },
    /// Intermediate catch event
    IntermediateCatchEvent {
        /// Triggering event
        event: EventDefinition,
    },
    /// Receive task waiting on a named message
    ReceiveTask {
        /// Referenced message name
        message: String,
    },
    /// Gateway racing its connected catch events
    EventBasedGateway,
}

/// Message or timer event definition on a catch element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventDefinition {
    /// Wait for a named message
    Message {
        /// Referenced message name
        name: String,
    },
    /// Wait for a timer
    Timer {
        /// Unparsed timer expression (duration or cycle)
        expression: String,
    },
}

/// A directed sequence flow between two flow nodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceFlow {
    /// Flow id
    pub id: String,

    /// Source element id
    pub source: String,

    /// Target element id
    pub target: String,
}

/// A single top-level variable copy between scopes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableMapping {
    /// Variable name in the source scope
    pub source: String,

    /// Variable name in the target scope
    pub target: String,
}

impl Process {
    /// Validate the definition before transformation: element ids must be
    /// unique and every sequence flow endpoint must exist.
    pub fn validate(&self) -> Result<(), TransformError> {
        let mut ids = HashSet::new();
        for element in &self.elements {
            if !ids.insert(element.id.as_str()) {
                return Err(TransformError::DuplicateElementId(element.id.clone()));
            }
        }

        for flow in &self.sequence_flows {
            for endpoint in [&flow.source, &flow.target] {
                if !ids.contains(endpoint.as_str()) {
                    return Err(TransformError::DanglingSequenceFlow {
                        flow: flow.id.clone(),
                        element: endpoint.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    /// Resolved outgoing targets of an element, in declaration order.
    pub fn outgoing_of(&self, element_id: &str) -> Vec<&str> {
        self.sequence_flows
            .iter()
            .filter(|f| f.source == element_id)
            .map(|f| f.target.as_str())
            .collect()
    }
}
