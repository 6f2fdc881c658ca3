//! Immutable executable workflow graph.
//!
//! Built once at deploy time by the transformer, then shared read-only by
//! every instance of that process version. All relationships are id-based
//! lookups; there are no pointer cycles.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::intent::{ElementIntent, Step};
use crate::timer::RepeatingInterval;

/// The compiled form of one process version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableWorkflow {
    /// Process id
    pub process_id: String,

    /// Version assigned at deploy time
    pub version: u32,

    /// Top-level start event ids
    pub start_events: Vec<String>,

    nodes: HashMap<String, ExecutableElement>,
}

impl ExecutableWorkflow {
    pub(crate) fn new(
        process_id: String,
        version: u32,
        start_events: Vec<String>,
        nodes: HashMap<String, ExecutableElement>,
    ) -> Self {
        Self {
            process_id,
            version,
            start_events,
            nodes,
        }
    }

    /// Look up an element by id.
    pub fn element(&self, id: &str) -> Option<&ExecutableElement> {
        self.nodes.get(id)
    }

    /// The step bound to `(element, intent)`, if any.
    pub fn step_for(&self, element_id: &str, intent: ElementIntent) -> Option<Step> {
        self.nodes
            .get(element_id)
            .and_then(|e| e.bindings.get(&intent))
            .copied()
    }

    /// The message-triggered top-level start event, if this version has one.
    pub fn message_start_event(&self) -> Option<&ExecutableElement> {
        self.start_events
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .find(|e| matches!(e.catch(), Some(CatchBehavior::Message(_))))
    }

    /// The timer-triggered top-level start event, if this version has one.
    pub fn timer_start_event(&self) -> Option<&ExecutableElement> {
        self.start_events
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .find(|e| matches!(e.catch(), Some(CatchBehavior::Timer(_))))
    }

    /// All element ids, for diagnostics.
    pub fn element_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.nodes.keys().map(String::as_str)
    }
}

/// One compiled flow element.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutableElement {
    /// Element id
    pub id: String,

    /// Enclosing subprocess id; `None` for top-level elements
    pub flow_scope: Option<String>,

    /// Resolved targets of outgoing sequence flows
    pub outgoing: Vec<String>,

    /// Variant-specific compiled data
    pub kind: ElementKind,

    /// Mappings applied on activation
    pub input_mappings: Vec<crate::definition::VariableMapping>,

    /// Mappings applied on completion
    pub output_mappings: Vec<crate::definition::VariableMapping>,

    /// Lifecycle intent to step bindings
    pub bindings: HashMap<ElementIntent, Step>,
}

impl ExecutableElement {
    /// The catch behavior of this element, if it waits on anything.
    pub fn catch(&self) -> Option<&CatchBehavior> {
        match &self.kind {
            ElementKind::BoundaryEvent { catch, .. } => Some(catch),
            ElementKind::IntermediateCatchEvent { catch } => Some(catch),
            ElementKind::ReceiveTask { catch } => Some(catch),
            ElementKind::StartEvent { catch } => catch.as_ref(),
            _ => None,
        }
    }

    /// Whether this element owns token accounting for children.
    pub fn is_scope(&self) -> bool {
        matches!(
            self.kind,
            ElementKind::Subprocess { .. } | ElementKind::Process { .. }
        )
    }

    /// Start events of a container element.
    pub fn container_start_events(&self) -> &[String] {
        match &self.kind {
            ElementKind::Subprocess { start_events } => start_events,
            ElementKind::Process { start_events } => start_events,
            _ => &[],
        }
    }
}

/// Compiled element variants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ElementKind {
    /// Generic activity
    Activity {
        /// Boundary events registered on this activity
        boundary_events: Vec<String>,
    },
    /// Event attached to an activity's boundary
    BoundaryEvent {
        /// Host activity id
        attached_to: String,
        /// Whether triggering cancels the host
        cancel_activity: bool,
        /// What the event waits on
        catch: CatchBehavior,
    },
    /// Intermediate catch event
    IntermediateCatchEvent {
        /// What the event waits on
        catch: CatchBehavior,
    },
    /// Receive task, compiled to a message catch
    ReceiveTask {
        /// Resolved message catch
        catch: CatchBehavior,
    },
    /// Event-based gateway with its compiled race set
    EventBasedGateway {
        /// Catch events racing for this gateway's token
        race_set: Vec<String>,
    },
    /// Start event, optionally catching
    StartEvent {
        /// What the event waits on, if anything
        catch: Option<CatchBehavior>,
    },
    /// End event
    EndEvent,
    /// Embedded subprocess container
    Subprocess {
        /// Start events scoped to this subprocess
        start_events: Vec<String>,
    },
    /// Synthetic root node representing the process itself
    Process {
        /// Top-level start events
        start_events: Vec<String>,
    },
}

/// Resolved wait behavior of a catch element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CatchBehavior {
    /// Wait for the named message
    Message(String),
    /// Wait for the parsed timer
    Timer(RepeatingInterval),
}
