use serde::{Deserialize, Serialize};

/// Lifecycle and event intents observed on element instance records.
///
/// The happy path for an element instance is
/// `Activating -> Activated -> Completing -> Completed`; forced termination
/// takes any pre-terminal state through `Terminating -> Terminated`.
/// The event intents drive catch elements and gateways between those states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementIntent {
    /// Element instance is being activated (input mappings run here)
    Activating,
    /// Element instance reached its business-logic phase
    Activated,
    /// Element instance is completing (output mappings run here)
    Completing,
    /// Element instance completed normally
    Completed,
    /// Element instance is being forcibly terminated
    Terminating,
    /// Element instance terminated
    Terminated,
    /// A pending event trigger exists for a scope and must be delivered
    EventOccurred,
    /// A start or end event is activating
    EventActivating,
    /// A start or end event finished activating
    EventActivated,
    /// A start event's token continues along its outgoing path
    EventTriggered,
    /// A catch event chosen as winner is applying its trigger
    CatchEventTriggering,
    /// A catch event's token continues along its outgoing path
    CatchEventTriggered,
    /// An event-based gateway opened its race
    GatewayActivated,
}

impl ElementIntent {
    /// Whether this intent is a terminal lifecycle state.
    pub fn is_terminal(self) -> bool {
        matches!(self, ElementIntent::Completed | ElementIntent::Terminated)
    }

    /// Whether an instance in this state still owns live tokens, so that
    /// records addressed to its children may be handled.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ElementIntent::Activating | ElementIntent::Activated | ElementIntent::GatewayActivated
        )
    }
}

/// Executable steps a transformer binds to `(element, intent)` pairs.
///
/// Steps are plain identifiers; the engine maps each to a two-phase
/// behavior (`should_handle`, `handle`). There is no handler hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Step {
    /// Create a process instance for a start event occurrence, or apply the
    /// occurrence inside an already-running scope
    StartProcessOrApplyEvent,
    /// Apply input mappings and advance to the element's active phase
    ActivateElement,
    /// Activate a start or end event
    ActivateEvent,
    /// Spawn start-event tokens inside an activated container
    ActivateContainer,
    /// Open message/timer/boundary subscriptions and wait
    SubscribeToEvents,
    /// Apply output mappings and move the instance to `Completed`
    CompleteElement,
    /// Spawn successor tokens, or consume the token when the element has no
    /// outgoing path
    TakeOutgoingFlows,
    /// Consume the token without taking outgoing flows
    ConsumeToken,
    /// Resolve incidents, cancel waits, and drive the instance to
    /// `Terminated`
    TerminateElement,
    /// Account for a terminated token and propagate scope termination
    PropagateTermination,
    /// Deliver a pending event trigger for a scope
    DeliverEventTrigger,
    /// Apply a consumed event trigger to the winning catch event
    TriggerEvent,
}
