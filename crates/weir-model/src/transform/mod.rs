//! Two-pass transformation from a process definition to executable graphs.
//!
//! The first pass registers one placeholder per element id so that forward
//! references (a gateway naming catch events wired later, a boundary event
//! naming its host) always resolve. The second pass wires each element by
//! type: resolving messages and timers, attaching boundary events, collecting
//! gateway race sets, and binding every lifecycle intent to a step.
//!
//! Nothing is partially applied: the first failing element rejects the whole
//! deployment.

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::definition::{
    EventDefinition, FlowNode, FlowNodeKind, Process, ProcessDefinition, VariableMapping,
};
use crate::error::TransformError;
use crate::executable::{CatchBehavior, ElementKind, ExecutableElement, ExecutableWorkflow};
use crate::intent::{ElementIntent, Step};
use crate::timer::RepeatingInterval;

/// Mutable build context threaded through one deployment's transformation.
///
/// Holds the registered messages and the workflow under construction. It is
/// discarded once the deployment is transformed.
pub struct TransformContext {
    version: u32,
    messages: HashSet<String>,
    elements: HashMap<String, ElementUnderConstruction>,
}

struct ElementUnderConstruction {
    flow_scope: Option<String>,
    outgoing: Vec<String>,
    kind: Option<ElementKind>,
    catch: Option<CatchBehavior>,
    input_mappings: Vec<VariableMapping>,
    output_mappings: Vec<VariableMapping>,
    bindings: HashMap<ElementIntent, Step>,
    // collected by other elements during wiring
    boundary_events: Vec<String>,
    start_events: Vec<String>,
}

impl TransformContext {
    /// Context for one deployment, assigning `version` to every process.
    pub fn new(version: u32) -> Self {
        Self {
            version,
            messages: HashSet::new(),
            elements: HashMap::new(),
        }
    }

    /// Register a deployable message name.
    fn register_message(&mut self, name: &str) {
        self.messages.insert(name.to_string());
    }

    fn resolve_message(&self, element: &str, name: &str) -> Result<String, TransformError> {
        if self.messages.contains(name) {
            Ok(name.to_string())
        } else {
            Err(TransformError::UnknownMessage {
                element: element.to_string(),
                message: name.to_string(),
            })
        }
    }
}

/// Transform a whole deployment into executable workflows, one per process.
///
/// Either every process compiles or the deployment is rejected with the
/// first failure.
pub fn transform_definition(
    definition: &ProcessDefinition,
    version: u32,
) -> Result<Vec<ExecutableWorkflow>, TransformError> {
    let mut workflows = Vec::with_capacity(definition.processes.len());

    for process in &definition.processes {
        let mut context = TransformContext::new(version);
        for message in &definition.messages {
            context.register_message(&message.name);
        }
        workflows.push(transform_process(process, &mut context)?);
    }

    Ok(workflows)
}

fn transform_process(
    process: &Process,
    context: &mut TransformContext,
) -> Result<ExecutableWorkflow, TransformError> {
    process.validate()?;

    register_elements(process, context)?;
    wire_elements(process, context)?;

    freeze(process, context)
}

/// Registration pass: one placeholder per element id, plus the synthetic
/// process root.
fn register_elements(
    process: &Process,
    context: &mut TransformContext,
) -> Result<(), TransformError> {
    context.elements.insert(
        process.id.clone(),
        ElementUnderConstruction::placeholder(None, Vec::new()),
    );

    for element in &process.elements {
        if let Some(scope) = &element.parent {
            let scope_is_subprocess = process
                .elements
                .iter()
                .any(|e| &e.id == scope && matches!(e.kind, FlowNodeKind::Subprocess));
            if !scope_is_subprocess {
                return Err(TransformError::InvalidFlowScope {
                    element: element.id.clone(),
                    scope: scope.clone(),
                });
            }
        }

        let outgoing = process
            .outgoing_of(&element.id)
            .into_iter()
            .map(str::to_string)
            .collect();

        let mut placeholder = ElementUnderConstruction::placeholder(
            Some(element.parent.clone().unwrap_or_else(|| process.id.clone())),
            outgoing,
        );
        placeholder.input_mappings = element.input_mappings.clone();
        placeholder.output_mappings = element.output_mappings.clone();
        context.elements.insert(element.id.clone(), placeholder);
    }

    Ok(())
}

/// Wiring pass: per element type, resolve references and bind steps.
fn wire_elements(process: &Process, context: &mut TransformContext) -> Result<(), TransformError> {
    wire_process_root(&process.id, context);

    for element in &process.elements {
        match &element.kind {
            FlowNodeKind::StartEvent { event } => wire_start_event(element, event, context)?,
            FlowNodeKind::EndEvent => wire_end_event(element, context),
            FlowNodeKind::Activity => wire_activity(element, context),
            FlowNodeKind::Subprocess => wire_subprocess(element, context),
            FlowNodeKind::BoundaryEvent {
                attached_to,
                cancel_activity,
                event,
            } => wire_boundary_event(element, attached_to, *cancel_activity, event, context)?,
            FlowNodeKind::IntermediateCatchEvent { event } => {
                wire_intermediate_catch_event(element, event, context)?
            }
            FlowNodeKind::ReceiveTask { message } => wire_receive_task(element, message, context)?,
            FlowNodeKind::EventBasedGateway => wire_event_based_gateway(element, process, context)?,
        }
    }

    Ok(())
}

fn wire_process_root(process_id: &str, context: &mut TransformContext) {
    let root = context.elements.get_mut(process_id).unwrap();
    root.bind(ElementIntent::Activating, Step::ActivateElement);
    root.bind(ElementIntent::Activated, Step::ActivateContainer);
    root.bind(ElementIntent::Completing, Step::CompleteElement);
    root.bind(ElementIntent::Completed, Step::ConsumeToken);
    root.bind_termination();
}

fn wire_start_event(
    element: &FlowNode,
    event: &Option<EventDefinition>,
    context: &mut TransformContext,
) -> Result<(), TransformError> {
    let catch = event
        .as_ref()
        .map(|e| resolve_event(&element.id, e, context))
        .transpose()?;

    // Attach to the enclosing subprocess when nested, otherwise to the
    // process root's start-event list.
    let scope_id = element
        .parent
        .clone()
        .unwrap_or_else(|| context.elements[&element.id].flow_scope.clone().unwrap());
    context
        .elements
        .get_mut(&scope_id)
        .unwrap()
        .start_events
        .push(element.id.clone());

    let built = context.elements.get_mut(&element.id).unwrap();
    built.catch = catch;
    built.kind = Some(ElementKind::StartEvent { catch: None });
    built.bind(ElementIntent::EventOccurred, Step::StartProcessOrApplyEvent);
    built.bind(ElementIntent::EventTriggered, Step::TakeOutgoingFlows);
    built.bind_termination();

    Ok(())
}

fn wire_end_event(element: &FlowNode, context: &mut TransformContext) {
    let built = context.elements.get_mut(&element.id).unwrap();
    built.kind = Some(ElementKind::EndEvent);
    built.bind(ElementIntent::EventActivating, Step::ActivateEvent);
    built.bind(ElementIntent::EventActivated, Step::TakeOutgoingFlows);
    built.bind_termination();
}

fn wire_activity(element: &FlowNode, context: &mut TransformContext) {
    let built = context.elements.get_mut(&element.id).unwrap();
    built.kind = Some(ElementKind::Activity {
        boundary_events: Vec::new(),
    });
    built.bind_lifecycle_chain();
}

fn wire_subprocess(element: &FlowNode, context: &mut TransformContext) {
    let built = context.elements.get_mut(&element.id).unwrap();
    built.kind = Some(ElementKind::Subprocess {
        start_events: Vec::new(),
    });
    built.bind(ElementIntent::Activating, Step::ActivateElement);
    built.bind(ElementIntent::Activated, Step::ActivateContainer);
    built.bind(ElementIntent::Completing, Step::CompleteElement);
    built.bind(ElementIntent::Completed, Step::TakeOutgoingFlows);
    built.bind_termination();
}

fn wire_boundary_event(
    element: &FlowNode,
    attached_to: &str,
    cancel_activity: bool,
    event: &EventDefinition,
    context: &mut TransformContext,
) -> Result<(), TransformError> {
    let catch = resolve_event(&element.id, event, context)?;

    // The host was registered in the first pass regardless of declaration
    // order.
    if !context.elements.contains_key(attached_to) {
        return Err(TransformError::UnknownAttachment {
            element: element.id.clone(),
            attached_to: attached_to.to_string(),
        });
    }
    context
        .elements
        .get_mut(attached_to)
        .unwrap()
        .boundary_events
        .push(element.id.clone());

    let built = context.elements.get_mut(&element.id).unwrap();
    built.kind = Some(ElementKind::BoundaryEvent {
        attached_to: attached_to.to_string(),
        cancel_activity,
        catch: catch.clone(),
    });
    built.catch = Some(catch);
    built.bind(ElementIntent::Activating, Step::ActivateElement);
    built.bind(ElementIntent::Activated, Step::SubscribeToEvents);
    built.bind(ElementIntent::EventOccurred, Step::DeliverEventTrigger);
    built.bind(ElementIntent::CatchEventTriggering, Step::TriggerEvent);
    built.bind(ElementIntent::CatchEventTriggered, Step::TakeOutgoingFlows);
    built.bind_termination();

    Ok(())
}

fn wire_intermediate_catch_event(
    element: &FlowNode,
    event: &EventDefinition,
    context: &mut TransformContext,
) -> Result<(), TransformError> {
    let catch = resolve_event(&element.id, event, context)?;

    let built = context.elements.get_mut(&element.id).unwrap();
    built.kind = Some(ElementKind::IntermediateCatchEvent {
        catch: catch.clone(),
    });
    built.catch = Some(catch);
    built.bind_lifecycle_chain();
    built.bind(ElementIntent::EventOccurred, Step::DeliverEventTrigger);
    built.bind(ElementIntent::CatchEventTriggering, Step::TriggerEvent);
    built.bind(ElementIntent::CatchEventTriggered, Step::TakeOutgoingFlows);

    Ok(())
}

fn wire_receive_task(
    element: &FlowNode,
    message: &str,
    context: &mut TransformContext,
) -> Result<(), TransformError> {
    let name = context.resolve_message(&element.id, message)?;

    let built = context.elements.get_mut(&element.id).unwrap();
    let catch = CatchBehavior::Message(name);
    built.kind = Some(ElementKind::ReceiveTask {
        catch: catch.clone(),
    });
    built.catch = Some(catch);
    built.bind_lifecycle_chain();
    built.bind(ElementIntent::EventOccurred, Step::DeliverEventTrigger);

    Ok(())
}

fn wire_event_based_gateway(
    element: &FlowNode,
    process: &Process,
    context: &mut TransformContext,
) -> Result<(), TransformError> {
    // Every catch event directly reachable through an outgoing flow joins
    // the race. They were all registered in the first pass.
    let race_set: Vec<String> = context.elements[&element.id].outgoing.clone();
    for target in &race_set {
        let is_catch = process.elements.iter().any(|e| {
            &e.id == target && matches!(e.kind, FlowNodeKind::IntermediateCatchEvent { .. })
        });
        if !is_catch {
            return Err(TransformError::InvalidGatewayTarget {
                gateway: element.id.clone(),
                target: target.clone(),
            });
        }
    }

    let built = context.elements.get_mut(&element.id).unwrap();
    built.kind = Some(ElementKind::EventBasedGateway {
        race_set: race_set.clone(),
    });
    built.bind(ElementIntent::Activating, Step::ActivateElement);
    built.bind(ElementIntent::GatewayActivated, Step::SubscribeToEvents);
    built.bind(ElementIntent::EventOccurred, Step::DeliverEventTrigger);
    built.bind(ElementIntent::Completing, Step::CompleteElement);
    built.bind(ElementIntent::Completed, Step::ConsumeToken);
    built.bind_termination();

    debug!(gateway = %element.id, targets = race_set.len(), "wired event-based gateway race");
    Ok(())
}

fn resolve_event(
    element_id: &str,
    event: &EventDefinition,
    context: &TransformContext,
) -> Result<CatchBehavior, TransformError> {
    match event {
        EventDefinition::Message { name } => context
            .resolve_message(element_id, name)
            .map(CatchBehavior::Message),
        EventDefinition::Timer { expression } => RepeatingInterval::parse(expression)
            .map(CatchBehavior::Timer)
            .map_err(|reason| TransformError::InvalidTimer {
                element: element_id.to_string(),
                expression: expression.clone(),
                reason,
            }),
    }
}

/// Freeze the build context into the immutable graph.
fn freeze(
    process: &Process,
    context: &mut TransformContext,
) -> Result<ExecutableWorkflow, TransformError> {
    let mut nodes = HashMap::with_capacity(context.elements.len());
    let mut top_start_events = Vec::new();

    for (id, built) in context.elements.drain() {
        let kind = match built.kind {
            Some(ElementKind::StartEvent { .. }) => ElementKind::StartEvent { catch: built.catch },
            Some(ElementKind::Activity { .. }) => ElementKind::Activity {
                boundary_events: built.boundary_events,
            },
            Some(ElementKind::Subprocess { .. }) => ElementKind::Subprocess {
                start_events: built.start_events,
            },
            Some(other) => other,
            None => {
                // Only the synthetic root is never wired by an element
                // transformer.
                if id == process.id {
                    top_start_events = built.start_events.clone();
                    ElementKind::Process {
                        start_events: built.start_events,
                    }
                } else {
                    unreachable!("element '{}' left unwired", id)
                }
            }
        };

        nodes.insert(
            id.clone(),
            ExecutableElement {
                id,
                flow_scope: built.flow_scope,
                outgoing: built.outgoing,
                kind,
                input_mappings: built.input_mappings,
                output_mappings: built.output_mappings,
                bindings: built.bindings,
            },
        );
    }

    debug!(
        process = %process.id,
        version = context.version,
        elements = nodes.len(),
        "transformed process"
    );

    Ok(ExecutableWorkflow::new(
        process.id.clone(),
        context.version,
        top_start_events,
        nodes,
    ))
}

impl ElementUnderConstruction {
    fn placeholder(flow_scope: Option<String>, outgoing: Vec<String>) -> Self {
        Self {
            flow_scope,
            outgoing,
            kind: None,
            catch: None,
            input_mappings: Vec::new(),
            output_mappings: Vec::new(),
            bindings: HashMap::new(),
            boundary_events: Vec::new(),
            start_events: Vec::new(),
        }
    }

    fn bind(&mut self, intent: ElementIntent, step: Step) {
        self.bindings.insert(intent, step);
    }

    /// The activate/subscribe-or-wait/complete chain shared by activities,
    /// receive tasks, and intermediate catch events.
    fn bind_lifecycle_chain(&mut self) {
        self.bind(ElementIntent::Activating, Step::ActivateElement);
        self.bind(ElementIntent::Activated, Step::SubscribeToEvents);
        self.bind(ElementIntent::Completing, Step::CompleteElement);
        self.bind(ElementIntent::Completed, Step::TakeOutgoingFlows);
        self.bind_termination();
    }

    fn bind_termination(&mut self) {
        self.bind(ElementIntent::Terminating, Step::TerminateElement);
        self.bind(ElementIntent::Terminated, Step::PropagateTermination);
    }
}
