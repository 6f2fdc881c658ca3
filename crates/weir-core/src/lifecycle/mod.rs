//! Element lifecycle step behaviors.
//!
//! Every record is handled in two phases. `should_handle` rejects the record
//! without side effects unless the instance's persisted state equals the
//! intent being processed and the enclosing flow scope is still active; this
//! guard is what makes the whole machine idempotent under log replay.
//! `handle` mutates state synchronously and appends follow-up records to the
//! batch, never applying them in place.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use weir_model::{
    CatchBehavior, ElementIntent, ElementKind, ExecutableElement, ExecutableWorkflow, Step,
};

use crate::clock::ActorClock;
use crate::error::EngineError;
use crate::incident::{Incident, IncidentType};
use crate::instance::ElementInstance;
use crate::key::{Key, KeyGenerator};
use crate::record::{ElementRecord, ElementRecordValue, RecordBatch};
use crate::registry::WorkflowRegistry;
use crate::state::EngineState;
use crate::subscription::{CatchSubscription, TimerRecord};
use crate::trigger::EventTrigger;
use crate::types::Variables;

/// Everything one step invocation may touch.
pub(crate) struct StepContext<'a> {
    pub state: &'a EngineState,
    pub workflows: &'a WorkflowRegistry,
    pub keys: &'a mut KeyGenerator,
    pub clock: &'a dyn ActorClock,
    pub batch: &'a mut RecordBatch,
}

/// A single executable step: guard phase, then effect phase.
trait StepBehavior {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError>;

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError>;
}

/// Resolve the bound step for a record and run both phases.
///
/// Records with no binding or a failing guard are ignored without side
/// effects.
pub(crate) fn dispatch(ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
    let workflow = ctx
        .workflows
        .get(&record.value.process_id, record.value.version)?
        .ok_or_else(|| EngineError::ProcessNotFound(record.value.process_id.clone()))?;

    let Some(step) = workflow.step_for(&record.value.element_id, record.intent) else {
        trace!(
            element = %record.value.element_id,
            intent = ?record.intent,
            "no step bound, record ignored"
        );
        return Ok(false);
    };

    let behavior = behavior_for(step);
    if !behavior.should_handle(ctx, record)? {
        debug!(
            key = %record.key,
            element = %record.value.element_id,
            intent = ?record.intent,
            "guard rejected record"
        );
        return Ok(false);
    }

    behavior.handle(ctx, record)
}

fn behavior_for(step: Step) -> &'static dyn StepBehavior {
    match step {
        Step::StartProcessOrApplyEvent => &StartProcessOrApplyEvent,
        Step::ActivateElement => &ActivateElement,
        Step::ActivateEvent => &ActivateEvent,
        Step::ActivateContainer => &ActivateContainer,
        Step::SubscribeToEvents => &SubscribeToEvents,
        Step::CompleteElement => &CompleteElement,
        Step::TakeOutgoingFlows => &TakeOutgoingFlows,
        Step::ConsumeToken => &ConsumeToken,
        Step::TerminateElement => &TerminateElement,
        Step::PropagateTermination => &PropagateTermination,
        Step::DeliverEventTrigger => &DeliverEventTrigger,
        Step::TriggerEvent => &TriggerEvent,
    }
}

// ----- shared helpers -----

impl<'a> StepContext<'a> {
    fn workflow_of(&self, record: &ElementRecord) -> Result<Arc<ExecutableWorkflow>, EngineError> {
        self.workflows
            .get(&record.value.process_id, record.value.version)?
            .ok_or_else(|| EngineError::ProcessNotFound(record.value.process_id.clone()))
    }

    fn element_of<'w>(
        &self,
        workflow: &'w ExecutableWorkflow,
        element_id: &str,
    ) -> Result<&'w ExecutableElement, EngineError> {
        workflow
            .element(element_id)
            .ok_or_else(|| EngineError::ElementNotFound {
                element: element_id.to_string(),
                process: workflow.process_id.clone(),
            })
    }

    /// Move an instance to a new state and append the matching record in one
    /// step, keeping the persisted-state-equals-appended-intent invariant.
    fn transition(
        &mut self,
        instance: &mut ElementInstance,
        intent: ElementIntent,
    ) -> Result<(), EngineError> {
        instance.state = intent;
        self.state.put_instance(instance)?;
        self.append(instance.key, intent, instance, Variables::new());
        Ok(())
    }

    fn append(
        &mut self,
        key: Key,
        intent: ElementIntent,
        instance: &ElementInstance,
        variables: Variables,
    ) {
        self.batch.push(ElementRecord {
            key,
            intent,
            value: ElementRecordValue {
                process_id: instance.process_id.clone(),
                version: instance.version,
                element_id: instance.element_id.clone(),
                flow_scope: instance.flow_scope,
                variables,
            },
        });
    }

    /// Create a fresh instance in the given state and append its first
    /// record.
    fn spawn(
        &mut self,
        record: &ElementRecord,
        element_id: &str,
        flow_scope: Option<Key>,
        intent: ElementIntent,
        variables: Variables,
    ) -> Result<Key, EngineError> {
        let key = self.keys.next_key();
        let instance = ElementInstance {
            key,
            process_id: record.value.process_id.clone(),
            version: record.value.version,
            element_id: element_id.to_string(),
            state: intent,
            flow_scope,
            active_tokens: 0,
        };
        self.state.put_instance(&instance)?;
        self.append(key, intent, &instance, variables);
        Ok(key)
    }

    fn scope_is_active(&self, flow_scope: Option<Key>) -> Result<bool, EngineError> {
        match flow_scope {
            None => Ok(true),
            Some(scope) => Ok(self
                .state
                .instance(scope)?
                .map(|s| s.is_active())
                .unwrap_or(false)),
        }
    }

    /// Adjust a scope's token count and return the updated scope instance.
    fn change_tokens(&mut self, scope_key: Key, delta: i64) -> Result<ElementInstance, EngineError> {
        let mut scope = self.state.expect_instance(scope_key)?;
        let tokens = scope.active_tokens as i64 + delta;
        scope.active_tokens = tokens.max(0) as u32;
        self.state.put_instance(&scope)?;
        Ok(scope)
    }

    /// Decrement the scope's token count for a normally completed token and
    /// propagate completion when it was the last one.
    fn consume_token(&mut self, flow_scope: Option<Key>) -> Result<(), EngineError> {
        let Some(scope_key) = flow_scope else {
            return Ok(());
        };
        let mut scope = self.change_tokens(scope_key, -1)?;
        if scope.active_tokens == 0 && scope.is_active() {
            self.transition(&mut scope, ElementIntent::Completing)?;
        }
        Ok(())
    }

    fn raise_incident(
        &mut self,
        instance: &ElementInstance,
        error_type: IncidentType,
        message: String,
    ) -> Result<(), EngineError> {
        let incident = Incident {
            key: self.keys.next_key(),
            element_instance_key: instance.key,
            error_type,
            message: message.clone(),
            stalled_intent: instance.state,
        };
        warn!(
            key = %instance.key,
            element = %instance.element_id,
            %message,
            "incident raised, token stalled"
        );
        self.state.put_incident(&incident)
    }

    fn resolve_incidents(&mut self, key: Key) -> Result<(), EngineError> {
        for incident in self.state.incidents_for_instance(key)? {
            self.state.delete_incident(&incident)?;
        }
        Ok(())
    }

    /// Open the wait described by a catch behavior for `(element, scope)`.
    fn subscribe(
        &mut self,
        record: &ElementRecord,
        scope_key: Key,
        element_id: &str,
        catch: &CatchBehavior,
    ) -> Result<(), EngineError> {
        let message = match catch {
            CatchBehavior::Message(name) => Some(name.clone()),
            CatchBehavior::Timer(interval) => {
                let due = self.clock.now() + interval.interval();
                self.state.put_timer(&TimerRecord {
                    timer_key: self.keys.next_key(),
                    due_ms: due.timestamp_millis(),
                    element_id: element_id.to_string(),
                    process_id: record.value.process_id.clone(),
                    version: record.value.version,
                    scope_key: Some(scope_key),
                    repetitions: interval.repetitions,
                    interval_ms: interval.interval_ms,
                })?;
                None
            }
        };
        self.state.put_catch_subscription(&CatchSubscription {
            scope_key,
            element_id: element_id.to_string(),
            process_id: record.value.process_id.clone(),
            version: record.value.version,
            message,
        })
    }

    /// Close every subscription and timer owned by a scope key.
    fn unsubscribe_scope(&mut self, scope_key: Key) -> Result<(), EngineError> {
        for sub in self.state.subscriptions_for_scope(scope_key)? {
            if sub.message.is_none() {
                if let Some(timer) = self.state.timer_for_scope(scope_key, &sub.element_id)? {
                    self.state.delete_timer(&timer)?;
                }
            }
            self.state.delete_catch_subscription(&sub)?;
        }
        Ok(())
    }

    /// Terminate every live child of a scope; returns how many were asked
    /// to terminate.
    fn terminate_children(&mut self, scope_key: Key) -> Result<usize, EngineError> {
        let mut terminating = 0;
        for child_key in self.state.children_of(scope_key)? {
            let Some(mut child) = self.state.instance(child_key)? else {
                continue;
            };
            if child.is_terminal() || child.state == ElementIntent::Terminating {
                continue;
            }
            self.transition(&mut child, ElementIntent::Terminating)?;
            terminating += 1;
        }
        Ok(terminating)
    }

    /// Delete an instance subtree when a process instance is archived.
    fn archive_subtree(&mut self, key: Key) -> Result<(), EngineError> {
        for child in self.state.children_of(key)? {
            self.archive_subtree(child)?;
        }
        if let Some(instance) = self.state.instance(key)? {
            self.state.delete_instance(&instance)?;
        }
        Ok(())
    }
}

/// The default guard: the instance exists, its persisted state equals the
/// intent being processed, and its flow scope (if any) is still active.
fn lifecycle_guard(ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
    let Some(instance) = ctx.state.instance(record.key)? else {
        return Ok(false);
    };
    if instance.state != record.intent {
        return Ok(false);
    }
    ctx.scope_is_active(instance.flow_scope)
}

/// Guard for the termination path: scope liveness is not required, the
/// cascade runs while ancestors are themselves terminating.
fn termination_guard(ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
    Ok(ctx
        .state
        .instance(record.key)?
        .map(|i| i.state == record.intent)
        .unwrap_or(false))
}

/// Apply variable mappings between two documents; the first missing source
/// aborts with its name.
fn apply_mappings(
    mappings: &[weir_model::VariableMapping],
    source: &Variables,
    target: &mut Variables,
) -> Result<(), String> {
    for mapping in mappings {
        match source.get(&mapping.source) {
            Some(value) => target.set(&mapping.target, value.clone()),
            None => return Err(mapping.source.clone()),
        }
    }
    Ok(())
}

// ----- step behaviors -----

struct StartProcessOrApplyEvent;

impl StepBehavior for StartProcessOrApplyEvent {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        // A start occurrence addresses a key that has no instance yet.
        if ctx.state.instance(record.key)?.is_some() {
            return Ok(false);
        }
        ctx.scope_is_active(record.value.flow_scope)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let scope_key = match record.value.flow_scope {
            Some(scope_key) => {
                // Apply the occurrence inside the running container.
                ctx.change_tokens(scope_key, 1)?;
                scope_key
            }
            None => {
                // Create a fresh process instance for the occurrence.
                let root_key = ctx.keys.next_key();
                let root = ElementInstance {
                    key: root_key,
                    process_id: record.value.process_id.clone(),
                    version: record.value.version,
                    element_id: record.value.process_id.clone(),
                    state: ElementIntent::Activated,
                    flow_scope: None,
                    active_tokens: 1,
                };
                ctx.state.put_instance(&root)?;
                ctx.state.put_variables(root_key, &record.value.variables)?;
                info!(
                    process = %record.value.process_id,
                    version = record.value.version,
                    key = %root_key,
                    "process instance created"
                );
                root_key
            }
        };

        let start = ElementInstance {
            key: record.key,
            process_id: record.value.process_id.clone(),
            version: record.value.version,
            element_id: record.value.element_id.clone(),
            state: ElementIntent::EventTriggered,
            flow_scope: Some(scope_key),
            active_tokens: 0,
        };
        ctx.state.put_instance(&start)?;
        ctx.append(
            record.key,
            ElementIntent::EventTriggered,
            &start,
            record.value.variables.clone(),
        );
        Ok(true)
    }
}

struct ActivateElement;

impl StepBehavior for ActivateElement {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        lifecycle_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let workflow = ctx.workflow_of(record)?;
        let element = ctx.element_of(&workflow, &record.value.element_id)?;
        let mut instance = ctx.state.expect_instance(record.key)?;

        let mut local = ctx.state.variables_of(record.key)?;
        local.merge(&record.value.variables);

        if !element.input_mappings.is_empty() {
            let scope_vars = match instance.flow_scope {
                Some(scope) => ctx.state.variables_of(scope)?,
                None => Variables::new(),
            };
            if let Err(missing) = apply_mappings(&element.input_mappings, &scope_vars, &mut local) {
                ctx.raise_incident(
                    &instance,
                    IncidentType::IoMappingError,
                    format!("input mapping failed: no variable named '{}'", missing),
                )?;
                return Ok(false);
            }
        }
        ctx.state.put_variables(record.key, &local)?;

        let next = match element.kind {
            ElementKind::EventBasedGateway { .. } => ElementIntent::GatewayActivated,
            _ => ElementIntent::Activated,
        };
        ctx.transition(&mut instance, next)?;
        Ok(true)
    }
}

struct ActivateEvent;

impl StepBehavior for ActivateEvent {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        lifecycle_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let workflow = ctx.workflow_of(record)?;
        let element = ctx.element_of(&workflow, &record.value.element_id)?;
        let mut instance = ctx.state.expect_instance(record.key)?;

        if !element.input_mappings.is_empty() {
            let scope_vars = match instance.flow_scope {
                Some(scope) => ctx.state.variables_of(scope)?,
                None => Variables::new(),
            };
            let mut local = ctx.state.variables_of(record.key)?;
            if let Err(missing) = apply_mappings(&element.input_mappings, &scope_vars, &mut local) {
                ctx.raise_incident(
                    &instance,
                    IncidentType::IoMappingError,
                    format!("input mapping failed: no variable named '{}'", missing),
                )?;
                return Ok(false);
            }
            ctx.state.put_variables(record.key, &local)?;
        }

        ctx.transition(&mut instance, ElementIntent::EventActivated)?;
        Ok(true)
    }
}

struct ActivateContainer;

impl StepBehavior for ActivateContainer {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        lifecycle_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let workflow = ctx.workflow_of(record)?;
        let element = ctx.element_of(&workflow, &record.value.element_id)?;

        // Only plain start events spawn on activation; message and timer
        // start events wait for their occurrence.
        for start_id in element.container_start_events().to_vec() {
            let start = ctx.element_of(&workflow, &start_id)?;
            if start.catch().is_some() {
                continue;
            }
            let key = ctx.keys.next_key();
            ctx.batch.push(ElementRecord {
                key,
                intent: ElementIntent::EventOccurred,
                value: ElementRecordValue {
                    process_id: record.value.process_id.clone(),
                    version: record.value.version,
                    element_id: start_id,
                    flow_scope: Some(record.key),
                    variables: Variables::new(),
                },
            });
        }
        Ok(true)
    }
}

struct SubscribeToEvents;

impl StepBehavior for SubscribeToEvents {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        lifecycle_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let workflow = ctx.workflow_of(record)?;
        let element = ctx.element_of(&workflow, &record.value.element_id)?;

        match &element.kind {
            ElementKind::Activity { boundary_events } => {
                // Each boundary event waits as a child of the activity, so
                // termination and completion of the host tear them down.
                let mut host = ctx.state.expect_instance(record.key)?;
                for boundary_id in boundary_events.clone() {
                    ctx.spawn(
                        record,
                        &boundary_id,
                        Some(record.key),
                        ElementIntent::Activating,
                        Variables::new(),
                    )?;
                    host.active_tokens += 1;
                }
                ctx.state.put_instance(&host)?;
            }
            ElementKind::BoundaryEvent { catch, .. } => {
                let catch = catch.clone();
                ctx.subscribe(record, record.key, &record.value.element_id, &catch)?;
            }
            ElementKind::IntermediateCatchEvent { catch } | ElementKind::ReceiveTask { catch } => {
                let catch = catch.clone();
                ctx.subscribe(record, record.key, &record.value.element_id, &catch)?;
            }
            ElementKind::EventBasedGateway { race_set } => {
                // Open the whole race at once; the first occurrence wins.
                for candidate_id in race_set.clone() {
                    let candidate = ctx.element_of(&workflow, &candidate_id)?;
                    let catch = candidate
                        .catch()
                        .cloned()
                        .ok_or_else(|| EngineError::ElementNotFound {
                            element: candidate_id.clone(),
                            process: workflow.process_id.clone(),
                        })?;
                    ctx.subscribe(record, record.key, &candidate_id, &catch)?;
                }
            }
            _ => {}
        }
        Ok(true)
    }
}

struct CompleteElement;

impl StepBehavior for CompleteElement {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        lifecycle_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let workflow = ctx.workflow_of(record)?;
        let element = ctx.element_of(&workflow, &record.value.element_id)?;
        let mut instance = ctx.state.expect_instance(record.key)?;

        if !element.output_mappings.is_empty() {
            if let Some(scope_key) = instance.flow_scope {
                let local = ctx.state.variables_of(record.key)?;
                let mut scope_vars = ctx.state.variables_of(scope_key)?;
                if let Err(missing) =
                    apply_mappings(&element.output_mappings, &local, &mut scope_vars)
                {
                    ctx.raise_incident(
                        &instance,
                        IncidentType::IoMappingError,
                        format!("output mapping failed: no variable named '{}'", missing),
                    )?;
                    return Ok(false);
                }
                ctx.state.put_variables(scope_key, &scope_vars)?;
            }
        }

        // A completing element no longer waits on anything; boundary
        // waiters still attached to it are torn down.
        ctx.unsubscribe_scope(record.key)?;
        ctx.terminate_children(record.key)?;

        let mut instance = ctx.state.expect_instance(instance.key)?;
        ctx.transition(&mut instance, ElementIntent::Completed)?;
        Ok(true)
    }
}

struct TakeOutgoingFlows;

impl StepBehavior for TakeOutgoingFlows {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        lifecycle_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let workflow = ctx.workflow_of(record)?;
        let element = ctx.element_of(&workflow, &record.value.element_id)?;
        let instance = ctx.state.expect_instance(record.key)?;

        let outgoing = element.outgoing.clone();
        if outgoing.is_empty() {
            ctx.consume_token(instance.flow_scope)?;
        } else {
            for target_id in &outgoing {
                let target = ctx.element_of(&workflow, target_id)?;
                let intent = match target.kind {
                    ElementKind::EndEvent => ElementIntent::EventActivating,
                    _ => ElementIntent::Activating,
                };
                ctx.spawn(
                    record,
                    target_id,
                    instance.flow_scope,
                    intent,
                    record.value.variables.clone(),
                )?;
            }

            // One token consumed, one spawned per outgoing flow.
            if let Some(scope_key) = instance.flow_scope {
                ctx.change_tokens(scope_key, outgoing.len() as i64 - 1)?;
            }
        }

        // An event instance settles once its token has moved on; from here
        // it only waits for archival.
        let mut instance = ctx.state.expect_instance(record.key)?;
        if instance.state != ElementIntent::Completed {
            instance.state = ElementIntent::Completed;
            ctx.state.put_instance(&instance)?;
        }
        Ok(true)
    }
}

struct ConsumeToken;

impl StepBehavior for ConsumeToken {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        lifecycle_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let instance = ctx.state.expect_instance(record.key)?;

        match instance.flow_scope {
            Some(scope) => ctx.consume_token(Some(scope))?,
            None => {
                // The process root completed: the whole instance is
                // archived.
                info!(
                    process = %instance.process_id,
                    key = %instance.key,
                    "process instance completed"
                );
                ctx.archive_subtree(instance.key)?;
            }
        }
        Ok(true)
    }
}

struct TerminateElement;

impl StepBehavior for TerminateElement {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        termination_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let mut instance = ctx.state.expect_instance(record.key)?;

        ctx.resolve_incidents(record.key)?;
        ctx.unsubscribe_scope(record.key)?;

        // Children terminate first; the last one terminating propagates back
        // up through PropagateTermination.
        let terminating_children = ctx.terminate_children(record.key)?;
        if terminating_children == 0 {
            ctx.transition(&mut instance, ElementIntent::Terminated)?;
        }
        Ok(true)
    }
}

struct PropagateTermination;

impl StepBehavior for PropagateTermination {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        termination_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let instance = ctx.state.expect_instance(record.key)?;

        ctx.resolve_incidents(record.key)?;

        // An interrupting boundary event parked its activation until the
        // host terminated; it spawns now, in the host's flow scope.
        let mut spawned = 0i64;
        if ctx.scope_is_active(instance.flow_scope)? {
            for deferred in ctx.state.take_deferred(record.key)? {
                let token = ElementInstance {
                    key: deferred.key,
                    process_id: deferred.value.process_id.clone(),
                    version: deferred.value.version,
                    element_id: deferred.value.element_id.clone(),
                    state: deferred.intent,
                    flow_scope: deferred.value.flow_scope,
                    active_tokens: 0,
                };
                ctx.state.put_instance(&token)?;
                ctx.batch.push(deferred);
                spawned += 1;
            }
        } else {
            ctx.state.take_deferred(record.key)?;
        }

        ctx.state.delete_instance(&instance)?;

        if let Some(scope_key) = instance.flow_scope {
            let scope = ctx.change_tokens(scope_key, spawned - 1)?;
            if scope.state == ElementIntent::Terminating && scope.active_tokens == 0 {
                let mut scope = scope;
                ctx.transition(&mut scope, ElementIntent::Terminated)?;
            }
        }
        Ok(true)
    }
}

struct DeliverEventTrigger;

impl StepBehavior for DeliverEventTrigger {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        // Consumed triggers make replayed occurrences no-ops.
        if ctx.state.peek_trigger(record.key)?.is_none() {
            return Ok(false);
        }
        let Some(instance) = ctx.state.instance(record.key)? else {
            return Ok(false);
        };
        let waiting = matches!(
            instance.state,
            ElementIntent::Activated | ElementIntent::GatewayActivated
        );
        if !waiting {
            return Ok(false);
        }
        ctx.scope_is_active(instance.flow_scope)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let workflow = ctx.workflow_of(record)?;
        let element = ctx.element_of(&workflow, &record.value.element_id)?;
        let mut instance = ctx.state.expect_instance(record.key)?;
        let trigger = ctx.state.peek_trigger(record.key)?.ok_or_else(|| {
            EngineError::InvalidOperation(format!(
                "no pending event trigger for scope {}",
                record.key
            ))
        })?;

        match &element.kind {
            ElementKind::IntermediateCatchEvent { .. } | ElementKind::ReceiveTask { .. } => {
                // The waiting element is its own winner.
                let mut local = ctx.state.variables_of(record.key)?;
                local.merge(&trigger.variables);
                ctx.state.put_variables(record.key, &local)?;

                ctx.state.delete_trigger(&trigger)?;
                ctx.unsubscribe_scope(record.key)?;
                ctx.transition(&mut instance, ElementIntent::Completing)?;
            }
            ElementKind::EventBasedGateway { .. } => {
                // First occurrence wins the race; every other subscription
                // closes with the scope.
                let winner = trigger.element_id.clone();
                ctx.state.delete_trigger(&trigger)?;
                ctx.unsubscribe_scope(record.key)?;

                ctx.spawn(
                    record,
                    &winner,
                    instance.flow_scope,
                    ElementIntent::CatchEventTriggering,
                    trigger.variables.clone(),
                )?;
                if let Some(scope_key) = instance.flow_scope {
                    ctx.change_tokens(scope_key, 1)?;
                }

                let mut instance = ctx.state.expect_instance(record.key)?;
                ctx.transition(&mut instance, ElementIntent::Completing)?;
            }
            ElementKind::BoundaryEvent {
                cancel_activity, ..
            } => {
                let host_key = instance
                    .flow_scope
                    .ok_or_else(|| EngineError::InvalidOperation(
                        "boundary event waiter has no host".to_string(),
                    ))?;
                let host = ctx.state.expect_instance(host_key)?;

                if *cancel_activity {
                    // Defer: the activation materializes once the host has
                    // terminated, so exactly one winner continues.
                    let key = ctx.keys.next_key();
                    let deferred = ElementRecord {
                        key,
                        intent: ElementIntent::CatchEventTriggering,
                        value: ElementRecordValue {
                            process_id: record.value.process_id.clone(),
                            version: record.value.version,
                            element_id: record.value.element_id.clone(),
                            flow_scope: host.flow_scope,
                            variables: trigger.variables.clone(),
                        },
                    };
                    ctx.state.put_deferred(host_key, &deferred)?;
                    ctx.state.delete_trigger(&trigger)?;

                    let mut host = host;
                    ctx.transition(&mut host, ElementIntent::Terminating)?;
                } else {
                    // Publish: spawn the new token immediately; the spawn
                    // and the trigger deletion commit in the same batch.
                    ctx.spawn(
                        record,
                        &record.value.element_id,
                        host.flow_scope,
                        ElementIntent::CatchEventTriggering,
                        trigger.variables.clone(),
                    )?;
                    if let Some(scope_key) = host.flow_scope {
                        ctx.change_tokens(scope_key, 1)?;
                    }
                    ctx.state.delete_trigger(&trigger)?;
                }
            }
            _ => {
                ctx.state.delete_trigger(&trigger)?;
                warn!(
                    element = %record.value.element_id,
                    "event trigger delivered to an element that cannot catch"
                );
                return Ok(false);
            }
        }
        Ok(true)
    }
}

struct TriggerEvent;

impl StepBehavior for TriggerEvent {
    fn should_handle(&self, ctx: &StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        lifecycle_guard(ctx, record)
    }

    fn handle(&self, ctx: &mut StepContext, record: &ElementRecord) -> Result<bool, EngineError> {
        let mut instance = ctx.state.expect_instance(record.key)?;

        // The trigger payload lands in both the local scope and the flow
        // scope, so successors can read it.
        if !record.value.variables.is_empty() {
            let mut local = ctx.state.variables_of(record.key)?;
            local.merge(&record.value.variables);
            ctx.state.put_variables(record.key, &local)?;

            if let Some(scope_key) = instance.flow_scope {
                let mut scope_vars = ctx.state.variables_of(scope_key)?;
                scope_vars.merge(&record.value.variables);
                ctx.state.put_variables(scope_key, &scope_vars)?;
            }
        }

        ctx.transition(&mut instance, ElementIntent::CatchEventTriggered)?;
        Ok(true)
    }
}
