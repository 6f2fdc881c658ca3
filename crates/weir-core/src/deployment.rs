//! Deployment processing.
//!
//! A deployment either applies completely or not at all: every process in
//! the definition transforms before anything is stored, and the message and
//! timer start-event swaps happen in the same synchronous step as the
//! registry update, so there is never an observable window with zero or two
//! active subscriptions for the same message name.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use weir_model::{transform_definition, CatchBehavior, ProcessDefinition};

use crate::clock::ActorClock;
use crate::error::EngineError;
use crate::key::KeyGenerator;
use crate::registry::WorkflowRegistry;
use crate::state::EngineState;
use crate::subscription::{MessageStartSubscription, TimerRecord};

/// Outcome of a successful deployment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentResult {
    /// Version assigned to every process in the deployment
    pub version: u32,

    /// Deployed process ids
    pub processes: Vec<String>,
}

/// Transform and apply one deployment.
pub(crate) fn apply_deployment(
    definition: &ProcessDefinition,
    workflows: &WorkflowRegistry,
    state: &EngineState,
    keys: &mut KeyGenerator,
    clock: &dyn ActorClock,
) -> Result<DeploymentResult, EngineError> {
    let version = 1 + definition
        .processes
        .iter()
        .map(|p| workflows.latest_version(&p.id).map(|v| v.unwrap_or(0)))
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .max()
        .unwrap_or(0);

    // Transform everything first; a rejection leaves no partial graph.
    let compiled = transform_definition(definition, version)?;

    let mut processes = Vec::with_capacity(compiled.len());
    for workflow in compiled {
        let workflow = Arc::new(workflow);
        processes.push(workflow.process_id.clone());

        // Close every subscription opened by the newest prior version that
        // exposed a message start event, then open exactly one for the new
        // version. Both sides of the swap commit together.
        for stale in state.message_starts_for_process(&workflow.process_id)? {
            debug!(
                process = %stale.process_id,
                version = stale.version,
                message = %stale.message,
                "closing prior message start subscription"
            );
            state.delete_message_start(&stale.message)?;
        }
        if let Some(start) = workflow.message_start_event() {
            if let Some(CatchBehavior::Message(name)) = start.catch() {
                state.put_message_start(&MessageStartSubscription {
                    message: name.clone(),
                    process_id: workflow.process_id.clone(),
                    version,
                    element_id: start.id.clone(),
                })?;
            }
        }

        // Timer start events are computed once at deploy time; any previous
        // timer tied to an older version is unsubscribed first.
        if let Some(stale) = state.start_timer_for_process(&workflow.process_id)? {
            state.delete_timer(&stale)?;
        }
        if let Some(start) = workflow.timer_start_event() {
            if let Some(CatchBehavior::Timer(interval)) = start.catch() {
                let due = clock.now() + interval.interval();
                state.put_timer(&TimerRecord {
                    timer_key: keys.next_key(),
                    due_ms: due.timestamp_millis(),
                    element_id: start.id.clone(),
                    process_id: workflow.process_id.clone(),
                    version,
                    scope_key: None,
                    repetitions: interval.repetitions,
                    interval_ms: interval.interval_ms,
                })?;
            }
        }

        workflows.insert(workflow)?;
    }

    info!(version, count = processes.len(), "deployment applied");
    Ok(DeploymentResult { version, processes })
}
