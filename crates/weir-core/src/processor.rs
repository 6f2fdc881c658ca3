//! Per-partition processing actor.
//!
//! One processor owns one partition's state and consumes that partition's
//! records strictly in order. Handling a record runs synchronously against
//! the state store view; follow-up records are appended to a batch, drained
//! after the record commits, and fed back through the same loop. Nothing in
//! this path blocks, and all time comes from the injected clock.

use std::collections::VecDeque;
use std::sync::Arc;

use tracing::debug;

use weir_model::{ElementIntent, ProcessDefinition};

use crate::clock::ActorClock;
use crate::config::EngineConfig;
use crate::deployment::{apply_deployment, DeploymentResult};
use crate::error::EngineError;
use crate::key::{Key, KeyGenerator};
use crate::lifecycle::{dispatch, StepContext};
use crate::record::{ElementRecord, ElementRecordValue, RecordBatch};
use crate::registry::WorkflowRegistry;
use crate::state::{EngineState, StateStore};
use crate::trigger::EventTrigger;
use crate::types::Variables;

/// A created process instance and the records its creation produced.
#[derive(Debug)]
pub struct CreatedInstance {
    /// Key of the process root instance
    pub process_instance_key: Key,

    /// Every record appended while driving the creation to quiescence
    pub records: Vec<ElementRecord>,
}

/// The logical processing actor of one partition.
pub struct PartitionProcessor {
    config: EngineConfig,
    state: EngineState,
    workflows: WorkflowRegistry,
    keys: KeyGenerator,
    clock: Arc<dyn ActorClock>,
}

impl PartitionProcessor {
    /// A processor over the given store and clock.
    pub fn new(config: EngineConfig, store: Arc<dyn StateStore>, clock: Arc<dyn ActorClock>) -> Self {
        let keys = KeyGenerator::new(config.partition_id);
        Self {
            config,
            state: EngineState::new(store),
            workflows: WorkflowRegistry::new(),
            keys,
            clock,
        }
    }

    /// The engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Typed access to this partition's state, for inspection.
    pub fn state(&self) -> &EngineState {
        &self.state
    }

    /// The deployed workflow registry.
    pub fn workflows(&self) -> &WorkflowRegistry {
        &self.workflows
    }

    /// Deploy a definition: transform every process, store the compiled
    /// workflows, and swap message and timer start subscriptions atomically.
    pub fn deploy(&mut self, definition: &ProcessDefinition) -> Result<DeploymentResult, EngineError> {
        apply_deployment(
            definition,
            &self.workflows,
            &self.state,
            &mut self.keys,
            self.clock.as_ref(),
        )
    }

    /// Handle a single record and return its follow-up records without
    /// processing them. Replay and crash-recovery tests drive this directly.
    pub fn process(&mut self, record: &ElementRecord) -> Result<Vec<ElementRecord>, EngineError> {
        let mut batch = RecordBatch::new();
        let mut ctx = StepContext {
            state: &self.state,
            workflows: &self.workflows,
            keys: &mut self.keys,
            clock: self.clock.as_ref(),
            batch: &mut batch,
        };
        let handled = dispatch(&mut ctx, record)?;
        if !handled {
            debug!(key = %record.key, intent = ?record.intent, "record ignored");
        }
        Ok(batch.drain())
    }

    /// Feed records through the loop until no follow-ups remain, returning
    /// the full appended sequence in log order.
    pub fn run(&mut self, records: Vec<ElementRecord>) -> Result<Vec<ElementRecord>, EngineError> {
        let mut log: Vec<ElementRecord> = Vec::new();
        let mut queue: VecDeque<ElementRecord> = records.into();

        while let Some(record) = queue.pop_front() {
            let follow_ups = self.process(&record)?;
            log.push(record);
            for follow_up in follow_ups {
                queue.push_back(follow_up);
            }
        }

        Ok(log)
    }

    /// Create an instance of the latest version of a process.
    pub fn create_instance(
        &mut self,
        process_id: &str,
        variables: Variables,
    ) -> Result<CreatedInstance, EngineError> {
        let workflow = self
            .workflows
            .latest(process_id)?
            .ok_or_else(|| EngineError::ProcessNotFound(process_id.to_string()))?;

        let root_key = self.keys.next_key();
        let root = crate::instance::ElementInstance {
            key: root_key,
            process_id: workflow.process_id.clone(),
            version: workflow.version,
            element_id: workflow.process_id.clone(),
            state: ElementIntent::Activating,
            flow_scope: None,
            active_tokens: 0,
        };
        self.state.put_instance(&root)?;

        let records = self.run(vec![ElementRecord {
            key: root_key,
            intent: ElementIntent::Activating,
            value: ElementRecordValue {
                process_id: workflow.process_id.clone(),
                version: workflow.version,
                element_id: workflow.process_id.clone(),
                flow_scope: None,
                variables,
            },
        }])?;

        Ok(CreatedInstance {
            process_instance_key: root_key,
            records,
        })
    }

    /// Complete a waiting element instance, driving the instance forward.
    pub fn complete_element(&mut self, key: Key) -> Result<Vec<ElementRecord>, EngineError> {
        let mut instance = self.state.expect_instance(key)?;
        if instance.state != ElementIntent::Activated {
            return Err(EngineError::InvalidOperation(format!(
                "cannot complete element instance {} in state {:?}",
                key, instance.state
            )));
        }
        instance.state = ElementIntent::Completing;
        self.state.put_instance(&instance)?;

        self.run(vec![ElementRecord {
            key,
            intent: ElementIntent::Completing,
            value: record_value_of(&instance),
        }])
    }

    /// Forcibly terminate an element instance and everything beneath it.
    pub fn terminate_element(&mut self, key: Key) -> Result<Vec<ElementRecord>, EngineError> {
        let mut instance = self.state.expect_instance(key)?;
        if instance.is_terminal() || instance.state == ElementIntent::Terminating {
            return Err(EngineError::InvalidOperation(format!(
                "cannot terminate element instance {} in state {:?}",
                key, instance.state
            )));
        }
        instance.state = ElementIntent::Terminating;
        self.state.put_instance(&instance)?;

        self.run(vec![ElementRecord {
            key,
            intent: ElementIntent::Terminating,
            value: record_value_of(&instance),
        }])
    }

    /// Publish a message: correlate to open catch subscriptions and to the
    /// owning message start subscription, if any.
    pub fn publish_message(
        &mut self,
        name: &str,
        variables: Variables,
    ) -> Result<Vec<ElementRecord>, EngineError> {
        let mut records = Vec::new();

        for sub in self.state.subscriptions_for_message(name)? {
            let Some(owner) = self.state.instance(sub.scope_key)? else {
                continue;
            };
            // A scope that moved past its waiting state must not accumulate
            // triggers it will never consume.
            if !is_waiting(&owner) {
                continue;
            }
            self.state.push_trigger(&EventTrigger {
                trigger_key: self.keys.next_key(),
                scope_key: sub.scope_key,
                element_id: sub.element_id.clone(),
                variables: variables.clone(),
            })?;
            records.push(ElementRecord {
                key: sub.scope_key,
                intent: ElementIntent::EventOccurred,
                value: ElementRecordValue {
                    process_id: sub.process_id.clone(),
                    version: sub.version,
                    element_id: owner.element_id.clone(),
                    flow_scope: owner.flow_scope,
                    variables: Variables::new(),
                },
            });
        }

        if let Some(start) = self.state.message_start(name)? {
            records.push(ElementRecord {
                key: self.keys.next_key(),
                intent: ElementIntent::EventOccurred,
                value: ElementRecordValue {
                    process_id: start.process_id.clone(),
                    version: start.version,
                    element_id: start.element_id.clone(),
                    flow_scope: None,
                    variables: variables.clone(),
                },
            });
        }

        self.run(records)
    }

    /// Fire every timer due at the injected clock's current instant.
    pub fn fire_due_timers(&mut self) -> Result<Vec<ElementRecord>, EngineError> {
        let now_ms = self.clock.now().timestamp_millis();
        let mut records = Vec::new();

        for timer in self.state.due_timers(now_ms)? {
            self.state.delete_timer(&timer)?;

            match timer.scope_key {
                Some(scope_key) => {
                    let Some(owner) = self.state.instance(scope_key)? else {
                        continue;
                    };
                    if !is_waiting(&owner) {
                        continue;
                    }
                    self.state.push_trigger(&EventTrigger {
                        trigger_key: self.keys.next_key(),
                        scope_key,
                        element_id: timer.element_id.clone(),
                        variables: Variables::new(),
                    })?;
                    records.push(ElementRecord {
                        key: scope_key,
                        intent: ElementIntent::EventOccurred,
                        value: ElementRecordValue {
                            process_id: timer.process_id.clone(),
                            version: timer.version,
                            element_id: owner.element_id.clone(),
                            flow_scope: owner.flow_scope,
                            variables: Variables::new(),
                        },
                    });
                }
                None => {
                    records.push(ElementRecord {
                        key: self.keys.next_key(),
                        intent: ElementIntent::EventOccurred,
                        value: ElementRecordValue {
                            process_id: timer.process_id.clone(),
                            version: timer.version,
                            element_id: timer.element_id.clone(),
                            flow_scope: None,
                            variables: Variables::new(),
                        },
                    });
                }
            }

            // A repeating timer reschedules itself from its previous due
            // instant, keeping the cadence stable.
            let remaining = match timer.repetitions {
                Some(1) => None,
                Some(n) => Some(Some(n - 1)),
                None => Some(None),
            };
            if let Some(repetitions) = remaining {
                let mut next = timer.clone();
                next.repetitions = repetitions;
                next.due_ms = timer.due_ms + timer.interval_ms;
                self.state.put_timer(&next)?;
            }
        }

        self.run(records)
    }

    /// Resolve an incident and re-enqueue the record whose handling failed.
    pub fn resolve_incident(&mut self, incident_key: Key) -> Result<Vec<ElementRecord>, EngineError> {
        let incident = self
            .state
            .incident(incident_key)?
            .ok_or(EngineError::IncidentNotFound(incident_key))?;
        self.state.delete_incident(&incident)?;

        let instance = self.state.expect_instance(incident.element_instance_key)?;
        self.run(vec![ElementRecord {
            key: instance.key,
            intent: incident.stalled_intent,
            value: record_value_of(&instance),
        }])
    }
}

fn is_waiting(instance: &crate::instance::ElementInstance) -> bool {
    matches!(
        instance.state,
        ElementIntent::Activated | ElementIntent::GatewayActivated
    )
}

fn record_value_of(instance: &crate::instance::ElementInstance) -> ElementRecordValue {
    ElementRecordValue {
        process_id: instance.process_id.clone(),
        version: instance.version,
        element_id: instance.element_id.clone(),
        flow_scope: instance.flow_scope,
        variables: Variables::new(),
    }
}
