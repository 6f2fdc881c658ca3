//! Shared fixtures for the engine integration tests.

// Not every test binary uses every fixture.
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use weir_core::{
    ElementRecord, EngineConfig, ManualClock, MemoryStateStore, PartitionProcessor,
};
use weir_model::{
    ElementIntent, EventDefinition, FlowNode, FlowNodeKind, MessageDefinition, Process,
    ProcessDefinition, SequenceFlow, VariableMapping,
};

/// A processor over fresh in-memory state with a pinned manual clock.
pub fn engine() -> (PartitionProcessor, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::at(
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
    ));
    let processor = PartitionProcessor::new(
        EngineConfig::single_partition(),
        Arc::new(MemoryStateStore::new()),
        clock.clone(),
    );
    (processor, clock)
}

pub fn node(id: &str, kind: FlowNodeKind) -> FlowNode {
    FlowNode {
        id: id.to_string(),
        parent: None,
        kind,
        input_mappings: Vec::new(),
        output_mappings: Vec::new(),
    }
}

pub fn scoped_node(id: &str, parent: &str, kind: FlowNodeKind) -> FlowNode {
    FlowNode {
        id: id.to_string(),
        parent: Some(parent.to_string()),
        kind,
        input_mappings: Vec::new(),
        output_mappings: Vec::new(),
    }
}

pub fn flow(id: &str, source: &str, target: &str) -> SequenceFlow {
    SequenceFlow {
        id: id.to_string(),
        source: source.to_string(),
        target: target.to_string(),
    }
}

pub fn mapping(source: &str, target: &str) -> VariableMapping {
    VariableMapping {
        source: source.to_string(),
        target: target.to_string(),
    }
}

pub fn definition_of(process: Process, messages: &[&str]) -> ProcessDefinition {
    ProcessDefinition {
        processes: vec![process],
        messages: messages
            .iter()
            .map(|name| MessageDefinition {
                name: name.to_string(),
            })
            .collect(),
    }
}

/// `start -> work -> done`
pub fn linear_process(id: &str) -> ProcessDefinition {
    definition_of(
        Process {
            id: id.to_string(),
            elements: vec![
                node("start", FlowNodeKind::StartEvent { event: None }),
                node("work", FlowNodeKind::Activity),
                node("done", FlowNodeKind::EndEvent),
            ],
            sequence_flows: vec![flow("f1", "start", "work"), flow("f2", "work", "done")],
        },
        &[],
    )
}

/// `start -> work (boundary timer) -> done`, boundary path to its own end.
pub fn boundary_timer_process(id: &str, expression: &str, cancel_activity: bool) -> ProcessDefinition {
    definition_of(
        Process {
            id: id.to_string(),
            elements: vec![
                node("start", FlowNodeKind::StartEvent { event: None }),
                node("work", FlowNodeKind::Activity),
                node(
                    "late",
                    FlowNodeKind::BoundaryEvent {
                        attached_to: "work".to_string(),
                        cancel_activity,
                        event: EventDefinition::Timer {
                            expression: expression.to_string(),
                        },
                    },
                ),
                node("done", FlowNodeKind::EndEvent),
                node("late-done", FlowNodeKind::EndEvent),
            ],
            sequence_flows: vec![
                flow("f1", "start", "work"),
                flow("f2", "work", "done"),
                flow("f3", "late", "late-done"),
            ],
        },
        &[],
    )
}

/// Intents observed for one element id, in log order.
pub fn intents_of(records: &[ElementRecord], element_id: &str) -> Vec<ElementIntent> {
    records
        .iter()
        .filter(|r| r.value.element_id == element_id)
        .map(|r| r.intent)
        .collect()
}

/// Assert the element went through the happy lifecycle path.
pub fn assert_lifecycle_completed(records: &[ElementRecord], element_id: &str) {
    assert_eq!(
        intents_of(records, element_id),
        vec![
            ElementIntent::Activating,
            ElementIntent::Activated,
            ElementIntent::Completing,
            ElementIntent::Completed,
        ],
        "unexpected lifecycle for '{}'",
        element_id
    );
}
