//! Deployment processing integration tests.

mod common;

use common::*;

use weir_core::{EngineError, Variables};
use weir_model::{EventDefinition, FlowNodeKind, Process};

#[test]
fn test_rejected_deployment_applies_nothing() {
    let (mut engine, _clock) = engine();

    let broken = definition_of(
        Process {
            id: "broken".to_string(),
            elements: vec![
                node("start", FlowNodeKind::StartEvent { event: None }),
                node(
                    "wait",
                    FlowNodeKind::ReceiveTask {
                        message: "missing".to_string(),
                    },
                ),
            ],
            sequence_flows: vec![flow("f1", "start", "wait")],
        },
        &[],
    );

    match engine.deploy(&broken) {
        Err(EngineError::DeploymentRejected {
            rejection_type, ..
        }) => assert_eq!(rejection_type, "INVALID_MESSAGE_REF"),
        other => panic!("expected rejection, got {:?}", other),
    }

    // Nothing was applied: the process is unknown and creation fails.
    assert!(engine.workflows().latest("broken").unwrap().is_none());
    assert!(matches!(
        engine.create_instance("broken", Variables::new()),
        Err(EngineError::ProcessNotFound(_))
    ));
}

#[test]
fn test_versions_are_assigned_sequentially() {
    let (mut engine, _clock) = engine();
    let definition = linear_process("order");

    assert_eq!(engine.deploy(&definition).unwrap().version, 1);
    assert_eq!(engine.deploy(&definition).unwrap().version, 2);
    assert_eq!(engine.workflows().latest_version("order").unwrap(), Some(2));

    // Instances are created from the newest version.
    let created = engine.create_instance("order", Variables::new()).unwrap();
    assert!(created.records.iter().all(|r| r.value.version == 2));
}

#[test]
fn test_receive_task_resolves_deployed_message() {
    let (mut engine, _clock) = engine();
    let definition = definition_of(
        Process {
            id: "p".to_string(),
            elements: vec![
                node("start", FlowNodeKind::StartEvent { event: None }),
                node(
                    "wait",
                    FlowNodeKind::ReceiveTask {
                        message: "approval".to_string(),
                    },
                ),
                node("done", FlowNodeKind::EndEvent),
            ],
            sequence_flows: vec![flow("f1", "start", "wait"), flow("f2", "wait", "done")],
        },
        &["approval"],
    );
    engine.deploy(&definition).unwrap();
    engine.create_instance("p", Variables::new()).unwrap();

    let trail = engine.publish_message("approval", Variables::new()).unwrap();
    assert_eq!(
        intents_of(&trail, "wait"),
        vec![
            weir_model::ElementIntent::EventOccurred,
            weir_model::ElementIntent::Completing,
            weir_model::ElementIntent::Completed,
        ]
    );
}

#[test]
fn test_invalid_timer_expression_rejects_deployment() {
    let (mut engine, _clock) = engine();
    let broken = definition_of(
        Process {
            id: "p".to_string(),
            elements: vec![node(
                "start",
                FlowNodeKind::StartEvent {
                    event: Some(EventDefinition::Timer {
                        expression: "soonish".to_string(),
                    }),
                },
            )],
            sequence_flows: Vec::new(),
        },
        &[],
    );

    match engine.deploy(&broken) {
        Err(EngineError::DeploymentRejected { rejection_type, .. }) => {
            assert_eq!(rejection_type, "INVALID_TIMER");
        }
        other => panic!("expected rejection, got {:?}", other),
    }
}
