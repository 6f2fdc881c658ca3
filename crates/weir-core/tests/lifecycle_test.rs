//! Element lifecycle integration tests: activation, completion, token
//! accounting, termination, and incident handling.

mod common;

use common::*;
use serde_json::json;

use weir_core::{ElementRecord, IncidentType, Key, Variables};
use weir_model::{ElementIntent, FlowNodeKind, Process};

fn key_of(records: &[ElementRecord], element_id: &str, intent: ElementIntent) -> Key {
    records
        .iter()
        .find(|r| r.value.element_id == element_id && r.intent == intent)
        .unwrap_or_else(|| panic!("no {:?} record for '{}'", intent, element_id))
        .key
}

#[test]
fn test_linear_process_runs_to_completion() {
    let (mut engine, _clock) = engine();
    engine.deploy(&linear_process("order")).unwrap();

    let created = engine
        .create_instance("order", Variables::from_pairs(&[("total", json!(99))]))
        .unwrap();

    // The activity reaches its business phase and waits.
    assert_eq!(
        intents_of(&created.records, "work"),
        vec![ElementIntent::Activating, ElementIntent::Activated]
    );
    let work_key = key_of(&created.records, "work", ElementIntent::Activated);

    let mut trail = created.records;
    trail.extend(engine.complete_element(work_key).unwrap());

    assert_lifecycle_completed(&trail, "work");
    assert_eq!(
        intents_of(&trail, "start"),
        vec![ElementIntent::EventOccurred, ElementIntent::EventTriggered]
    );
    assert_eq!(
        intents_of(&trail, "done"),
        vec![ElementIntent::EventActivating, ElementIntent::EventActivated]
    );

    // The root scope completed exactly once and the instance was archived.
    assert_eq!(
        intents_of(&trail, "order"),
        vec![
            ElementIntent::Activating,
            ElementIntent::Activated,
            ElementIntent::Completing,
            ElementIntent::Completed,
        ]
    );
    assert_eq!(
        engine.state().instance(created.process_instance_key).unwrap(),
        None
    );
}

#[test]
fn test_no_state_is_skipped_on_the_happy_path() {
    let (mut engine, _clock) = engine();
    engine.deploy(&linear_process("order")).unwrap();

    let created = engine.create_instance("order", Variables::new()).unwrap();
    let work_key = key_of(&created.records, "work", ElementIntent::Activated);
    let mut trail = created.records;
    trail.extend(engine.complete_element(work_key).unwrap());

    // Lifecycle intents per instance key must follow the automaton.
    let order = [
        ElementIntent::Activating,
        ElementIntent::Activated,
        ElementIntent::Completing,
        ElementIntent::Completed,
    ];
    let mut keys: Vec<Key> = trail.iter().map(|r| r.key).collect();
    keys.sort();
    keys.dedup();

    for key in keys {
        let observed: Vec<ElementIntent> = trail
            .iter()
            .filter(|r| r.key == key && order.contains(&r.intent))
            .map(|r| r.intent)
            .collect();
        let expected: Vec<ElementIntent> = order
            .iter()
            .filter(|intent| observed.contains(intent))
            .copied()
            .collect();
        assert_eq!(observed, expected, "out-of-order lifecycle for key {}", key);
    }
}

#[test]
fn test_completing_root_emitted_once_for_parallel_tokens() {
    // One start event fanning out to two activities; the scope completes
    // only after the second one.
    let (mut engine, _clock) = engine();
    let definition = definition_of(
        Process {
            id: "fan".to_string(),
            elements: vec![
                node("start", FlowNodeKind::StartEvent { event: None }),
                node("left", FlowNodeKind::Activity),
                node("right", FlowNodeKind::Activity),
                node("left-done", FlowNodeKind::EndEvent),
                node("right-done", FlowNodeKind::EndEvent),
            ],
            sequence_flows: vec![
                flow("f1", "start", "left"),
                flow("f2", "start", "right"),
                flow("f3", "left", "left-done"),
                flow("f4", "right", "right-done"),
            ],
        },
        &[],
    );
    engine.deploy(&definition).unwrap();

    let created = engine.create_instance("fan", Variables::new()).unwrap();
    let left_key = key_of(&created.records, "left", ElementIntent::Activated);
    let right_key = key_of(&created.records, "right", ElementIntent::Activated);

    let mut trail = created.records;
    trail.extend(engine.complete_element(left_key).unwrap());
    assert_eq!(intents_of(&trail, "fan").len(), 2, "scope must still be running");

    trail.extend(engine.complete_element(right_key).unwrap());
    let root_intents = intents_of(&trail, "fan");
    assert_eq!(
        root_intents
            .iter()
            .filter(|i| **i == ElementIntent::Completing)
            .count(),
        1,
        "scope completion must propagate exactly once"
    );
    assert_eq!(*root_intents.last().unwrap(), ElementIntent::Completed);
}

#[test]
fn test_terminate_cancels_the_whole_cascade() {
    let (mut engine, _clock) = engine();
    engine.deploy(&linear_process("order")).unwrap();

    let created = engine.create_instance("order", Variables::new()).unwrap();
    let work_key = key_of(&created.records, "work", ElementIntent::Activated);

    let trail = engine.terminate_element(work_key).unwrap();
    assert_eq!(
        intents_of(&trail, "work"),
        vec![ElementIntent::Terminating, ElementIntent::Terminated]
    );
    assert_eq!(engine.state().instance(work_key).unwrap(), None);

    // The root was not terminating, so termination does not propagate to it.
    assert!(intents_of(&trail, "order").is_empty());
}

#[test]
fn test_input_mapping_failure_raises_incident_and_stalls() {
    let (mut engine, _clock) = engine();

    let mut work = node("work", FlowNodeKind::Activity);
    work.input_mappings = vec![mapping("amount", "localAmount")];
    let definition = definition_of(
        Process {
            id: "pay".to_string(),
            elements: vec![
                node("start", FlowNodeKind::StartEvent { event: None }),
                work,
                node("done", FlowNodeKind::EndEvent),
            ],
            sequence_flows: vec![flow("f1", "start", "work"), flow("f2", "work", "done")],
        },
        &[],
    );
    engine.deploy(&definition).unwrap();

    // No "amount" variable anywhere: activation must stall.
    let created = engine.create_instance("pay", Variables::new()).unwrap();
    assert_eq!(
        intents_of(&created.records, "work"),
        vec![ElementIntent::Activating],
        "the transition must not happen"
    );

    let work_key = key_of(&created.records, "work", ElementIntent::Activating);
    let incidents = engine.state().incidents_for_instance(work_key).unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].error_type, IncidentType::IoMappingError);
    assert_eq!(incidents[0].stalled_intent, ElementIntent::Activating);

    // Operator repairs the cause, then resolves: processing resumes.
    engine
        .state()
        .put_variables(
            created.process_instance_key,
            &Variables::from_pairs(&[("amount", json!(42))]),
        )
        .unwrap();
    let resumed = engine.resolve_incident(incidents[0].key).unwrap();
    assert_eq!(
        intents_of(&resumed, "work"),
        vec![ElementIntent::Activating, ElementIntent::Activated]
    );
    assert!(engine
        .state()
        .incidents_for_instance(work_key)
        .unwrap()
        .is_empty());

    // The mapped variable landed in the local scope.
    let local = engine.state().variables_of(work_key).unwrap();
    assert_eq!(local.get("localAmount"), Some(&json!(42)));
}

#[test]
fn test_output_mapping_copies_back_to_scope() {
    let (mut engine, _clock) = engine();

    let mut work = node("work", FlowNodeKind::Activity);
    work.output_mappings = vec![mapping("result", "orderResult")];
    let definition = definition_of(
        Process {
            id: "pay".to_string(),
            elements: vec![
                node("start", FlowNodeKind::StartEvent { event: None }),
                work,
                node("done", FlowNodeKind::EndEvent),
            ],
            sequence_flows: vec![flow("f1", "start", "work"), flow("f2", "work", "done")],
        },
        &[],
    );
    engine.deploy(&definition).unwrap();

    let created = engine.create_instance("pay", Variables::new()).unwrap();
    let work_key = key_of(&created.records, "work", ElementIntent::Activated);

    engine
        .state()
        .put_variables(work_key, &Variables::from_pairs(&[("result", json!("ok"))]))
        .unwrap();
    let root_key = created.process_instance_key;

    // Completing applies the output mapping before the scope archives, so
    // check the scope document inside the completion trail.
    let trail = engine.complete_element(work_key).unwrap();
    assert_lifecycle_completed(
        &[created.records.clone(), trail.clone()].concat(),
        "work",
    );
    // The root is archived at the end of the trail; the mapping was applied
    // on the way. A failed mapping would instead have stalled with an
    // incident.
    assert!(engine.state().incidents_for_instance(work_key).unwrap().is_empty());
    assert!(engine.state().instance(root_key).unwrap().is_none());
}

#[test]
fn test_subprocess_runs_nested_tokens() {
    let (mut engine, _clock) = engine();
    let definition = definition_of(
        Process {
            id: "outer".to_string(),
            elements: vec![
                node("start", FlowNodeKind::StartEvent { event: None }),
                node("sub", FlowNodeKind::Subprocess),
                scoped_node("inner-start", "sub", FlowNodeKind::StartEvent { event: None }),
                scoped_node("inner-work", "sub", FlowNodeKind::Activity),
                scoped_node("inner-done", "sub", FlowNodeKind::EndEvent),
                node("done", FlowNodeKind::EndEvent),
            ],
            sequence_flows: vec![
                flow("f1", "start", "sub"),
                flow("f2", "inner-start", "inner-work"),
                flow("f3", "inner-work", "inner-done"),
                flow("f4", "sub", "done"),
            ],
        },
        &[],
    );
    engine.deploy(&definition).unwrap();

    let created = engine.create_instance("outer", Variables::new()).unwrap();
    assert_eq!(
        intents_of(&created.records, "inner-work"),
        vec![ElementIntent::Activating, ElementIntent::Activated]
    );
    let inner_key = key_of(&created.records, "inner-work", ElementIntent::Activated);

    let mut trail = created.records;
    trail.extend(engine.complete_element(inner_key).unwrap());

    // Subprocess completes when its last token is consumed, then the outer
    // scope continues and completes.
    assert_lifecycle_completed(&trail, "sub");
    assert_lifecycle_completed(&trail, "inner-work");
    assert_eq!(
        intents_of(&trail, "outer").last(),
        Some(&ElementIntent::Completed)
    );
}

#[test]
fn test_replayed_record_is_ignored() {
    let (mut engine, _clock) = engine();
    engine.deploy(&linear_process("order")).unwrap();

    let created = engine.create_instance("order", Variables::new()).unwrap();
    let activating = created
        .records
        .iter()
        .find(|r| r.value.element_id == "work" && r.intent == ElementIntent::Activating)
        .unwrap()
        .clone();

    // The instance has moved past Activating; a stale duplicate is a no-op.
    let follow_ups = engine.process(&activating).unwrap();
    assert!(follow_ups.is_empty());
}
