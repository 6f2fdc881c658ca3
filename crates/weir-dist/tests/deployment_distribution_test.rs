//! End-to-end deployment distribution over a lossy transport: the origin
//! retries until every partition acknowledged, receivers apply exactly
//! once, and duplicated deliveries or acknowledgements change nothing.

use std::sync::Arc;

use weir_core::{
    EngineConfig, Key, MemoryStateStore, PartitionId, PartitionProcessor, SystemClock, Variables,
};
use weir_dist::{
    deploy::{distribute_deployment, receive_deployment},
    CommandDistributor, DistributionError, DistributionIntent, DistributionOptions,
    DistributionState, InterPartitionSender, MemoryTransport, RedistributionConfig, Redistributor,
    StaticTopology,
};
use weir_model::{
    FlowNode, FlowNodeKind, Process, ProcessDefinition, SequenceFlow,
};

struct Partition {
    processor: PartitionProcessor,
    dist_state: DistributionState,
}

fn partition(id: u32) -> Partition {
    let store = Arc::new(MemoryStateStore::new());
    Partition {
        processor: PartitionProcessor::new(
            EngineConfig {
                partition_id: PartitionId(id),
                partition_count: 3,
            },
            store.clone(),
            Arc::new(SystemClock),
        ),
        dist_state: DistributionState::new(store),
    }
}

fn order_process() -> ProcessDefinition {
    ProcessDefinition {
        processes: vec![Process {
            id: "order".to_string(),
            elements: vec![
                FlowNode {
                    id: "start".to_string(),
                    parent: None,
                    kind: FlowNodeKind::StartEvent { event: None },
                    input_mappings: Vec::new(),
                    output_mappings: Vec::new(),
                },
                FlowNode {
                    id: "done".to_string(),
                    parent: None,
                    kind: FlowNodeKind::EndEvent,
                    input_mappings: Vec::new(),
                    output_mappings: Vec::new(),
                },
            ],
            sequence_flows: vec![SequenceFlow {
                id: "f1".to_string(),
                source: "start".to_string(),
                target: "done".to_string(),
            }],
        }],
        messages: Vec::new(),
    }
}

#[tokio::test]
async fn test_deployment_reaches_every_partition_despite_loss() {
    let mut origin = partition(1);
    let mut receiver_2 = partition(2);
    let mut receiver_3 = partition(3);

    let distributor = CommandDistributor::new(
        origin.dist_state.clone(),
        Arc::new(StaticTopology::with_partitions(
            PartitionId(1),
            vec![PartitionId(1), PartitionId(2), PartitionId(3)],
        )),
    );
    let mut redistributor = Redistributor::new(
        origin.dist_state.clone(),
        RedistributionConfig {
            interval: std::time::Duration::from_secs(10),
            max_backoff: std::time::Duration::from_secs(40),
        },
    );

    let transport = Arc::new(MemoryTransport::new());
    let mut inbox_2 = transport.register(PartitionId(2));
    let mut inbox_3 = transport.register(PartitionId(3));

    // The origin applies the deployment locally, then replicates it.
    let definition = order_process();
    origin.processor.deploy(&definition).unwrap();

    let key = Key::new(PartitionId(1), 1_000);
    let outcome =
        distribute_deployment(&distributor, key, &definition, DistributionOptions::default())
            .unwrap();

    // Partition 3's link is down: its copies vanish in flight.
    transport.set_drop_filter(|to, _| to == PartitionId(3));
    for (to, command) in outcome.sends {
        transport.send(to, command).await;
    }

    // Partition 2 receives, applies, and acknowledges.
    let command = inbox_2.recv().await.unwrap();
    let (ack_to, _ack) = receive_deployment(&receiver_2.dist_state, &mut receiver_2.processor, &command)
        .unwrap();
    assert_eq!(ack_to, PartitionId(1));
    distributor.acknowledge(key, PartitionId(2)).unwrap();

    assert_eq!(
        distributor.state().pending_for(key).unwrap(),
        vec![PartitionId(3)]
    );

    // Two redistribution ticks happen while the link is still down.
    for (to, command) in redistributor.tick().unwrap() {
        transport.send(to, command).await;
    }
    for (to, command) in redistributor.tick().unwrap() {
        transport.send(to, command).await;
    }
    assert!(inbox_3.try_recv().is_err(), "nothing got through yet");

    // The link heals; the backoff resends on the fourth attempt.
    transport.clear_drop_filter();
    let mut delivered = false;
    for _ in 0..4 {
        for (to, command) in redistributor.tick().unwrap() {
            transport.send(to, command).await;
            delivered = true;
        }
        if delivered {
            break;
        }
    }
    assert!(delivered);

    let command = inbox_3.recv().await.unwrap();
    receive_deployment(&receiver_3.dist_state, &mut receiver_3.processor, &command).unwrap();
    let outcome = distributor.acknowledge(key, PartitionId(3)).unwrap();
    assert_eq!(
        outcome.outputs.last().unwrap().intent(),
        Some(DistributionIntent::Finished)
    );

    // Every partition can now run the deployed process.
    for receiver in [&mut receiver_2, &mut receiver_3] {
        assert_eq!(
            receiver.processor.workflows().latest_version("order").unwrap(),
            Some(1)
        );
        let created = receiver
            .processor
            .create_instance("order", Variables::new())
            .unwrap();
        assert!(!created.records.is_empty());
    }
}

#[tokio::test]
async fn test_redelivered_deployment_applies_exactly_once() {
    let mut origin = partition(1);
    let mut receiver = partition(2);

    let distributor = CommandDistributor::new(
        origin.dist_state.clone(),
        Arc::new(StaticTopology::with_partitions(
            PartitionId(1),
            vec![PartitionId(1), PartitionId(2)],
        )),
    );

    let definition = order_process();
    origin.processor.deploy(&definition).unwrap();

    let key = Key::new(PartitionId(1), 2_000);
    let outcome =
        distribute_deployment(&distributor, key, &definition, DistributionOptions::default())
            .unwrap();
    let (_, command) = outcome.sends.into_iter().next().unwrap();

    // First delivery applies; the duplicate only re-acknowledges.
    receive_deployment(&receiver.dist_state, &mut receiver.processor, &command).unwrap();
    assert_eq!(
        receiver.processor.workflows().latest_version("order").unwrap(),
        Some(1)
    );

    receive_deployment(&receiver.dist_state, &mut receiver.processor, &command).unwrap();
    assert_eq!(
        receiver.processor.workflows().latest_version("order").unwrap(),
        Some(1),
        "a redelivered deployment must not bump the version"
    );

    // The origin takes the first acknowledgement and finishes; the
    // duplicate acknowledgement is rejected and retires nothing twice.
    let outcome = distributor.acknowledge(key, PartitionId(2)).unwrap();
    assert_eq!(
        outcome.outputs.last().unwrap().intent(),
        Some(DistributionIntent::Finished)
    );
    assert!(matches!(
        distributor.acknowledge(key, PartitionId(2)),
        Err(DistributionError::NotFound { .. })
    ));
}
