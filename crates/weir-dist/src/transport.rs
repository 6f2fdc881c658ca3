//! Inter-partition transport.
//!
//! Sends are fire-and-forget and may be dropped, duplicated, or reordered;
//! the distribution protocol tolerates all of it. The in-memory transport
//! used by tests can inject exactly those failures.

use std::sync::RwLock;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::trace;

use weir_core::PartitionId;

use crate::record::RemoteCommand;

/// Fire-and-forget command sender between partitions.
#[async_trait]
pub trait InterPartitionSender: Send + Sync {
    /// Queue a command for another partition. Delivery is at-least-once at
    /// the protocol level, not here; a send may vanish silently.
    async fn send(&self, to: PartitionId, command: RemoteCommand);
}

/// Provider of the current partition topology.
pub trait PartitionTopology: Send + Sync {
    /// The partition this node owns.
    fn own(&self) -> PartitionId;

    /// All partition ids in the cluster.
    fn partition_ids(&self) -> Vec<PartitionId>;

    /// Every partition except this node's own.
    fn other_partitions(&self) -> Vec<PartitionId> {
        self.partition_ids()
            .into_iter()
            .filter(|p| *p != self.own())
            .collect()
    }
}

/// Fixed topology known at startup.
#[derive(Debug, Clone)]
pub struct StaticTopology {
    own: PartitionId,
    all: Vec<PartitionId>,
}

impl StaticTopology {
    /// A cluster of `count` partitions with ids `0..count`, seen from
    /// partition `own`.
    pub fn new(own: PartitionId, count: u32) -> Self {
        Self {
            own,
            all: (0..count).map(PartitionId).collect(),
        }
    }

    /// A cluster with explicit partition ids.
    pub fn with_partitions(own: PartitionId, all: Vec<PartitionId>) -> Self {
        Self { own, all }
    }
}

impl PartitionTopology for StaticTopology {
    fn own(&self) -> PartitionId {
        self.own
    }

    fn partition_ids(&self) -> Vec<PartitionId> {
        self.all.clone()
    }
}

type DropFilter = Box<dyn Fn(PartitionId, &RemoteCommand) -> bool + Send + Sync>;

/// In-memory transport delivering into per-partition inboxes.
#[derive(Default)]
pub struct MemoryTransport {
    inboxes: DashMap<PartitionId, mpsc::UnboundedSender<RemoteCommand>>,
    drop_filter: RwLock<Option<DropFilter>>,
}

impl MemoryTransport {
    /// An empty transport with no registered inboxes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a partition's inbox and return its receiving end.
    pub fn register(&self, partition: PartitionId) -> mpsc::UnboundedReceiver<RemoteCommand> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.insert(partition, tx);
        rx
    }

    /// Install a loss filter: commands for which it returns `true` are
    /// silently dropped.
    pub fn set_drop_filter<F>(&self, filter: F)
    where
        F: Fn(PartitionId, &RemoteCommand) -> bool + Send + Sync + 'static,
    {
        *self
            .drop_filter
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Box::new(filter));
    }

    /// Remove the loss filter.
    pub fn clear_drop_filter(&self) {
        *self
            .drop_filter
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}

#[async_trait]
impl InterPartitionSender for MemoryTransport {
    async fn send(&self, to: PartitionId, command: RemoteCommand) {
        {
            let filter = self
                .drop_filter
                .read()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(filter) = filter.as_ref() {
                if filter(to, &command) {
                    trace!(%to, key = %command.key, "transport dropped a command");
                    return;
                }
            }
        }

        if let Some(inbox) = self.inboxes.get(&to) {
            // A closed inbox is a dead partition; fire-and-forget means the
            // send just vanishes.
            let _ = inbox.send(command);
        }
    }
}
