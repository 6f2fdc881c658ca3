//! Follow-up records.
//!
//! Handlers never apply follow-up effects in place; they append records to a
//! batch which the processor commits and re-reads in order. The drained
//! batch is also the surface consumed by downstream collaborators.

use serde::{Deserialize, Serialize};

use weir_model::ElementIntent;

use crate::key::Key;
use crate::types::Variables;

/// One element instance record on the partition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecord {
    /// Element instance key
    pub key: Key,

    /// Lifecycle or event intent
    pub intent: ElementIntent,

    /// Record payload
    pub value: ElementRecordValue,
}

/// Payload shared by all element instance records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementRecordValue {
    /// Process id of the owning workflow
    pub process_id: String,

    /// Deployed version of the owning workflow
    pub version: u32,

    /// Element id within the workflow
    pub element_id: String,

    /// Key of the enclosing flow scope instance; `None` for the process root
    pub flow_scope: Option<Key>,

    /// Variables carried by this record (trigger payloads, creation
    /// variables); empty for pure lifecycle transitions
    #[serde(default)]
    pub variables: Variables,
}

/// Ordered queue of follow-up records produced while handling one record.
///
/// Everything staged here commits together with the state mutations of the
/// same handling step.
#[derive(Debug, Default)]
pub struct RecordBatch {
    records: Vec<ElementRecord>,
}

impl RecordBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a follow-up record.
    pub fn push(&mut self, record: ElementRecord) {
        self.records.push(record);
    }

    /// Number of staged records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing is staged.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Drain all staged records in append order.
    pub fn drain(&mut self) -> Vec<ElementRecord> {
        std::mem::take(&mut self.records)
    }
}
