//! Runtime element instances.

use serde::{Deserialize, Serialize};

use weir_model::ElementIntent;

use crate::key::Key;

/// Runtime record of one element occurrence within a process instance.
///
/// Created on first activation, mutated by every subsequent intent, removed
/// when terminated or when the owning process instance is archived. The
/// `state` field always equals the last intent appended for this key, which
/// is what makes record handling idempotent under replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementInstance {
    /// Instance key
    pub key: Key,

    /// Process id of the owning workflow
    pub process_id: String,

    /// Deployed version of the owning workflow
    pub version: u32,

    /// Element id within the workflow
    pub element_id: String,

    /// Last appended intent for this instance
    pub state: ElementIntent,

    /// Key of the enclosing flow scope instance; `None` for the process root
    pub flow_scope: Option<Key>,

    /// Number of live tokens owned by this instance when it acts as a scope
    pub active_tokens: u32,
}

impl ElementInstance {
    /// Whether records addressed to children of this instance may still be
    /// handled.
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Whether the instance reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
