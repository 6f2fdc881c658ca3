//! Pending event triggers.

use serde::{Deserialize, Serialize};

use crate::key::Key;
use crate::types::Variables;

/// A pending event occurrence correlated to a scope key.
///
/// Created when a subscription fires, peeked (not deleted) while a delivery
/// is in flight, and consumed exactly once when a winning path is chosen.
/// Deleting the trigger is what prevents duplicate activation on replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTrigger {
    /// Orders triggers within a scope and identifies this one for deletion
    pub trigger_key: Key,

    /// Scope the occurrence is correlated to
    pub scope_key: Key,

    /// Element whose subscription fired
    pub element_id: String,

    /// Variables carried by the occurrence
    pub variables: Variables,
}
