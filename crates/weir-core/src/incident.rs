//! Incidents.
//!
//! An incident records a processing error that blocks one token until an
//! operator resolves it. The blocked transition is kept on the incident so
//! resolution can re-enqueue exactly the record that failed.

use serde::{Deserialize, Serialize};

use weir_model::ElementIntent;

use crate::key::Key;

/// Classified incident cause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncidentType {
    /// An input or output variable mapping referenced a missing variable
    IoMappingError,
}

/// A recorded processing error blocking one element instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Incident {
    /// Incident key
    pub key: Key,

    /// Blocked element instance
    pub element_instance_key: Key,

    /// Classified cause
    pub error_type: IncidentType,

    /// Human-readable detail
    pub message: String,

    /// The intent whose handling failed; re-enqueued on resolution
    pub stalled_intent: ElementIntent,
}
