//! Event subscriptions.
//!
//! A catch subscription ties `(element id, scope key)` to the message or
//! timer it waits on. Message start subscriptions are version-scoped: at any
//! time exactly one process version may own the subscription for a message
//! name, and deployments swap owners atomically.

use serde::{Deserialize, Serialize};

use crate::key::Key;

/// An open wait of one catch element within a running scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatchSubscription {
    /// Scope key owning delivery of the occurrence
    pub scope_key: Key,

    /// Waiting element id
    pub element_id: String,

    /// Process id of the owning workflow
    pub process_id: String,

    /// Deployed version of the owning workflow
    pub version: u32,

    /// Message name, for message waits; `None` for timer waits
    pub message: Option<String>,
}

/// The message subscription owned by a process version's start event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageStartSubscription {
    /// Subscribed message name
    pub message: String,

    /// Process id
    pub process_id: String,

    /// Version owning the subscription
    pub version: u32,

    /// Message start event id
    pub element_id: String,
}

/// A scheduled timer, either for a waiting catch element or for a timer
/// start event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerRecord {
    /// Identifies this timer for rescheduling and cancellation
    pub timer_key: Key,

    /// Due instant, epoch milliseconds
    pub due_ms: i64,

    /// Element the timer fires for
    pub element_id: String,

    /// Process id of the owning workflow
    pub process_id: String,

    /// Deployed version of the owning workflow
    pub version: u32,

    /// Scope the firing is correlated to; `None` for timer start events
    pub scope_key: Option<Key>,

    /// Remaining firings; `None` means unbounded
    pub repetitions: Option<u32>,

    /// Interval between firings, milliseconds
    pub interval_ms: i64,
}
