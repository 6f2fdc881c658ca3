use thiserror::Error;

/// Reasons a deployment is rejected at transformation time.
///
/// A single failed element rejects the whole deployment; no part of the
/// graph is applied.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    /// A catch event or receive task references a message that is not
    /// declared in the deployment
    #[error("unknown message '{message}' referenced by element '{element}'")]
    UnknownMessage {
        /// Referencing element id
        element: String,
        /// Unresolved message name
        message: String,
    },

    /// A boundary event is attached to an activity that does not exist
    #[error("boundary event '{element}' is attached to unknown activity '{attached_to}'")]
    UnknownAttachment {
        /// Boundary event id
        element: String,
        /// Missing host activity id
        attached_to: String,
    },

    /// A timer expression could not be parsed
    #[error("invalid timer expression '{expression}' on element '{element}': {reason}")]
    InvalidTimer {
        /// Element carrying the timer definition
        element: String,
        /// Offending expression
        expression: String,
        /// Parse failure detail
        reason: String,
    },

    /// Two elements share the same id
    #[error("duplicate element id '{0}'")]
    DuplicateElementId(String),

    /// A sequence flow references an element that does not exist
    #[error("sequence flow '{flow}' references unknown element '{element}'")]
    DanglingSequenceFlow {
        /// Sequence flow id
        flow: String,
        /// Missing endpoint id
        element: String,
    },

    /// An event-based gateway target is not a catch event
    #[error("event-based gateway '{gateway}' targets '{target}', which is not a catch event")]
    InvalidGatewayTarget {
        /// Gateway id
        gateway: String,
        /// Offending target id
        target: String,
    },

    /// An element's flow scope references an element that is not a subprocess
    #[error("element '{element}' is scoped to '{scope}', which is not a subprocess")]
    InvalidFlowScope {
        /// Scoped element id
        element: String,
        /// Offending scope id
        scope: String,
    },
}

impl TransformError {
    /// Stable rejection code, reported alongside the reason when a
    /// deployment command is rejected.
    pub fn rejection_type(&self) -> &'static str {
        match self {
            TransformError::UnknownMessage { .. } => "INVALID_MESSAGE_REF",
            TransformError::UnknownAttachment { .. } => "INVALID_ATTACHMENT",
            TransformError::InvalidTimer { .. } => "INVALID_TIMER",
            TransformError::DuplicateElementId(_) => "DUPLICATE_ELEMENT",
            TransformError::DanglingSequenceFlow { .. } => "INVALID_SEQUENCE_FLOW",
            TransformError::InvalidGatewayTarget { .. } => "INVALID_GATEWAY_TARGET",
            TransformError::InvalidFlowScope { .. } => "INVALID_FLOW_SCOPE",
        }
    }
}
