use thiserror::Error;

use crate::key::Key;

/// Core error type for the Weir engine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// State store failure
    #[error("state store error: {0}")]
    StateStore(String),

    /// Serialization failure
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The whole deployment was rejected during transformation
    #[error("deployment rejected ({rejection_type}): {reason}")]
    DeploymentRejected {
        /// Stable rejection code
        rejection_type: String,
        /// Human-readable reason
        reason: String,
    },

    /// No deployed version of the process exists
    #[error("process not found: {0}")]
    ProcessNotFound(String),

    /// The record references an element missing from the compiled graph
    #[error("element '{element}' not found in process '{process}'")]
    ElementNotFound {
        /// Element id
        element: String,
        /// Process id
        process: String,
    },

    /// No element instance exists under the given key
    #[error("element instance not found: {0}")]
    InstanceNotFound(Key),

    /// No incident exists under the given key
    #[error("incident not found: {0}")]
    IncidentNotFound(Key),

    /// The requested operation does not apply to the instance's state
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<weir_model::TransformError> for EngineError {
    fn from(err: weir_model::TransformError) -> Self {
        EngineError::DeploymentRejected {
            rejection_type: err.rejection_type().to_string(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transform_error_becomes_rejection() {
        let err: EngineError = weir_model::TransformError::DuplicateElementId("a".to_string()).into();
        match err {
            EngineError::DeploymentRejected {
                rejection_type,
                reason,
            } => {
                assert_eq!(rejection_type, "DUPLICATE_ELEMENT");
                assert!(reason.contains('a'));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }
}
