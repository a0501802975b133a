//! Error types for the liquid-handling gateway.

use thiserror::Error;

/// Main error type for gateway operations.
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// The request or its execution context is malformed or incomplete.
    /// Raised before any robot command is emitted.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// No unconsumed tip is left in the inventory.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The controller could not be reached within the retry budget.
    #[error("Transport error after {attempts} attempts: {message}")]
    Transport { attempts: u32, message: String },

    /// The controller answered with a body of unexpected shape.
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The orchestrator forced the owning instance to fail.
    #[error("Instance {instance_id} was cancelled externally")]
    Cancelled { instance_id: String },

    /// A source bottle's batch did not complete; later bottles were skipped.
    #[error("Batch for source bottle {bottle} failed: {source}")]
    BatchFailed {
        bottle: u8,
        #[source]
        source: Box<GatewayError>,
    },

    /// Persisted ledger state could not be read or written.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Internal error (should not happen).
    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Shorthand for a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation(message.into())
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            GatewayError::Transport { .. } | GatewayError::Protocol(_)
        )
    }

    /// The source bottle a multi-batch plan stopped at, if any.
    pub fn failed_bottle(&self) -> Option<u8> {
        match self {
            GatewayError::BatchFailed { bottle, .. } => Some(*bottle),
            _ => None,
        }
    }
}

/// Convenience Result type for gateway operations.
pub type Result<T> = std::result::Result<T, GatewayError>;

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_failed_names_bottle() {
        let err = GatewayError::BatchFailed {
            bottle: 1,
            source: Box::new(GatewayError::Cancelled {
                instance_id: "42".to_string(),
            }),
        };
        assert_eq!(err.failed_bottle(), Some(1));
        assert!(err.to_string().contains("source bottle 1"));
    }

    #[test]
    fn test_transient_kinds() {
        assert!(GatewayError::Protocol("bad body".into()).is_transient());
        assert!(!GatewayError::validation("missing containers").is_transient());
    }
}
