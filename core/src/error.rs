//! Structured error types for Entente
//!
//! Splits session-level validation faults (which abort the request before
//! any negotiation round starts) from per-call soft faults (which are
//! absorbed inside a round and only counted in the error stats).

use std::time::Duration;
use thiserror::Error;

/// Primary error type for Entente operations
#[derive(Error, Debug)]
pub enum EntenteError {
    // =========================================================================
    // Validation Faults (session setup, surfaced to the caller)
    // =========================================================================
    /// Power name did not normalize to one of the seven canonical powers
    #[error("unknown power: {name:?}")]
    UnknownPower { name: String },

    /// Game snapshot is structurally invalid
    #[error("malformed snapshot: {reason}")]
    MalformedSnapshot { reason: String },

    /// Agent-state payload for a power could not be mapped
    #[error("invalid agent state for {power}: {reason}")]
    InvalidAgentState { power: String, reason: String },

    /// Prompt template failed to load or render
    #[error("template error: {0}")]
    Template(String),

    // =========================================================================
    // Client Faults (absorbed per call by the orchestrator)
    // =========================================================================
    /// Provider returned a non-success status
    #[error("provider error: {status} - {message}")]
    ProviderError { status: u16, message: String },

    /// Provider reply carried no usable completion
    #[error("empty completion from model {model}")]
    EmptyCompletion { model: String },

    /// Client call exceeded its deadline
    #[error("client call timed out after {duration:?}")]
    Timeout { duration: Duration },

    /// Network-level failure reaching the provider
    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    /// Model reply contained no parseable negotiation payload
    #[error("unparseable model reply ({length} bytes)")]
    UnparseableReply { length: usize },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Invalid configuration
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// Internal system error
    #[error("internal error: {message}")]
    Internal { message: String },

    // =========================================================================
    // External Error Wrappers
    // =========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(String),
}

impl EntenteError {
    /// Whether this fault aborts the whole session.
    ///
    /// Setup-time faults abort; anything arising from a single model call
    /// is absorbed by the round orchestrator and only counted.
    pub fn is_session_fault(&self) -> bool {
        match self {
            Self::UnknownPower { .. }
            | Self::MalformedSnapshot { .. }
            | Self::InvalidAgentState { .. }
            | Self::Template(_)
            | Self::InvalidConfig { .. }
            | Self::Internal { .. }
            | Self::Io(_)
            | Self::Json(_) => true,

            Self::ProviderError { .. }
            | Self::EmptyCompletion { .. }
            | Self::Timeout { .. }
            | Self::ConnectionFailed { .. }
            | Self::UnparseableReply { .. } => false,
        }
    }
}

impl From<serde_json::Error> for EntenteError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

impl From<tera::Error> for EntenteError {
    fn from(err: tera::Error) -> Self {
        Self::Template(err.to_string())
    }
}

/// Result type alias using EntenteError
pub type Result<T> = std::result::Result<T, EntenteError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_fault_classification() {
        assert!(EntenteError::UnknownPower {
            name: "ATLANTIS".to_string()
        }
        .is_session_fault());

        assert!(EntenteError::MalformedSnapshot {
            reason: "phase without name".to_string()
        }
        .is_session_fault());

        assert!(!EntenteError::Timeout {
            duration: Duration::from_secs(30)
        }
        .is_session_fault());

        assert!(!EntenteError::UnparseableReply { length: 512 }.is_session_fault());
    }
}
