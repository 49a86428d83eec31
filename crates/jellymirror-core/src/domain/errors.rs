//! Domain error types
//!
//! Errors raised while parsing or validating domain values: identifiers,
//! task names, states and trigger types read back from storage.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Unknown task name
    #[error("Unknown task name: {0}")]
    UnknownTask(String),

    /// Unknown task state
    #[error("Unknown task state: {0}")]
    UnknownState(String),

    /// Unknown trigger type
    #[error("Unknown trigger type: {0}")]
    UnknownTrigger(String),

    /// Invalid state transition attempt
    #[error("Invalid state transition from {from} to {to}")]
    InvalidState {
        /// The current state
        from: String,
        /// The attempted target state
        to: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}
