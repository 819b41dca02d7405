//! Error types for pi-agents
//!
//! Execution failures never surface here; they are carried inside
//! [`crate::AgentResult`]. These errors cover invalid wrapper configuration.

use thiserror::Error;

/// Wrapper configuration error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AgentConfigError {
    /// A required field was empty
    #[error("agent '{agent}': field '{field}' must not be empty")]
    EmptyField {
        /// Agent id (may be empty itself)
        agent: String,
        /// Offending field name
        field: &'static str,
    },

    /// Timeout of zero seconds
    #[error("agent '{0}': timeout must be greater than zero")]
    ZeroTimeout(String),

    /// Malformed endpoint URL
    #[error("agent '{agent}': invalid base url '{url}'")]
    InvalidBaseUrl {
        /// Agent id
        agent: String,
        /// Offending URL
        url: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AgentConfigError>;
