//! Error types for pi-core
//!
//! Agent and middleware failures never surface as errors; they are part of
//! the returned turn. These cover configuration problems only.

use pi_agents::AgentConfigError;
use pi_routing::RoutingError;
use thiserror::Error;

/// Core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid wrapper configuration
    #[error(transparent)]
    AgentConfig(#[from] AgentConfigError),

    /// Routing configuration or selection error
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// A blocked-prompt pattern failed to compile
    #[error("invalid pattern '{pattern}': {message}")]
    InvalidPattern {
        /// Offending pattern
        pattern: String,
        /// Compiler message
        message: String,
    },

    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    Configuration(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
