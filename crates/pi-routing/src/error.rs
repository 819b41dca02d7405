//! Error types for pi-routing

use thiserror::Error;

/// Routing error
#[derive(Debug, Error, Clone, PartialEq)]
pub enum RoutingError {
    /// Selection criteria filtered out every provider
    #[error("no providers match the selection criteria ({strategy})")]
    NoMatchingProviders {
        /// Strategy that was requested
        strategy: String,
    },

    /// Every provider in a failover chain failed or was skipped
    #[error("all providers failed after {attempts} attempt(s): {last_error}")]
    AllProvidersFailed {
        /// Number of providers actually invoked
        attempts: usize,
        /// Error from the last invoked provider
        last_error: String,
    },
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RoutingError>;
