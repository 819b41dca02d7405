//! Pi Routing - provider health monitoring, failover and routing
//!
//! This crate provides:
//! - [`ProviderMonitor`]: rolling request metrics and health scores
//! - [`FailoverManager`]: health state machine with blacklisting
//! - [`ProviderRouter`]: strategy-weighted provider selection

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod error;
pub mod failover;
pub mod monitor;
pub mod router;
pub mod types;

pub use error::{Result, RoutingError};
pub use failover::{
    FailoverConfig, FailoverEvent, FailoverEventKind, FailoverManager, FailoverState,
    FailoverStatistics, ProviderStatus,
};
pub use monitor::{
    recommend, AlertHandler, LatencyPercentiles, MetricKind, MonitorConfig, MonitorThresholds,
    ProviderMetrics, ProviderMonitor, RequestSample,
};
pub use router::{
    DecisionMetrics, FailoverChain, ProviderRouter, ProviderSelectionCriteria, RouteDecision,
    RoutingStatistics, RoutingStrategy,
};
pub use types::{HealthScore, ProviderCapability, ProviderHealth, ProviderInfo, Recommendation};
