//! Shared provider types
//!
//! [`HealthScore`] is written by the monitor and read by the failover manager
//! and the router; [`ProviderInfo`] is the router's static view of a backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Routing recommendation derived from recent metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Recommendation {
    /// Meets every target
    Optimal,
    /// Usable, but misses a soft target
    Acceptable,
    /// Misses a hard target; avoid
    Poor,
    /// Not enough data
    Unknown,
}

impl Recommendation {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Optimal => "OPTIMAL",
            Self::Acceptable => "ACCEPTABLE",
            Self::Poor => "POOR",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for Recommendation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse health status reported by the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderHealth {
    /// Serving normally
    Healthy,
    /// Serving, but with a poor recommendation
    Degraded,
    /// Availability below the offline threshold
    Offline,
}

impl std::fmt::Display for ProviderHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Live health summary of one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthScore {
    /// Fraction of successful requests in the window, in `[0, 1]`
    pub availability: f64,
    /// p95 latency in milliseconds
    pub latency_ms: u64,
    /// Fraction of failed requests in the window, in `[0, 1]`
    pub error_rate: f64,
    /// Cost per request relative to the cheapest monitored provider
    pub cost_ratio: f64,
    /// Derived recommendation
    pub recommendation: Recommendation,
    /// When this score was computed
    pub last_updated: DateTime<Utc>,
}

impl HealthScore {
    /// Optimistic score for a provider with no samples yet
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            availability: 1.0,
            latency_ms: 0,
            error_rate: 0.0,
            cost_ratio: 1.0,
            recommendation: Recommendation::Unknown,
            last_updated: Utc::now(),
        }
    }

    /// `availability * (1 - error_rate)`
    #[must_use]
    pub fn reliability(&self) -> f64 {
        self.availability * (1.0 - self.error_rate)
    }
}

/// Feature a provider offers, weighted for quality routing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderCapability {
    /// Image input
    Vision,
    /// Function / tool calling
    Tools,
    /// Model Context Protocol servers
    Mcp,
    /// Extended reasoning
    Thinking,
    /// Incremental output
    Streaming,
}

impl ProviderCapability {
    /// Quality weight of this capability
    #[must_use]
    pub fn points(&self) -> u32 {
        match self {
            Self::Vision | Self::Tools => 2,
            Self::Mcp | Self::Thinking => 3,
            Self::Streaming => 1,
        }
    }
}

/// Static description of a routable provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderInfo {
    /// Provider id (shared with the monitor and failover manager)
    pub id: String,
    /// Display name
    pub name: String,
    /// Cost per 1K input tokens (USD)
    #[serde(default)]
    pub cost_input: f64,
    /// Cost per 1K output tokens (USD)
    #[serde(default)]
    pub cost_output: f64,
    /// Offered capabilities
    #[serde(default)]
    pub capabilities: Vec<ProviderCapability>,
}

impl ProviderInfo {
    /// Create a provider with zero cost and no capabilities
    #[must_use]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            cost_input: 0.0,
            cost_output: 0.0,
            capabilities: Vec::new(),
        }
    }

    /// Set per-1K token pricing
    #[must_use]
    pub fn with_cost(mut self, input: f64, output: f64) -> Self {
        self.cost_input = input;
        self.cost_output = output;
        self
    }

    /// Set capabilities
    #[must_use]
    pub fn with_capabilities(mut self, capabilities: impl IntoIterator<Item = ProviderCapability>) -> Self {
        self.capabilities = capabilities.into_iter().collect();
        self
    }

    /// Whether the provider offers a capability
    #[must_use]
    pub fn has_capability(&self, capability: ProviderCapability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Sum of capability weights
    #[must_use]
    pub fn capability_points(&self) -> u32 {
        self.capabilities.iter().map(ProviderCapability::points).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_points() {
        let info = ProviderInfo::new("p", "P").with_capabilities([
            ProviderCapability::Vision,
            ProviderCapability::Mcp,
            ProviderCapability::Streaming,
        ]);
        assert_eq!(info.capability_points(), 6);
        assert!(info.has_capability(ProviderCapability::Mcp));
        assert!(!info.has_capability(ProviderCapability::Tools));
    }

    #[test]
    fn test_recommendation_serde() {
        let json = serde_json::to_string(&Recommendation::Acceptable).unwrap();
        assert_eq!(json, "\"ACCEPTABLE\"");
    }

    #[test]
    fn test_unknown_score_is_optimistic() {
        let score = HealthScore::unknown();
        assert_eq!(score.recommendation, Recommendation::Unknown);
        assert_eq!(score.reliability(), 1.0);
    }
}
