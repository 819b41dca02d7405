//! Provider Router - cost, latency, quality and reliability weighted selection
//!
//! Candidates are filtered by the selection criteria (and by the attached
//! failover manager), scored by the requested strategy, and every decision
//! lands in a bounded history used for statistics.

use crate::error::{Result, RoutingError};
use crate::failover::FailoverManager;
use crate::monitor::ProviderMonitor;
use crate::types::{HealthScore, ProviderCapability, ProviderInfo, Recommendation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Default routing history capacity
const DEFAULT_MAX_HISTORY: usize = 1000;

/// How to rank candidate providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RoutingStrategy {
    /// Cheapest, penalized by unavailability
    CostOptimal,
    /// Fastest p95, penalized by unavailability
    LatencyOptimal,
    /// Most capable, weighted by reliability
    QualityOptimal,
    /// Most reliable
    #[default]
    Failover,
}

impl RoutingStrategy {
    /// Returns the string representation
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CostOptimal => "cost-optimal",
            Self::LatencyOptimal => "latency-optimal",
            Self::QualityOptimal => "quality-optimal",
            Self::Failover => "failover",
        }
    }

    fn higher_is_better(&self) -> bool {
        matches!(self, Self::QualityOptimal | Self::Failover)
    }
}

impl std::fmt::Display for RoutingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filters and strategy for a routing decision
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderSelectionCriteria {
    /// Ranking strategy
    #[serde(default)]
    pub strategy: RoutingStrategy,
    /// Drop providers below this availability
    #[serde(default)]
    pub minimum_availability: Option<f64>,
    /// Drop providers whose p95 exceeds this
    #[serde(default)]
    pub maximum_latency_ms: Option<u64>,
    /// Drop providers missing any of these
    #[serde(default)]
    pub required_capabilities: Vec<ProviderCapability>,
    /// Drop these provider ids
    #[serde(default)]
    pub exclude_providers: Vec<String>,
}

impl ProviderSelectionCriteria {
    /// Criteria with only a strategy
    #[must_use]
    pub fn new(strategy: RoutingStrategy) -> Self {
        Self {
            strategy,
            ..Self::default()
        }
    }

    /// Require a minimum availability
    #[must_use]
    pub fn with_minimum_availability(mut self, availability: f64) -> Self {
        self.minimum_availability = Some(availability);
        self
    }

    /// Require a maximum p95 latency
    #[must_use]
    pub fn with_maximum_latency(mut self, latency_ms: u64) -> Self {
        self.maximum_latency_ms = Some(latency_ms);
        self
    }

    /// Require a capability
    #[must_use]
    pub fn requiring(mut self, capability: ProviderCapability) -> Self {
        self.required_capabilities.push(capability);
        self
    }

    /// Exclude a provider
    #[must_use]
    pub fn excluding(mut self, provider: impl Into<String>) -> Self {
        self.exclude_providers.push(provider.into());
        self
    }
}

/// Inputs that produced a decision
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DecisionMetrics {
    /// Combined per-1K cost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost: Option<f64>,
    /// p95 latency
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    /// Availability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub availability: Option<f64>,
    /// Capability points
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
}

/// A recorded routing decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    /// Chosen provider id
    pub provider: String,
    /// Chosen provider name
    pub provider_name: String,
    /// Why it was chosen
    pub reason: String,
    /// Strategy score
    pub score: f64,
    /// Inputs behind the score
    pub metrics: DecisionMetrics,
    /// When the decision was made
    pub timestamp: DateTime<Utc>,
}

/// Ordered providers to try
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverChain {
    /// Best candidate
    pub primary: String,
    /// Middle candidates, best first
    pub backups: Vec<String>,
    /// Worst candidate, tried last
    pub fallback: Option<String>,
}

impl FailoverChain {
    /// Providers in attempt order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.primary.as_str())
            .chain(self.backups.iter().map(String::as_str))
            .chain(self.fallback.as_deref())
    }

    /// Number of providers in the chain
    #[must_use]
    pub fn len(&self) -> usize {
        1 + self.backups.len() + usize::from(self.fallback.is_some())
    }

    /// Always false: a chain has a primary
    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Routing statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoutingStatistics {
    /// Decisions in history
    pub total_decisions: usize,
    /// Decisions per provider
    pub decisions_by_provider: HashMap<String, usize>,
    /// Mean decision score
    pub average_score: f64,
    /// Provider chosen most often
    pub most_selected: Option<String>,
}

struct Candidate {
    info: ProviderInfo,
    health: HealthScore,
    score: f64,
}

/// Weighted provider selection
pub struct ProviderRouter {
    providers: RwLock<Vec<ProviderInfo>>,
    monitor: Arc<ProviderMonitor>,
    failover: Option<Arc<FailoverManager>>,
    history: Mutex<VecDeque<RouteDecision>>,
    max_history: usize,
}

impl ProviderRouter {
    /// Create a router reading health from `monitor`
    #[must_use]
    pub fn new(monitor: Arc<ProviderMonitor>) -> Self {
        Self {
            providers: RwLock::new(Vec::new()),
            monitor,
            failover: None,
            history: Mutex::new(VecDeque::new()),
            max_history: DEFAULT_MAX_HISTORY,
        }
    }

    /// Consult and feed a failover manager
    #[must_use]
    pub fn with_failover(mut self, failover: Arc<FailoverManager>) -> Self {
        self.failover = Some(failover);
        self
    }

    /// Set history capacity
    #[must_use]
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }

    /// Register or replace a provider
    pub fn register_provider(&self, info: ProviderInfo) {
        if let Some(failover) = &self.failover {
            failover.register_provider(&info.id);
        }
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        match providers.iter_mut().find(|p| p.id == info.id) {
            Some(slot) => *slot = info,
            None => {
                info!(provider = %info.id, "Registered routing provider");
                providers.push(info);
            }
        }
    }

    /// Remove a provider
    pub fn unregister_provider(&self, id: &str) -> bool {
        let mut providers = self.providers.write().unwrap_or_else(|e| e.into_inner());
        let before = providers.len();
        providers.retain(|p| p.id != id);
        providers.len() != before
    }

    /// Registered providers in registration order
    pub fn providers(&self) -> Vec<ProviderInfo> {
        self.providers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn health_of(&self, id: &str) -> HealthScore {
        self.monitor
            .health_score(id)
            .unwrap_or_else(HealthScore::unknown)
    }

    /// Filtered candidates ranked best first, ties in registration order
    fn ranked(&self, criteria: &ProviderSelectionCriteria) -> Result<Vec<Candidate>> {
        let mut candidates: Vec<Candidate> = self
            .providers()
            .into_iter()
            .filter(|p| !criteria.exclude_providers.contains(&p.id))
            .filter(|p| {
                criteria
                    .required_capabilities
                    .iter()
                    .all(|c| p.has_capability(*c))
            })
            .filter(|p| {
                self.failover
                    .as_ref()
                    .map_or(true, |f| f.is_provider_available(&p.id))
            })
            .map(|info| {
                let health = self.health_of(&info.id);
                let score = score(criteria.strategy, &info, &health);
                Candidate {
                    info,
                    health,
                    score,
                }
            })
            .filter(|c| {
                criteria
                    .minimum_availability
                    .map_or(true, |min| c.health.availability >= min)
            })
            .filter(|c| {
                criteria
                    .maximum_latency_ms
                    .map_or(true, |max| c.health.latency_ms <= max)
            })
            .collect();

        if candidates.is_empty() {
            warn!(strategy = %criteria.strategy, "No providers match routing criteria");
            return Err(RoutingError::NoMatchingProviders {
                strategy: criteria.strategy.to_string(),
            });
        }

        let higher_is_better = criteria.strategy.higher_is_better();
        candidates.sort_by(|a, b| {
            let ord = a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal);
            if higher_is_better {
                ord.reverse()
            } else {
                ord
            }
        });
        Ok(candidates)
    }

    /// Pick the best provider for the criteria and record the decision
    pub fn select_provider(&self, criteria: &ProviderSelectionCriteria) -> Result<RouteDecision> {
        let best = self
            .ranked(criteria)?
            .into_iter()
            .next()
            .ok_or_else(|| RoutingError::NoMatchingProviders {
                strategy: criteria.strategy.to_string(),
            })?;

        let decision = decision_for(
            &best,
            format!("{} score {:.4}", criteria.strategy, best.score),
        );
        debug!(provider = %decision.provider, strategy = %criteria.strategy, score = decision.score, "Selected provider");
        self.record(decision.clone());
        Ok(decision)
    }

    /// Rank candidates into primary, backups and a last-resort fallback
    pub fn build_failover_chain(
        &self,
        criteria: &ProviderSelectionCriteria,
    ) -> Result<FailoverChain> {
        let mut ids: Vec<String> = self
            .ranked(criteria)?
            .into_iter()
            .map(|c| c.info.id)
            .collect();
        let primary = ids.remove(0);
        let fallback = ids.pop();
        Ok(FailoverChain {
            primary,
            backups: ids,
            fallback,
        })
    }

    /// Try each provider in the chain until `f` succeeds
    ///
    /// Providers currently scored POOR or unavailable in the failover manager
    /// are skipped. Outcomes are reported to the failover manager.
    pub async fn execute_with_failover<T, E, F, Fut>(
        &self,
        chain: &FailoverChain,
        mut f: F,
    ) -> Result<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempts = 0;
        let mut last_error: Option<String> = None;

        for (position, provider) in chain.iter().enumerate() {
            let health = self.health_of(provider);
            if health.recommendation == Recommendation::Poor {
                debug!(provider = %provider, "Skipping POOR provider");
                continue;
            }
            if let Some(failover) = &self.failover {
                if !failover.is_provider_available(provider) {
                    debug!(provider = %provider, "Skipping blacklisted provider");
                    continue;
                }
            }

            attempts += 1;
            match f(provider.to_string()).await {
                Ok(value) => {
                    if let Some(failover) = &self.failover {
                        failover.record_success(provider);
                    }
                    let info = self
                        .providers()
                        .into_iter()
                        .find(|p| p.id == provider)
                        .unwrap_or_else(|| ProviderInfo::new(provider, provider));
                    let candidate = Candidate {
                        score: health.reliability(),
                        info,
                        health,
                    };
                    self.record(decision_for(
                        &candidate,
                        format!("failover chain position {}", position),
                    ));
                    return Ok(value);
                }
                Err(e) => {
                    warn!(provider = %provider, error = %e, "Provider attempt failed");
                    if let Some(failover) = &self.failover {
                        failover.record_failure(provider, &e.to_string());
                    }
                    last_error = Some(e.to_string());
                }
            }
        }

        Err(RoutingError::AllProvidersFailed {
            attempts,
            last_error: last_error.unwrap_or_else(|| "no provider was attempted".to_string()),
        })
    }

    fn record(&self, decision: RouteDecision) {
        let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        history.push_back(decision);
        while history.len() > self.max_history {
            history.pop_front();
        }
    }

    /// Last `n` decisions, oldest first
    pub fn history(&self, n: usize) -> Vec<RouteDecision> {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        let skip = history.len().saturating_sub(n);
        history.iter().skip(skip).cloned().collect()
    }

    /// Aggregate decision statistics
    pub fn statistics(&self) -> RoutingStatistics {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        if history.is_empty() {
            return RoutingStatistics::default();
        }

        let mut decisions_by_provider: HashMap<String, usize> = HashMap::new();
        for decision in history.iter() {
            *decisions_by_provider
                .entry(decision.provider.clone())
                .or_insert(0) += 1;
        }
        let most_selected = decisions_by_provider
            .iter()
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(id, _)| id.clone());
        let average_score =
            history.iter().map(|d| d.score).sum::<f64>() / history.len() as f64;

        RoutingStatistics {
            total_decisions: history.len(),
            decisions_by_provider,
            average_score,
            most_selected,
        }
    }
}

/// Strategy score for one provider
fn score(strategy: RoutingStrategy, info: &ProviderInfo, health: &HealthScore) -> f64 {
    let unavailability = 1.0 - health.availability;
    match strategy {
        RoutingStrategy::CostOptimal => {
            (info.cost_input + info.cost_output) * (1.0 + unavailability * 0.1)
        }
        RoutingStrategy::LatencyOptimal => health.latency_ms as f64 + unavailability * 1000.0,
        RoutingStrategy::QualityOptimal => {
            f64::from(info.capability_points())
                * health.availability
                * (1.0 - health.error_rate * 0.5)
        }
        RoutingStrategy::Failover => health.reliability(),
    }
}

fn decision_for(candidate: &Candidate, reason: String) -> RouteDecision {
    RouteDecision {
        provider: candidate.info.id.clone(),
        provider_name: candidate.info.name.clone(),
        reason,
        score: candidate.score,
        metrics: DecisionMetrics {
            cost: Some(candidate.info.cost_input + candidate.info.cost_output),
            latency_ms: Some(candidate.health.latency_ms),
            availability: Some(candidate.health.availability),
            quality: Some(f64::from(candidate.info.capability_points())),
        },
        timestamp: Utc::now(),
    }
}
