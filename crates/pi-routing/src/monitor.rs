//! Provider Monitor - rolling request metrics and health scores
//!
//! Keeps a bounded sample log per provider, aggregates the samples inside a
//! time window into [`ProviderMetrics`] snapshots and derives each provider's
//! [`HealthScore`]. Alert handlers are notified after the state lock is
//! released.

use crate::types::{HealthScore, ProviderHealth, Recommendation};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

/// Alert thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorThresholds {
    /// p95 latency above which `on_high_latency` fires
    #[serde(default = "default_high_latency_ms")]
    pub high_latency_ms: u64,
    /// Error rate above which `on_high_error_rate` fires
    #[serde(default = "default_high_error_rate")]
    pub high_error_rate: f64,
    /// Availability below which a provider is offline
    #[serde(default = "default_offline_availability")]
    pub offline_availability: f64,
}

fn default_high_latency_ms() -> u64 {
    1000
}

fn default_high_error_rate() -> f64 {
    0.05
}

fn default_offline_availability() -> f64 {
    0.5
}

impl Default for MonitorThresholds {
    fn default() -> Self {
        Self {
            high_latency_ms: default_high_latency_ms(),
            high_error_rate: default_high_error_rate(),
            offline_availability: default_offline_availability(),
        }
    }
}

/// Monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Aggregation window in seconds
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
    /// Samples kept per provider
    #[serde(default = "default_max_samples")]
    pub max_samples: usize,
    /// Snapshots kept per provider
    #[serde(default = "default_max_history")]
    pub max_history: usize,
    /// Alert thresholds
    #[serde(default)]
    pub thresholds: MonitorThresholds,
}

fn default_window_secs() -> u64 {
    3600
}

fn default_max_samples() -> usize {
    1000
}

fn default_max_history() -> usize {
    100
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            window_secs: default_window_secs(),
            max_samples: default_max_samples(),
            max_history: default_max_history(),
            thresholds: MonitorThresholds::default(),
        }
    }
}

impl MonitorConfig {
    /// Set the aggregation window
    #[must_use]
    pub fn with_window_secs(mut self, secs: u64) -> Self {
        self.window_secs = secs;
        self
    }

    /// Set the per-provider sample cap
    #[must_use]
    pub fn with_max_samples(mut self, max: usize) -> Self {
        self.max_samples = max;
        self
    }

    /// Set the per-provider snapshot cap
    #[must_use]
    pub fn with_max_history(mut self, max: usize) -> Self {
        self.max_history = max;
        self
    }
}

/// One observed request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestSample {
    /// When the request completed
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration in milliseconds
    pub duration_ms: u64,
    /// Whether it succeeded
    pub success: bool,
    /// Tokens consumed
    pub tokens: u64,
    /// Cost in USD
    pub cost: f64,
}

impl RequestSample {
    /// Sample stamped with the current time
    #[must_use]
    pub fn now(duration_ms: u64, success: bool, tokens: u64, cost: f64) -> Self {
        Self {
            timestamp: Utc::now(),
            duration_ms,
            success,
            tokens,
            cost,
        }
    }
}

/// Latency distribution over the window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatencyPercentiles {
    /// Median
    pub p50: u64,
    /// 95th percentile
    pub p95: u64,
    /// 99th percentile
    pub p99: u64,
    /// Mean
    pub avg: f64,
    /// Maximum
    pub max: u64,
}

impl LatencyPercentiles {
    /// Compute from unsorted durations
    #[must_use]
    pub fn from_durations(durations: &[u64]) -> Self {
        if durations.is_empty() {
            return Self::default();
        }
        let mut sorted = durations.to_vec();
        sorted.sort_unstable();
        let sum: u64 = sorted.iter().sum();
        Self {
            p50: percentile(&sorted, 0.50),
            p95: percentile(&sorted, 0.95),
            p99: percentile(&sorted, 0.99),
            avg: sum as f64 / sorted.len() as f64,
            max: sorted[sorted.len() - 1],
        }
    }
}

/// Value at `floor(len * p)`, clamped to the last index
fn percentile(sorted: &[u64], p: f64) -> u64 {
    let index = ((sorted.len() as f64 * p).floor() as usize).min(sorted.len() - 1);
    sorted[index]
}

/// Aggregated snapshot for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderMetrics {
    /// Provider id
    pub provider: String,
    /// When the snapshot was taken
    pub timestamp: DateTime<Utc>,
    /// Requests in the window
    pub request_count: usize,
    /// Successful requests
    pub success_count: usize,
    /// Failed requests
    pub error_count: usize,
    /// `success_count / request_count`
    pub success_rate: f64,
    /// `error_count / request_count`
    pub error_rate: f64,
    /// Availability estimate (the success rate)
    pub availability: f64,
    /// Latency distribution
    pub latency: LatencyPercentiles,
    /// Tokens consumed
    pub total_tokens: u64,
    /// Total cost in USD
    pub total_cost: f64,
    /// Average cost per request
    pub cost_per_request: f64,
    /// Coarse status
    pub health: ProviderHealth,
    /// Routing recommendation
    pub recommendation: Recommendation,
}

/// Metric selector for [`ProviderMonitor::trend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    /// p95 latency
    Latency,
    /// Error rate
    ErrorRate,
    /// Availability
    Availability,
    /// Cost per request
    Cost,
    /// Requests in window
    RequestCount,
}

impl MetricKind {
    fn value(&self, metrics: &ProviderMetrics) -> f64 {
        match self {
            Self::Latency => metrics.latency.p95 as f64,
            Self::ErrorRate => metrics.error_rate,
            Self::Availability => metrics.availability,
            Self::Cost => metrics.cost_per_request,
            Self::RequestCount => metrics.request_count as f64,
        }
    }
}

/// Receives monitor alerts
pub trait AlertHandler: Send + Sync {
    /// p95 latency exceeded the threshold
    fn on_high_latency(&self, _provider: &str, _metrics: &ProviderMetrics) {}

    /// Error rate exceeded the threshold
    fn on_high_error_rate(&self, _provider: &str, _metrics: &ProviderMetrics) {}

    /// Provider transitioned into offline
    fn on_unavailable(&self, _provider: &str, _metrics: &ProviderMetrics) {}

    /// Provider transitioned from offline back to healthy
    fn on_recovered(&self, _provider: &str, _metrics: &ProviderMetrics) {}
}

#[derive(Debug, Clone, Copy)]
enum Alert {
    HighLatency,
    HighErrorRate,
    Unavailable,
    Recovered,
}

/// Recommendation from availability, error rate and p95 latency
#[must_use]
pub fn recommend(availability: f64, error_rate: f64, p95_ms: u64) -> Recommendation {
    if availability < 0.95 || error_rate > 0.05 || p95_ms > 1000 {
        Recommendation::Poor
    } else if availability < 0.99 || error_rate > 0.01 || p95_ms > 500 {
        Recommendation::Acceptable
    } else {
        Recommendation::Optimal
    }
}

#[derive(Default)]
struct MonitorState {
    samples: HashMap<String, VecDeque<RequestSample>>,
    history: HashMap<String, VecDeque<ProviderMetrics>>,
    scores: HashMap<String, HealthScore>,
    status: HashMap<String, ProviderHealth>,
}

/// Rolling per-provider metrics
pub struct ProviderMonitor {
    config: MonitorConfig,
    state: RwLock<MonitorState>,
    handlers: RwLock<Vec<Arc<dyn AlertHandler>>>,
}

impl Default for ProviderMonitor {
    fn default() -> Self {
        Self::new(MonitorConfig::default())
    }
}

impl ProviderMonitor {
    /// Create a new monitor
    #[must_use]
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: RwLock::new(MonitorState::default()),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Register an alert handler
    pub fn add_alert_handler(&self, handler: Arc<dyn AlertHandler>) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(handler);
    }

    /// Record a request completed now
    pub fn record_request(
        &self,
        provider: &str,
        duration_ms: u64,
        success: bool,
        tokens: u64,
        cost: f64,
    ) -> ProviderMetrics {
        self.record_sample(
            provider,
            RequestSample::now(duration_ms, success, tokens, cost),
        )
    }

    /// Record a sample with an explicit timestamp and return the new snapshot
    pub fn record_sample(&self, provider: &str, sample: RequestSample) -> ProviderMetrics {
        let (metrics, alerts) = {
            let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());

            let samples = state.samples.entry(provider.to_string()).or_default();
            samples.push_back(sample);
            while samples.len() > self.config.max_samples {
                samples.pop_front();
            }

            let metrics = self.aggregate(provider, samples);

            let history = state.history.entry(provider.to_string()).or_default();
            history.push_back(metrics.clone());
            while history.len() > self.config.max_history {
                history.pop_front();
            }

            let previous = state
                .status
                .insert(provider.to_string(), metrics.health)
                .unwrap_or(ProviderHealth::Healthy);

            state.scores.insert(
                provider.to_string(),
                HealthScore {
                    availability: metrics.availability,
                    latency_ms: metrics.latency.p95,
                    error_rate: metrics.error_rate,
                    cost_ratio: 1.0,
                    recommendation: metrics.recommendation,
                    last_updated: metrics.timestamp,
                },
            );
            refresh_cost_ratios(&mut state);

            (metrics.clone(), self.pending_alerts(previous, &metrics))
        };

        debug!(
            provider = %provider,
            availability = metrics.availability,
            p95_ms = metrics.latency.p95,
            recommendation = %metrics.recommendation,
            "Recorded provider request"
        );

        if !alerts.is_empty() {
            self.fire(provider, &metrics, &alerts);
        }
        metrics
    }

    fn aggregate(&self, provider: &str, samples: &VecDeque<RequestSample>) -> ProviderMetrics {
        let now = Utc::now();
        let window_start = now - ChronoDuration::seconds(self.config.window_secs as i64);
        let window: Vec<&RequestSample> = samples
            .iter()
            .filter(|s| s.timestamp >= window_start)
            .collect();

        let request_count = window.len();
        let success_count = window.iter().filter(|s| s.success).count();
        let error_count = request_count - success_count;
        let (success_rate, error_rate) = if request_count == 0 {
            (1.0, 0.0)
        } else {
            (
                success_count as f64 / request_count as f64,
                error_count as f64 / request_count as f64,
            )
        };
        let availability = success_rate.clamp(0.0, 1.0);
        let error_rate = error_rate.clamp(0.0, 1.0);

        let durations: Vec<u64> = window.iter().map(|s| s.duration_ms).collect();
        let latency = LatencyPercentiles::from_durations(&durations);
        let total_tokens = window.iter().map(|s| s.tokens).sum();
        let total_cost: f64 = window.iter().map(|s| s.cost).sum();
        let cost_per_request = if request_count == 0 {
            0.0
        } else {
            total_cost / request_count as f64
        };

        let recommendation = if request_count == 0 {
            Recommendation::Unknown
        } else {
            recommend(availability, error_rate, latency.p95)
        };
        let health = if request_count > 0 && availability < self.config.thresholds.offline_availability
        {
            ProviderHealth::Offline
        } else if recommendation == Recommendation::Poor {
            ProviderHealth::Degraded
        } else {
            ProviderHealth::Healthy
        };

        ProviderMetrics {
            provider: provider.to_string(),
            timestamp: now,
            request_count,
            success_count,
            error_count,
            success_rate,
            error_rate,
            availability,
            latency,
            total_tokens,
            total_cost,
            cost_per_request,
            health,
            recommendation,
        }
    }

    fn pending_alerts(&self, previous: ProviderHealth, metrics: &ProviderMetrics) -> Vec<Alert> {
        let thresholds = &self.config.thresholds;
        let mut alerts = Vec::new();
        if metrics.request_count == 0 {
            return alerts;
        }
        if metrics.latency.p95 > thresholds.high_latency_ms {
            alerts.push(Alert::HighLatency);
        }
        if metrics.error_rate > thresholds.high_error_rate {
            alerts.push(Alert::HighErrorRate);
        }
        match (previous, metrics.health) {
            (prev, ProviderHealth::Offline) if prev != ProviderHealth::Offline => {
                alerts.push(Alert::Unavailable);
            }
            (ProviderHealth::Offline, ProviderHealth::Healthy) => alerts.push(Alert::Recovered),
            _ => {}
        }
        alerts
    }

    fn fire(&self, provider: &str, metrics: &ProviderMetrics, alerts: &[Alert]) {
        let handlers = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        for alert in alerts {
            match alert {
                Alert::HighLatency => {
                    warn!(provider = %provider, p95_ms = metrics.latency.p95, "High provider latency")
                }
                Alert::HighErrorRate => {
                    warn!(provider = %provider, error_rate = metrics.error_rate, "High provider error rate")
                }
                Alert::Unavailable => {
                    warn!(provider = %provider, availability = metrics.availability, "Provider unavailable")
                }
                Alert::Recovered => info!(provider = %provider, "Provider recovered"),
            }
            for handler in &handlers {
                match alert {
                    Alert::HighLatency => handler.on_high_latency(provider, metrics),
                    Alert::HighErrorRate => handler.on_high_error_rate(provider, metrics),
                    Alert::Unavailable => handler.on_unavailable(provider, metrics),
                    Alert::Recovered => handler.on_recovered(provider, metrics),
                }
            }
        }
    }

    /// Most recent snapshot
    pub fn latest_metrics(&self, provider: &str) -> Option<ProviderMetrics> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.history.get(provider).and_then(|h| h.back().cloned())
    }

    /// Last `n` snapshots, oldest first
    pub fn historical_metrics(&self, provider: &str, n: usize) -> Vec<ProviderMetrics> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .history
            .get(provider)
            .map(|h| h.iter().skip(h.len().saturating_sub(n)).cloned().collect())
            .unwrap_or_default()
    }

    /// Latest snapshot of every provider
    pub fn all_metrics(&self) -> HashMap<String, ProviderMetrics> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state
            .history
            .iter()
            .filter_map(|(id, h)| h.back().map(|m| (id.clone(), m.clone())))
            .collect()
    }

    /// Current health score, if the provider has been observed
    pub fn health_score(&self, provider: &str) -> Option<HealthScore> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        state.scores.get(provider).cloned()
    }

    /// Every known health score
    pub fn health_scores(&self) -> HashMap<String, HealthScore> {
        self.state
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .scores
            .clone()
    }

    /// Observed provider ids, sorted
    pub fn providers(&self) -> Vec<String> {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        let mut ids: Vec<String> = state.scores.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Latest snapshots ranked by `availability * (1 - error_rate)`, ties by lower p95
    pub fn compare_providers(&self) -> Vec<ProviderMetrics> {
        let mut ranked: Vec<ProviderMetrics> = self.all_metrics().into_values().collect();
        ranked.sort_by(|a, b| {
            let ra = a.availability * (1.0 - a.error_rate);
            let rb = b.availability * (1.0 - b.error_rate);
            rb.partial_cmp(&ra)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.latency.p95.cmp(&b.latency.p95))
                .then_with(|| a.provider.cmp(&b.provider))
        });
        ranked
    }

    /// One metric over the last `n` snapshots, oldest first
    pub fn trend(&self, provider: &str, kind: MetricKind, n: usize) -> Vec<f64> {
        self.historical_metrics(provider, n)
            .iter()
            .map(|m| kind.value(m))
            .collect()
    }

    /// Drop all data for a provider
    pub fn reset(&self, provider: &str) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        state.samples.remove(provider);
        state.history.remove(provider);
        state.scores.remove(provider);
        state.status.remove(provider);
        refresh_cost_ratios(&mut state);
    }
}

/// Recompute every `cost_ratio` against the cheapest non-zero cost per request
fn refresh_cost_ratios(state: &mut MonitorState) {
    let costs: HashMap<String, f64> = state
        .history
        .iter()
        .filter_map(|(id, h)| h.back().map(|m| (id.clone(), m.cost_per_request)))
        .collect();
    let cheapest = costs
        .values()
        .copied()
        .filter(|c| *c > 0.0)
        .fold(f64::INFINITY, f64::min);

    for (id, score) in state.scores.iter_mut() {
        let cost = costs.get(id).copied().unwrap_or(0.0);
        score.cost_ratio = if cheapest.is_finite() && cost > 0.0 {
            cost / cheapest
        } else {
            1.0
        };
    }
}
