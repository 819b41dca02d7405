//! Failover Manager - per-provider health state machine with blacklisting
//!
//! Providers move `healthy -> degraded -> offline` as failures accumulate.
//! Reaching the failure threshold blacklists the provider for a fixed
//! duration. Recovery to `healthy` requires a streak of successes.

use crate::monitor::ProviderMonitor;
use crate::types::Recommendation;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Failover configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverConfig {
    /// Consecutive failures before blacklisting
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    /// Consecutive successes required to recover
    #[serde(default = "default_recovery_threshold")]
    pub recovery_threshold: u32,
    /// Blacklist duration in milliseconds
    #[serde(default = "default_blacklist_duration_ms")]
    pub blacklist_duration_ms: u64,
    /// Interval between periodic health checks in milliseconds
    #[serde(default = "default_health_check_interval_ms")]
    pub health_check_interval_ms: u64,
    /// Events kept in the log
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_recovery_threshold() -> u32 {
    2
}

fn default_blacklist_duration_ms() -> u64 {
    60_000
}

fn default_health_check_interval_ms() -> u64 {
    30_000
}

fn default_max_events() -> usize {
    1000
}

impl Default for FailoverConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            recovery_threshold: default_recovery_threshold(),
            blacklist_duration_ms: default_blacklist_duration_ms(),
            health_check_interval_ms: default_health_check_interval_ms(),
            max_events: default_max_events(),
        }
    }
}

impl FailoverConfig {
    /// Set failure threshold
    #[must_use]
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Set recovery threshold
    #[must_use]
    pub fn with_recovery_threshold(mut self, threshold: u32) -> Self {
        self.recovery_threshold = threshold;
        self
    }

    /// Set blacklist duration
    #[must_use]
    pub fn with_blacklist_duration(mut self, duration: Duration) -> Self {
        self.blacklist_duration_ms = duration.as_millis() as u64;
        self
    }

    /// Set health check interval
    #[must_use]
    pub fn with_health_check_interval(mut self, interval: Duration) -> Self {
        self.health_check_interval_ms = interval.as_millis() as u64;
        self
    }

    fn blacklist_duration(&self) -> Duration {
        Duration::from_millis(self.blacklist_duration_ms)
    }

    fn health_check_interval(&self) -> Duration {
        Duration::from_millis(self.health_check_interval_ms)
    }
}

/// Failover status of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// Serving normally
    Healthy,
    /// Recent failures below the threshold
    Degraded,
    /// Marked down by an external signal
    Unhealthy,
    /// Blacklisted after reaching the failure threshold
    Offline,
}

impl std::fmt::Display for ProviderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Health record for one provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverState {
    /// Current status
    pub status: ProviderStatus,
    /// Lifetime failure count
    pub failure_count: u64,
    /// Current failure streak
    pub consecutive_failures: u32,
    /// Current success streak
    pub consecutive_successes: u32,
    /// Last recorded failure
    pub last_failure_time: Option<DateTime<Utc>>,
    /// Reason given for the last failure
    pub last_failure_reason: Option<String>,
    /// Last return to healthy
    pub last_recovery_time: Option<DateTime<Utc>>,
    /// When the blacklist expires, if blacklisted
    pub blacklisted_until: Option<DateTime<Utc>>,
    /// When the next periodic health check is due
    pub next_health_check_time: DateTime<Utc>,
}

impl FailoverState {
    fn new(next_check: DateTime<Utc>) -> Self {
        Self {
            status: ProviderStatus::Healthy,
            failure_count: 0,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_failure_time: None,
            last_failure_reason: None,
            last_recovery_time: None,
            blacklisted_until: None,
            next_health_check_time: next_check,
        }
    }
}

/// Kind of failover event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverEventKind {
    /// Failure below the threshold
    Failure,
    /// Provider blacklisted
    Blacklist,
    /// Provider recovered to healthy
    Recovery,
    /// Provider marked unhealthy externally
    Unhealthy,
}

/// Entry in the failover event log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverEvent {
    /// Provider id
    pub provider: String,
    /// What happened
    pub kind: FailoverEventKind,
    /// Failure reason, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Blacklist downtime in milliseconds (recovery events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub downtime_ms: Option<u64>,
    /// When it happened
    pub timestamp: DateTime<Utc>,
}

/// Aggregate failover statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailoverStatistics {
    /// Providers with a state record
    pub total_providers: usize,
    /// Providers currently healthy
    pub healthy_providers: usize,
    /// Providers with an unexpired blacklist
    pub blacklisted_providers: usize,
    /// Lifetime failures across providers
    pub total_failures: u64,
    /// Mean downtime over recovery events that ended a blacklist
    pub average_downtime_ms: f64,
}

#[derive(Debug, Clone, Copy)]
struct Blacklist {
    since: Instant,
    until: Instant,
}

#[derive(Default)]
struct FailoverInner {
    states: HashMap<String, FailoverState>,
    blacklist: HashMap<String, Blacklist>,
    events: VecDeque<FailoverEvent>,
}

/// Provider health state machine
pub struct FailoverManager {
    config: FailoverConfig,
    inner: RwLock<FailoverInner>,
    health_task: Mutex<Option<CancellationToken>>,
}

impl Default for FailoverManager {
    fn default() -> Self {
        Self::new(FailoverConfig::default())
    }
}

impl FailoverManager {
    /// Create a new manager
    #[must_use]
    pub fn new(config: FailoverConfig) -> Self {
        Self {
            config,
            inner: RwLock::new(FailoverInner::default()),
            health_task: Mutex::new(None),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &FailoverConfig {
        &self.config
    }

    fn next_check_time(&self) -> DateTime<Utc> {
        Utc::now()
            + chrono::Duration::milliseconds(self.config.health_check_interval_ms as i64)
    }

    /// Start tracking a provider as healthy (no-op if already known)
    pub fn register_provider(&self, provider: &str) {
        let next_check = self.next_check_time();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner
            .states
            .entry(provider.to_string())
            .or_insert_with(|| FailoverState::new(next_check));
    }

    /// Record a failed request
    pub fn record_failure(&self, provider: &str, reason: &str) {
        let now = Utc::now();
        let next_check = self.next_check_time();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        let inner = &mut *inner;

        let state = inner
            .states
            .entry(provider.to_string())
            .or_insert_with(|| FailoverState::new(next_check));
        state.consecutive_failures += 1;
        state.consecutive_successes = 0;
        state.failure_count += 1;
        state.last_failure_time = Some(now);
        state.last_failure_reason = Some(reason.to_string());

        let kind = if state.consecutive_failures >= self.config.failure_threshold {
            let started = Instant::now();
            let since = inner
                .blacklist
                .get(provider)
                .map_or(started, |entry| entry.since);
            inner.blacklist.insert(
                provider.to_string(),
                Blacklist {
                    since,
                    until: started + self.config.blacklist_duration(),
                },
            );
            state.status = ProviderStatus::Offline;
            state.blacklisted_until = Some(
                now + chrono::Duration::milliseconds(self.config.blacklist_duration_ms as i64),
            );
            warn!(
                provider = %provider,
                consecutive_failures = state.consecutive_failures,
                blacklist_ms = self.config.blacklist_duration_ms,
                "Provider blacklisted"
            );
            FailoverEventKind::Blacklist
        } else {
            if state.status == ProviderStatus::Healthy {
                state.status = ProviderStatus::Degraded;
            }
            debug!(provider = %provider, reason = %reason, status = %state.status, "Provider failure recorded");
            FailoverEventKind::Failure
        };

        push_event(
            &mut inner.events,
            self.config.max_events,
            FailoverEvent {
                provider: provider.to_string(),
                kind,
                reason: Some(reason.to_string()),
                downtime_ms: None,
                timestamp: now,
            },
        );
    }

    /// Record a successful request
    pub fn record_success(&self, provider: &str) {
        let next_check = self.next_check_time();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        let state = inner
            .states
            .entry(provider.to_string())
            .or_insert_with(|| FailoverState::new(next_check));
        state.consecutive_successes += 1;
        state.consecutive_failures = 0;

        if state.status != ProviderStatus::Healthy
            && state.consecutive_successes >= self.config.recovery_threshold
        {
            self.recover(&mut inner, provider);
        }
    }

    /// The only transition back to healthy from any other status
    fn recover(&self, inner: &mut FailoverInner, provider: &str) {
        let now = Utc::now();
        let downtime_ms = inner
            .blacklist
            .remove(provider)
            .map(|entry| entry.since.elapsed().as_millis() as u64);

        if let Some(state) = inner.states.get_mut(provider) {
            state.status = ProviderStatus::Healthy;
            state.last_recovery_time = Some(now);
            state.blacklisted_until = None;
        }

        info!(provider = %provider, downtime_ms = downtime_ms.unwrap_or(0), "Provider recovered");
        push_event(
            &mut inner.events,
            self.config.max_events,
            FailoverEvent {
                provider: provider.to_string(),
                kind: FailoverEventKind::Recovery,
                reason: None,
                downtime_ms,
                timestamp: now,
            },
        );
    }

    /// Mark a provider unhealthy from an external signal (no blacklist timer)
    pub fn mark_unhealthy(&self, provider: &str, reason: &str) {
        let now = Utc::now();
        let next_check = self.next_check_time();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());

        let state = inner
            .states
            .entry(provider.to_string())
            .or_insert_with(|| FailoverState::new(next_check));
        state.status = ProviderStatus::Unhealthy;
        state.consecutive_successes = 0;
        state.last_failure_reason = Some(reason.to_string());

        warn!(provider = %provider, reason = %reason, "Provider marked unhealthy");
        push_event(
            &mut inner.events,
            self.config.max_events,
            FailoverEvent {
                provider: provider.to_string(),
                kind: FailoverEventKind::Unhealthy,
                reason: Some(reason.to_string()),
                downtime_ms: None,
                timestamp: now,
            },
        );
    }

    /// Forget all state for a provider and track it as healthy again
    pub fn reset_provider(&self, provider: &str) {
        let next_check = self.next_check_time();
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.blacklist.remove(provider);
        inner
            .states
            .insert(provider.to_string(), FailoverState::new(next_check));
        info!(provider = %provider, "Provider state reset");
    }

    /// Whether a provider may be used; expired blacklists are cleared here
    pub fn is_provider_available(&self, provider: &str) -> bool {
        {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            match inner.blacklist.get(provider) {
                None => return true,
                Some(entry) if Instant::now() < entry.until => return false,
                Some(_) => {}
            }
        }

        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        match inner.blacklist.get(provider) {
            None => true,
            Some(entry) if Instant::now() < entry.until => false,
            Some(_) => {
                inner.blacklist.remove(provider);
                if let Some(state) = inner.states.get_mut(provider) {
                    state.status = ProviderStatus::Degraded;
                    state.blacklisted_until = None;
                }
                info!(provider = %provider, "Provider blacklist expired");
                true
            }
        }
    }

    /// Known providers that are currently available, sorted
    pub fn available_providers(&self) -> Vec<String> {
        let mut ids: Vec<String> = {
            let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
            inner.states.keys().cloned().collect()
        };
        ids.sort();
        ids.retain(|id| self.is_provider_available(id));
        ids
    }

    /// State of one provider
    pub fn state(&self, provider: &str) -> Option<FailoverState> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        inner.states.get(provider).cloned()
    }

    /// All provider states
    pub fn states(&self) -> HashMap<String, FailoverState> {
        self.inner
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .states
            .clone()
    }

    /// Last `n` events, oldest first
    pub fn events(&self, n: usize) -> Vec<FailoverEvent> {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let skip = inner.events.len().saturating_sub(n);
        inner.events.iter().skip(skip).cloned().collect()
    }

    /// Aggregate statistics
    pub fn statistics(&self) -> FailoverStatistics {
        let inner = self.inner.read().unwrap_or_else(|e| e.into_inner());
        let now = Instant::now();
        let downtimes: Vec<u64> = inner
            .events
            .iter()
            .filter(|e| e.kind == FailoverEventKind::Recovery)
            .filter_map(|e| e.downtime_ms)
            .collect();

        FailoverStatistics {
            total_providers: inner.states.len(),
            healthy_providers: inner
                .states
                .values()
                .filter(|s| s.status == ProviderStatus::Healthy)
                .count(),
            blacklisted_providers: inner.blacklist.values().filter(|b| now < b.until).count(),
            total_failures: inner.states.values().map(|s| s.failure_count).sum(),
            average_downtime_ms: if downtimes.is_empty() {
                0.0
            } else {
                downtimes.iter().sum::<u64>() as f64 / downtimes.len() as f64
            },
        }
    }

    /// Translate monitor recommendations into synthetic outcomes
    pub fn run_health_check(&self, monitor: &ProviderMonitor) {
        let scores = monitor.health_scores();
        let mut providers: HashSet<String> = scores.keys().cloned().collect();
        providers.extend(self.states().into_keys());

        let next_check = self.next_check_time();
        for provider in providers {
            let Some(score) = scores.get(&provider) else {
                continue;
            };
            match score.recommendation {
                Recommendation::Poor => self.record_failure(&provider, "health check: POOR"),
                Recommendation::Optimal => self.record_success(&provider),
                Recommendation::Acceptable => {
                    let healthy = self
                        .state(&provider)
                        .is_some_and(|s| s.status == ProviderStatus::Healthy);
                    if !healthy {
                        self.record_success(&provider);
                    }
                }
                Recommendation::Unknown => {}
            }

            let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
            if let Some(state) = inner.states.get_mut(&provider) {
                state.next_health_check_time = next_check;
            }
        }
        debug!("Failover health check completed");
    }

    /// Start periodic health checks; no-op if already running
    pub fn start_health_checks(self: &Arc<Self>, monitor: Arc<ProviderMonitor>) {
        let mut slot = self.health_task.lock().unwrap_or_else(|e| e.into_inner());
        if slot.as_ref().is_some_and(|token| !token.is_cancelled()) {
            return;
        }

        let token = CancellationToken::new();
        *slot = Some(token.clone());
        let manager = Arc::downgrade(self);
        let interval = self.config.health_check_interval();

        info!(interval_ms = self.config.health_check_interval_ms, "Starting failover health checks");
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        let Some(manager) = manager.upgrade() else {
                            break;
                        };
                        manager.run_health_check(&monitor);
                    }
                    _ = token.cancelled() => {
                        debug!("Failover health checks stopped");
                        break;
                    }
                }
            }
        });
    }

    /// Stop periodic health checks; no-op if not running
    pub fn stop_health_checks(&self) {
        if let Some(token) = self
            .health_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            token.cancel();
            info!("Stopping failover health checks");
        }
    }

    /// Whether the periodic task is running
    pub fn is_health_check_running(&self) -> bool {
        self.health_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|token| !token.is_cancelled())
    }
}

impl Drop for FailoverManager {
    fn drop(&mut self) {
        self.stop_health_checks();
    }
}

fn push_event(events: &mut VecDeque<FailoverEvent>, max: usize, event: FailoverEvent) {
    events.push_back(event);
    while events.len() > max {
        events.pop_front();
    }
}
