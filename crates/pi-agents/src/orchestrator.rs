//! WrapperOrchestrator - capability-addressed selection over registered agents
//!
//! Owns the wrapper registry, a TTL health cache, preferred-agent ordering
//! and execute-with-fallback.

use crate::task::{AgentResult, AgentTask, NO_AGENT_ID};
use crate::wrapper::{AgentWrapper, ChunkStream};
use futures::future::join_all;
use futures::{future, stream, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Predicate over wrapper ids consulted during selection
pub type AvailabilityGate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Orchestrator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrapperOrchestratorConfig {
    /// Retry failed tasks on other eligible wrappers
    #[serde(default)]
    pub fallback: bool,
    /// Agent ids tried first, in order
    #[serde(default)]
    pub preferred_agents: Vec<String>,
    /// How long a health probe result is reused
    #[serde(default = "default_health_cache_ttl_ms")]
    pub health_cache_ttl_ms: u64,
    /// Upper bound for a single health probe
    #[serde(default = "default_health_check_timeout_ms")]
    pub health_check_timeout_ms: u64,
}

fn default_health_cache_ttl_ms() -> u64 {
    30_000
}

fn default_health_check_timeout_ms() -> u64 {
    5_000
}

impl Default for WrapperOrchestratorConfig {
    fn default() -> Self {
        Self {
            fallback: false,
            preferred_agents: Vec::new(),
            health_cache_ttl_ms: default_health_cache_ttl_ms(),
            health_check_timeout_ms: default_health_check_timeout_ms(),
        }
    }
}

impl WrapperOrchestratorConfig {
    /// Enable or disable fallback
    #[must_use]
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback = fallback;
        self
    }

    /// Set preferred agent order
    #[must_use]
    pub fn with_preferred_agents<I, S>(mut self, agents: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.preferred_agents = agents.into_iter().map(Into::into).collect();
        self
    }

    /// Set health cache TTL
    #[must_use]
    pub fn with_health_cache_ttl(mut self, ttl: Duration) -> Self {
        self.health_cache_ttl_ms = ttl.as_millis() as u64;
        self
    }

    /// Set health probe timeout
    #[must_use]
    pub fn with_health_check_timeout(mut self, timeout: Duration) -> Self {
        self.health_check_timeout_ms = timeout.as_millis() as u64;
        self
    }

    fn health_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.health_cache_ttl_ms)
    }

    fn health_check_timeout(&self) -> Duration {
        Duration::from_millis(self.health_check_timeout_ms)
    }
}

/// Registry and dispatcher for agent wrappers
pub struct WrapperOrchestrator {
    config: WrapperOrchestratorConfig,
    wrappers: RwLock<Vec<Arc<dyn AgentWrapper>>>,
    health_cache: Mutex<HashMap<String, (bool, Instant)>>,
    gate: RwLock<Option<AvailabilityGate>>,
}

impl Default for WrapperOrchestrator {
    fn default() -> Self {
        Self::new(WrapperOrchestratorConfig::default())
    }
}

impl WrapperOrchestrator {
    /// Create an empty orchestrator
    #[must_use]
    pub fn new(config: WrapperOrchestratorConfig) -> Self {
        Self {
            config,
            wrappers: RwLock::new(Vec::new()),
            health_cache: Mutex::new(HashMap::new()),
            gate: RwLock::new(None),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &WrapperOrchestratorConfig {
        &self.config
    }

    /// Register a wrapper, replacing any wrapper with the same id in place
    pub fn register(&self, wrapper: Arc<dyn AgentWrapper>) {
        let mut wrappers = self.wrappers.write().unwrap_or_else(|e| e.into_inner());
        let id = wrapper.id().to_string();
        match wrappers.iter_mut().find(|w| w.id() == id) {
            Some(slot) => {
                *slot = wrapper;
                info!(agent_id = %id, "Replaced agent wrapper");
            }
            None => {
                wrappers.push(wrapper);
                info!(agent_id = %id, "Registered agent wrapper");
            }
        }
    }

    /// Remove a wrapper; returns whether it was registered
    pub fn unregister(&self, id: &str) -> bool {
        let mut wrappers = self.wrappers.write().unwrap_or_else(|e| e.into_inner());
        let before = wrappers.len();
        wrappers.retain(|w| w.id() != id);
        let removed = wrappers.len() != before;
        if removed {
            info!(agent_id = %id, "Unregistered agent wrapper");
        }
        removed
    }

    /// All wrappers in registration order
    pub fn wrappers(&self) -> Vec<Arc<dyn AgentWrapper>> {
        self.wrappers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Look up a wrapper by id
    pub fn get_wrapper(&self, id: &str) -> Option<Arc<dyn AgentWrapper>> {
        self.wrappers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .find(|w| w.id() == id)
            .cloned()
    }

    /// Registered ids in registration order
    pub fn ids(&self) -> Vec<String> {
        self.wrappers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .map(|w| w.id().to_string())
            .collect()
    }

    /// Install a predicate that can veto wrappers during selection
    pub fn set_availability_gate(&self, gate: AvailabilityGate) {
        *self.gate.write().unwrap_or_else(|e| e.into_inner()) = Some(gate);
    }

    /// Health of one wrapper, served from the cache within the TTL
    pub async fn is_healthy(&self, wrapper: &dyn AgentWrapper) -> bool {
        if let Some(healthy) = self.cached_health(wrapper.id()) {
            return healthy;
        }
        let healthy = self.probe(wrapper).await;
        self.store_health(wrapper.id(), healthy);
        healthy
    }

    /// Healthy wrappers in registration order
    pub async fn available_agents(&self) -> Vec<Arc<dyn AgentWrapper>> {
        let wrappers = self.wrappers();
        let health = join_all(wrappers.iter().map(|w| self.is_healthy(w.as_ref()))).await;
        wrappers
            .into_iter()
            .zip(health)
            .filter_map(|(w, healthy)| healthy.then_some(w))
            .collect()
    }

    /// Best eligible wrapper for a task
    pub async fn select_for_task(&self, task: &AgentTask) -> Option<Arc<dyn AgentWrapper>> {
        self.select_excluding(task, &HashSet::new()).await
    }

    /// Probe every wrapper now, bypassing and refreshing the cache
    pub async fn check_health(&self) -> HashMap<String, bool> {
        let wrappers = self.wrappers();
        let results = join_all(wrappers.iter().map(|w| self.probe(w.as_ref()))).await;
        wrappers
            .iter()
            .zip(results)
            .map(|(w, healthy)| {
                self.store_health(w.id(), healthy);
                (w.id().to_string(), healthy)
            })
            .collect()
    }

    /// Run a task on the selected wrapper, falling back when configured
    pub async fn execute(&self, task: &AgentTask) -> AgentResult {
        let mut attempts = self.execute_attempts(task).await;
        attempts
            .pop()
            .unwrap_or_else(|| AgentResult::no_agent(no_agent_detail(task)))
    }

    /// Like [`execute`](Self::execute) but returns every attempt in order
    ///
    /// The last entry is the final outcome. Earlier entries are the failures
    /// that triggered fallback. Never empty.
    pub async fn execute_attempts(&self, task: &AgentTask) -> Vec<AgentResult> {
        let Some(mut wrapper) = self.select_for_task(task).await else {
            return vec![AgentResult::no_agent(no_agent_detail(task))];
        };
        let mut tried = HashSet::new();
        let mut attempts = Vec::new();

        loop {
            tried.insert(wrapper.id().to_string());
            debug!(agent_id = %wrapper.id(), "Dispatching task");
            let result = wrapper.execute(task).await;

            if result.is_success() || !self.config.fallback {
                attempts.push(result);
                return attempts;
            }

            warn!(
                agent_id = %wrapper.id(),
                error = result.stderr.as_deref().unwrap_or_default(),
                "Agent failed, looking for fallback"
            );
            attempts.push(result);
            match self.select_excluding(task, &tried).await {
                Some(next) => wrapper = next,
                None => return attempts,
            }
        }
    }

    /// Stream a task from a single selected wrapper
    pub async fn execute_stream(&self, task: &AgentTask) -> ChunkStream {
        match self.select_for_task(task).await {
            Some(wrapper) => {
                debug!(agent_id = %wrapper.id(), "Streaming task");
                wrapper.execute_stream(task)
            }
            None => stream::once(future::ready(format!(
                "[{}] {}\n",
                NO_AGENT_ID,
                no_agent_detail(task)
            )))
            .boxed(),
        }
    }

    async fn select_excluding(
        &self,
        task: &AgentTask,
        excluded: &HashSet<String>,
    ) -> Option<Arc<dyn AgentWrapper>> {
        let gate = self.gate.read().unwrap_or_else(|e| e.into_inner()).clone();
        let mut candidates: Vec<_> = self
            .wrappers()
            .into_iter()
            .filter(|w| !excluded.contains(w.id()))
            .filter(|w| w.supports(task.capability.as_deref()))
            .filter(|w| gate.as_ref().map_or(true, |allowed| allowed(w.id())))
            .collect();

        let health = join_all(candidates.iter().map(|w| self.is_healthy(w.as_ref()))).await;
        let mut health = health.into_iter();
        candidates.retain(|_| health.next().unwrap_or(false));

        let preferred = &self.config.preferred_agents;
        candidates.sort_by_key(|w| {
            preferred
                .iter()
                .position(|p| p == w.id())
                .unwrap_or(usize::MAX)
        });
        candidates.into_iter().next()
    }

    async fn probe(&self, wrapper: &dyn AgentWrapper) -> bool {
        let healthy = tokio::time::timeout(self.config.health_check_timeout(), wrapper.health())
            .await
            .unwrap_or(false);
        debug!(agent_id = %wrapper.id(), healthy, "Health probe");
        healthy
    }

    fn cached_health(&self, id: &str) -> Option<bool> {
        let cache = self.health_cache.lock().unwrap_or_else(|e| e.into_inner());
        cache
            .get(id)
            .filter(|(_, at)| at.elapsed() < self.config.health_cache_ttl())
            .map(|(healthy, _)| *healthy)
    }

    fn store_health(&self, id: &str, healthy: bool) {
        self.health_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id.to_string(), (healthy, Instant::now()));
    }
}

fn no_agent_detail(task: &AgentTask) -> String {
    match &task.capability {
        Some(cap) => format!("No agent available for capability '{}'", cap),
        None => "No agent available".to_string(),
    }
}

#[cfg(test)]
mod tests;
