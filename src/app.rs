//! Application wiring
//!
//! Builds the orchestrator, routing components and chat service from
//! [`AppConfig`].

use crate::config::{AgentsConfig, AppConfig};
use anyhow::{bail, Result};
use pi_agents::{AgentWrapper, ApiConfig, ApiWrapper, ShellConfig, ShellWrapper, WrapperOrchestrator};
use pi_core::{MentionRouter, OrchestratorService, PromptGuard};
use pi_routing::{
    AlertHandler, FailoverChain, FailoverManager, ProviderInfo, ProviderMetrics, ProviderMonitor,
    ProviderRouter, ProviderSelectionCriteria, RouteDecision, RoutingStrategy,
};
use std::sync::Arc;
use tracing::{info, warn};

/// Fully wired application
pub struct App {
    pub service: OrchestratorService,
    pub monitor: Arc<ProviderMonitor>,
    pub failover: Arc<FailoverManager>,
    pub router: Arc<ProviderRouter>,
    pub strategy: RoutingStrategy,
}

impl App {
    /// The orchestrator shared by the service and middleware
    pub fn orchestrator(&self) -> &Arc<WrapperOrchestrator> {
        self.service.orchestrator()
    }

    /// Rank agents by recorded health with the configured strategy
    ///
    /// Blacklisted agents are left out. The pick is kept in the router's history.
    pub fn recommend(&self) -> pi_routing::Result<(RouteDecision, FailoverChain)> {
        let criteria = ProviderSelectionCriteria::new(self.strategy);
        let decision = self.router.select_provider(&criteria)?;
        let chain = self.router.build_failover_chain(&criteria)?;
        Ok((decision, chain))
    }
}

/// Logs monitor alerts
struct LogAlerts;

impl AlertHandler for LogAlerts {
    fn on_high_latency(&self, provider: &str, metrics: &ProviderMetrics) {
        warn!(provider = %provider, p95_ms = metrics.latency.p95, "High latency");
    }

    fn on_high_error_rate(&self, provider: &str, metrics: &ProviderMetrics) {
        warn!(provider = %provider, error_rate = metrics.error_rate, "High error rate");
    }

    fn on_unavailable(&self, provider: &str, metrics: &ProviderMetrics) {
        warn!(provider = %provider, availability = metrics.availability, "Provider offline");
    }

    fn on_recovered(&self, provider: &str, _metrics: &ProviderMetrics) {
        info!(provider = %provider, "Provider recovered");
    }
}

/// Instantiate every configured wrapper, presets first
pub fn build_wrappers(agents: &AgentsConfig) -> Result<Vec<Arc<dyn AgentWrapper>>> {
    let mut wrappers: Vec<Arc<dyn AgentWrapper>> = Vec::new();

    for id in &agents.presets {
        if let Some(config) = ShellConfig::presets().into_iter().find(|c| &c.id == id) {
            wrappers.push(Arc::new(ShellWrapper::new(config)?));
        } else if let Some(config) = ApiConfig::presets().into_iter().find(|c| &c.id == id) {
            wrappers.push(Arc::new(ApiWrapper::new(config)?));
        } else {
            bail!("Unknown agent preset '{}'", id);
        }
    }

    for config in &agents.shell {
        wrappers.push(Arc::new(ShellWrapper::new(config.clone())?));
    }
    for config in &agents.api {
        wrappers.push(Arc::new(ApiWrapper::new(config.clone())?));
    }

    Ok(wrappers)
}

/// Build the application from configuration
pub fn build(config: &AppConfig) -> Result<App> {
    let orchestrator = Arc::new(WrapperOrchestrator::new(config.orchestrator.clone()));

    let monitor = Arc::new(ProviderMonitor::new(config.monitor.clone()));
    monitor.add_alert_handler(Arc::new(LogAlerts));
    let failover = Arc::new(FailoverManager::new(config.failover.clone()));
    let router = Arc::new(
        ProviderRouter::new(Arc::clone(&monitor))
            .with_failover(Arc::clone(&failover))
            .with_max_history(config.router.max_history),
    );

    for wrapper in build_wrappers(&config.agents)? {
        failover.register_provider(wrapper.id());
        router.register_provider(ProviderInfo::new(wrapper.id(), wrapper.name()));
        orchestrator.register(wrapper);
    }
    info!(agents = orchestrator.ids().len(), "Agents registered");

    let mut service = OrchestratorService::new(Arc::clone(&orchestrator))
        .with_monitor(Arc::clone(&monitor))
        .with_failover(Arc::clone(&failover));

    let guard = &config.guard;
    if !guard.blocked_patterns.is_empty() || guard.max_prompt_length.is_some() {
        service.use_middleware(Arc::new(PromptGuard::new(
            &guard.blocked_patterns,
            guard.max_prompt_length,
        )?));
    }
    if guard.mentions {
        service.use_middleware(Arc::new(MentionRouter::new(orchestrator)));
    }

    Ok(App {
        service,
        monitor,
        failover,
        router,
        strategy: config.router.strategy,
    })
}
