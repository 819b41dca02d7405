//! Configuration types and loading
//!
//! Sources, lowest priority first: embedded defaults, `config/local.toml`,
//! an explicit `--config` file, then `PI_*` environment variables.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use pi_agents::{ApiConfig, ShellConfig, WrapperOrchestratorConfig};
use pi_routing::{FailoverConfig, MonitorConfig, RoutingStrategy};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Embedded default configuration (compiled into binary)
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub orchestrator: WrapperOrchestratorConfig,
    #[serde(default)]
    pub agents: AgentsConfig,
    #[serde(default)]
    pub monitor: MonitorConfig,
    #[serde(default)]
    pub failover: FailoverConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    /// Reserved for a persistent store
    #[serde(default)]
    pub db_path: Option<String>,
}

/// Which agents to register
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentsConfig {
    /// Built-in preset ids
    #[serde(default)]
    pub presets: Vec<String>,
    /// Additional CLI agents
    #[serde(default)]
    pub shell: Vec<ShellConfig>,
    /// Additional OpenAI-compatible agents
    #[serde(default)]
    pub api: Vec<ApiConfig>,
}

/// Provider ranking shown by `health` and `/status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default)]
    pub strategy: RoutingStrategy,
    /// Decisions kept for statistics
    #[serde(default = "default_router_history")]
    pub max_history: usize,
}

fn default_router_history() -> usize {
    1000
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            strategy: RoutingStrategy::default(),
            max_history: default_router_history(),
        }
    }
}

/// Built-in middleware settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Regexes that block a prompt
    #[serde(default)]
    pub blocked_patterns: Vec<String>,
    /// Maximum prompt length in characters
    #[serde(default)]
    pub max_prompt_length: Option<usize>,
    /// Route `@agent-id ...` mentions
    #[serde(default = "default_true")]
    pub mentions: bool,
}

fn default_true() -> bool {
    true
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            blocked_patterns: Vec::new(),
            max_prompt_length: None,
            mentions: true,
        }
    }
}

/// Load configuration from files and environment
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut builder = Config::builder()
        .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
        .add_source(File::with_name("config/local").required(false));

    if let Some(path) = path {
        builder = builder.add_source(File::from(path).required(true));
    }

    // prefix_separator("_") makes PI_ORCHESTRATOR__FALLBACK map to orchestrator.fallback
    let config = builder
        .add_source(
            Environment::with_prefix("PI")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("orchestrator.preferred_agents")
                .with_list_parse_key("agents.presets")
                .with_list_parse_key("guard.blocked_patterns")
                .try_parsing(true),
        )
        .build()
        .context("Failed to build configuration")?;

    config
        .try_deserialize()
        .context("Failed to deserialize configuration")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(content: &str) -> AppConfig {
        Config::builder()
            .add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Toml))
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn test_embedded_defaults() {
        let config = from_toml("");
        assert!(config.orchestrator.fallback);
        assert_eq!(config.orchestrator.health_cache_ttl_ms, 30_000);
        assert_eq!(config.agents.presets.len(), 10);
        assert_eq!(config.failover.failure_threshold, 3);
        assert_eq!(config.monitor.thresholds.high_latency_ms, 1000);
        assert!(config.guard.mentions);
        assert!(config.guard.max_prompt_length.is_none());
        assert_eq!(config.router.strategy, RoutingStrategy::Failover);
    }

    #[test]
    fn test_router_strategy_override() {
        let config = from_toml("[router]\nstrategy = \"latency-optimal\"");
        assert_eq!(config.router.strategy, RoutingStrategy::LatencyOptimal);
        assert_eq!(config.router.max_history, 1000);
    }

    #[test]
    fn test_custom_agents() {
        let config = from_toml(
            r#"
            [agents]
            presets = ["aider"]

            [[agents.shell]]
            id = "local-llm"
            name = "Local LLM"
            command = "llm"
            capabilities = ["chat"]

            [[agents.api]]
            id = "together"
            name = "Together"
            base_url = "https://api.together.xyz/v1"
            api_key_env = "TOGETHER_API_KEY"
            model = "meta-llama/Llama-3-70b-chat-hf"
            "#,
        );

        assert_eq!(config.agents.presets, vec!["aider"]);
        assert_eq!(config.agents.shell[0].timeout_seconds, 300);
        assert_eq!(config.agents.api[0].max_tokens, 4096);
    }
}
